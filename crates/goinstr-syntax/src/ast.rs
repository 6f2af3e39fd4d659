//! Decorated Go syntax tree.
//!
//! Nodes own their children outright. Cloning a node deep-copies the whole
//! subtree, so a subtree can never end up attached to two parents. Statements
//! and expressions carry [`Decorations`], the whitespace and comments that
//! were attached to them in the source.
//!
//! Constructs the engine never rewrites (type literals, composite literal
//! bodies, slice expressions, `for` clauses, ...) are kept as verbatim
//! source text in `Raw` variants.

/// Identity of a parsed identifier occurrence, used as the key into
/// [`crate::types::TypeInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Id carried by nodes that were constructed rather than parsed.
    pub const SYNTHETIC: NodeId = NodeId(0);

    pub fn is_synthetic(self) -> bool {
        self == Self::SYNTHETIC
    }
}

/// Allocator for [`NodeId`]s, shared across every file of a run so ids are
/// unique application-wide.
#[derive(Debug)]
pub struct IdGen {
    next: u32,
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGen {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// Vertical whitespace attached to one side of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Space {
    /// Node stays on the same line as its predecessor.
    #[default]
    None,
    /// Node starts on a fresh line.
    NewLine,
    /// Node is separated from its predecessor by a blank line.
    EmptyLine,
}

impl Space {
    pub fn is_line_break(self) -> bool {
        !matches!(self, Space::None)
    }
}

/// Whitespace and comments attached to a node.
///
/// `start` holds the comment lines printed above the node (an empty string
/// stands for a blank line between comment groups). `end` holds trailing
/// comments printed after the node on its last line, each including the
/// padding that preceded it in the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decorations {
    pub before: Space,
    pub start: Vec<String>,
    pub end: Vec<String>,
    pub after: Space,
}

impl Decorations {
    /// Decorations for a node that starts on its own line.
    pub fn newline() -> Self {
        Self {
            before: Space::NewLine,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before == Space::None
            && self.after == Space::None
            && self.start.is_empty()
            && self.end.is_empty()
    }

    /// Remove and return the band printed above the node.
    pub fn take_before(&mut self) -> (Space, Vec<String>) {
        let before = std::mem::replace(&mut self.before, Space::NewLine);
        (before, std::mem::take(&mut self.start))
    }

    /// Remove and return the band printed below the node.
    pub fn take_after(&mut self) -> Space {
        std::mem::take(&mut self.after)
    }

    /// Push a trailing comment, padded by a single space.
    pub fn push_end_comment(&mut self, text: &str) {
        self.end.push(format!(" {text}"));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub id: NodeId,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: NodeId::SYNTHETIC,
        }
    }

    pub fn with_id(name: impl Into<String>, id: NodeId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident(Ident),
    /// Literal token text, e.g. `"/path"`, `42`, `'x'`.
    BasicLit(String),
    Selector {
        x: Box<Expr>,
        sel: Ident,
    },
    Call(CallExpr),
    /// `*x`, both as a dereference and as a pointer type.
    Star(Box<Expr>),
    Unary {
        op: String,
        x: Box<Expr>,
    },
    Binary {
        x: Box<Expr>,
        op: String,
        y: Box<Expr>,
    },
    Paren(Box<Expr>),
    /// `x[i]` and generic instantiations `T[A, B]`.
    Index {
        x: Box<Expr>,
        indices: Vec<Expr>,
    },
    /// Composite literal; the element list is kept verbatim including braces.
    CompositeLit {
        ty: Option<Box<Expr>>,
        body: String,
    },
    FuncLit(FuncLit),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub fun: Box<Expr>,
    pub args: Vec<Expr>,
    /// `f(xs...)`
    pub ellipsis: bool,
    /// The closing parenthesis sits on its own line.
    pub rparen_newline: bool,
}

impl CallExpr {
    pub fn new(fun: Expr, args: Vec<Expr>) -> Self {
        Self {
            fun: Box::new(fun),
            args,
            ellipsis: false,
            rparen_newline: false,
        }
    }

    /// Arguments are laid out one per line.
    pub fn is_multiline(&self) -> bool {
        self.args.iter().any(|a| a.decs.before.is_line_break())
    }

    /// Append an argument, inheriting the one-per-line layout of the
    /// existing arguments.
    pub fn push_arg(&mut self, mut arg: Expr) {
        if self
            .args
            .last()
            .is_some_and(|last| last.decs.before.is_line_break())
        {
            arg.decs.before = Space::NewLine;
        }
        self.args.push(arg);
    }

    /// Name of the called function or method (`Get` in `http.Get(..)`).
    pub fn fun_name(&self) -> Option<&str> {
        match &self.fun.kind {
            ExprKind::Ident(id) => Some(&id.name),
            ExprKind::Selector { sel, .. } => Some(&sel.name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncLit {
    pub params: FieldList,
    pub results: Option<Results>,
    pub body: Block,
}

/// A function result list; printed verbatim, parsed types kept for the
/// type resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct Results {
    pub text: String,
    pub types: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldList {
    pub fields: Vec<Field>,
    /// The closing parenthesis sits on its own line.
    pub rparen_newline: bool,
}

impl FieldList {
    /// Number of parameters, counting each name of a grouped field.
    pub fn len(&self) -> usize {
        self.fields.iter().map(|f| f.names.len().max(1)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_variadic(&self) -> bool {
        self.fields.last().is_some_and(|f| f.variadic)
    }

    /// Parameters are declared without names (`func(int, string)`).
    pub fn is_unnamed(&self) -> bool {
        !self.fields.is_empty() && self.fields.iter().all(|f| f.names.is_empty())
    }

    /// Flattened `(name, type)` pairs in declaration order.
    pub fn params(&self) -> Vec<(Option<&Ident>, &Expr)> {
        let mut out = Vec::new();
        for field in &self.fields {
            if field.names.is_empty() {
                out.push((None, &field.ty));
            } else {
                for name in &field.names {
                    out.push((Some(name), &field.ty));
                }
            }
        }
        out
    }

    /// Append a field, inheriting the one-per-line layout of existing fields.
    pub fn push(&mut self, mut field: Field) {
        if self
            .fields
            .last()
            .is_some_and(|last| last.decs.before.is_line_break())
        {
            field.decs.before = Space::NewLine;
        }
        self.fields.push(field);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub names: Vec<Ident>,
    pub ty: Expr,
    pub variadic: bool,
    pub decs: Decorations,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Expr) -> Self {
        Self {
            names: vec![Ident::new(name)],
            ty,
            variadic: false,
            decs: Decorations::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    /// Comments between the last statement and the closing brace.
    pub trailing: Vec<String>,
    /// Written on one line in the source. Empty blocks print as `{}`;
    /// function bodies stay on one line while their statements do.
    pub inline: bool,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            stmts,
            trailing: Vec::new(),
            inline: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub decs: Decorations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `:=`
    Define,
    /// `=`
    Assign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        lhs: Vec<Expr>,
        op: AssignOp,
        rhs: Vec<Expr>,
    },
    Go(Expr),
    Defer(Expr),
    Return(Vec<Expr>),
    If(IfStmt),
    For(ForStmt),
    /// Expression and type switches; the header between `switch` and `{`
    /// is kept verbatim.
    Switch(SwitchStmt),
    Select(SelectStmt),
    Block(Block),
    Labeled {
        label: String,
        stmt: Box<Stmt>,
    },
    Decl(GenDecl),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub init: Option<Box<Stmt>>,
    pub cond: Expr,
    pub body: Block,
    /// Either a `Block` or another `If` statement.
    pub els: Option<Box<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub header: ForHeader,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForHeader {
    /// `for {`
    Infinite,
    /// `for cond {`
    Cond(Expr),
    /// `for init; cond; post {`, verbatim.
    Clause(String),
    /// `for k, v := range x {`
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        op: Option<AssignOp>,
        x: Expr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStmt {
    pub header: Option<String>,
    pub clauses: Vec<CaseClause>,
    pub trailing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub clauses: Vec<CaseClause>,
    pub trailing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    /// `case a, b:` or `default:`, verbatim.
    pub head: String,
    pub body: Vec<Stmt>,
    pub trailing: Vec<String>,
    pub decs: Decorations,
}

/// A `var`, `const` or `type` declaration, printed verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct GenDecl {
    pub text: String,
    pub specs: Vec<Spec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Spec {
    Value(ValueSpec),
    Type(TypeSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueSpec {
    pub names: Vec<Ident>,
    pub ty: Option<Expr>,
    pub values: Vec<Expr>,
    pub constant: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub name: String,
    pub alias: bool,
    pub def: TypeDef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Struct(Vec<StructField>),
    Interface {
        embeds: Vec<Expr>,
        methods: Vec<InterfaceMethod>,
    },
    Other(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceMethod {
    pub name: String,
    pub params: FieldList,
    pub results: Option<Results>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    /// `None` for an embedded field.
    pub name: Option<String>,
    pub ty: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub recv: Option<FieldList>,
    pub name: Ident,
    pub type_params: Option<String>,
    pub params: FieldList,
    pub results: Option<Results>,
    pub body: Option<Block>,
}

impl FuncDecl {
    /// Key of this function in its package's function table: `Name` for
    /// functions, `Type.Name` for methods.
    pub fn key(&self) -> String {
        match self.receiver_type_name() {
            Some(recv) => format!("{recv}.{}", self.name.name),
            None => self.name.name.clone(),
        }
    }

    /// Bare receiver type name, stripped of pointer and type arguments.
    pub fn receiver_type_name(&self) -> Option<&str> {
        let recv = self.recv.as_ref()?;
        let field = recv.fields.first()?;
        base_type_name(&field.ty)
    }

    /// Name bound to the receiver, if any.
    pub fn receiver_name(&self) -> Option<&str> {
        let recv = self.recv.as_ref()?;
        let field = recv.fields.first()?;
        field.names.first().map(|n| n.name.as_str())
    }

    pub fn is_method(&self) -> bool {
        self.recv.is_some()
    }
}

fn base_type_name(ty: &Expr) -> Option<&str> {
    match &ty.kind {
        ExprKind::Ident(id) => Some(&id.name),
        ExprKind::Star(inner) | ExprKind::Paren(inner) => base_type_name(inner),
        ExprKind::Index { x, .. } => base_type_name(x),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpec {
    pub name: Option<String>,
    /// Unquoted import path.
    pub path: String,
    pub decs: Decorations,
}

impl ImportSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            name: None,
            path: path.into(),
            decs: Decorations::newline(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub specs: Vec<ImportSpec>,
    /// Parenthesised form `import ( ... )`.
    pub grouped: bool,
    pub trailing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub kind: DeclKind,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Import(ImportDecl),
    Func(FuncDecl),
    Gen(GenDecl),
    Raw(String),
}

/// A parsed Go source file.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub package: String,
    pub package_decs: Decorations,
    pub decls: Vec<Decl>,
    /// Comments after the last declaration.
    pub trailing: Vec<String>,
}

impl File {
    pub fn imports(&self) -> impl Iterator<Item = &ImportSpec> {
        self.decls.iter().flat_map(|d| match &d.kind {
            DeclKind::Import(imp) => imp.specs.as_slice(),
            _ => &[],
        })
    }

    pub fn funcs(&self) -> impl Iterator<Item = &FuncDecl> {
        self.decls.iter().filter_map(|d| match &d.kind {
            DeclKind::Func(f) => Some(f),
            _ => None,
        })
    }

    pub fn funcs_mut(&mut self) -> impl Iterator<Item = &mut FuncDecl> {
        self.decls.iter_mut().filter_map(|d| match &mut d.kind {
            DeclKind::Func(f) => Some(f),
            _ => None,
        })
    }

    pub fn has_import(&self, path: &str) -> bool {
        self.imports().any(|spec| spec.path == path)
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            decs: Decorations::default(),
        }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Ident(Ident::new(name)))
    }

    pub fn from_ident(ident: Ident) -> Self {
        Self::new(ExprKind::Ident(ident))
    }

    pub fn basic(text: impl Into<String>) -> Self {
        Self::new(ExprKind::BasicLit(text.into()))
    }

    /// A Go interpreted string literal with the given contents.
    pub fn string_lit(value: &str) -> Self {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('"');
        for c in value.chars() {
            match c {
                '"' => quoted.push_str("\\\""),
                '\\' => quoted.push_str("\\\\"),
                '\n' => quoted.push_str("\\n"),
                c => quoted.push(c),
            }
        }
        quoted.push('"');
        Self::basic(quoted)
    }

    pub fn nil() -> Self {
        Self::ident("nil")
    }

    pub fn selector(x: Expr, sel: impl Into<String>) -> Self {
        Self::new(ExprKind::Selector {
            x: Box::new(x),
            sel: Ident::new(sel),
        })
    }

    /// `pkg.Name`
    pub fn qualified(pkg: &str, name: &str) -> Self {
        Self::selector(Self::ident(pkg), name)
    }

    pub fn call(fun: Expr, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call(CallExpr::new(fun, args)))
    }

    pub fn star(x: Expr) -> Self {
        Self::new(ExprKind::Star(Box::new(x)))
    }

    pub fn unary(op: &str, x: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op: op.to_string(),
            x: Box::new(x),
        })
    }

    pub fn binary(x: Expr, op: &str, y: Expr) -> Self {
        Self::new(ExprKind::Binary {
            x: Box::new(x),
            op: op.to_string(),
            y: Box::new(y),
        })
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(ExprKind::Raw(text.into()))
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match &self.kind {
            ExprKind::Ident(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_ident(&self, name: &str) -> bool {
        self.as_ident().is_some_and(|id| id.name == name)
    }

    pub fn is_nil(&self) -> bool {
        self.is_ident("nil")
    }

    pub fn as_call(&self) -> Option<&CallExpr> {
        match &self.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_call_mut(&mut self) -> Option<&mut CallExpr> {
        match &mut self.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_selector(&self) -> Option<(&Expr, &Ident)> {
        match &self.kind {
            ExprKind::Selector { x, sel } => Some((x, sel)),
            _ => None,
        }
    }

    /// Strip enclosing parentheses.
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }

    /// Structural equality ignoring decorations and node ids.
    pub fn same_as(&self, other: &Expr) -> bool {
        crate::printer::expr_to_string(self) == crate::printer::expr_to_string(other)
    }
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            decs: Decorations::newline(),
        }
    }

    pub fn expr(e: Expr) -> Self {
        Self::new(StmtKind::Expr(e))
    }

    pub fn define(lhs: Vec<Expr>, rhs: Vec<Expr>) -> Self {
        Self::new(StmtKind::Assign {
            lhs,
            op: AssignOp::Define,
            rhs,
        })
    }

    pub fn assign(lhs: Vec<Expr>, rhs: Vec<Expr>) -> Self {
        Self::new(StmtKind::Assign {
            lhs,
            op: AssignOp::Assign,
            rhs,
        })
    }

    pub fn defer(call: Expr) -> Self {
        Self::new(StmtKind::Defer(call))
    }

    pub fn go(call: Expr) -> Self {
        Self::new(StmtKind::Go(call))
    }

    pub fn if_stmt(cond: Expr, body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::If(IfStmt {
            init: None,
            cond,
            body: Block::new(body),
            els: None,
        }))
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(StmtKind::Raw(text.into()))
    }

    /// The call made by an expression, `go` or `defer` statement.
    pub fn call(&self) -> Option<&CallExpr> {
        match &self.kind {
            StmtKind::Expr(e) | StmtKind::Go(e) | StmtKind::Defer(e) => e.as_call(),
            _ => None,
        }
    }

    /// Nested statement lists, in source order.
    pub fn blocks_mut(&mut self) -> Vec<&mut Vec<Stmt>> {
        match &mut self.kind {
            StmtKind::If(s) => {
                let mut out = vec![&mut s.body.stmts];
                if let Some(els) = s.els.as_deref_mut() {
                    if matches!(els.kind, StmtKind::Block(_)) {
                        if let StmtKind::Block(b) = &mut els.kind {
                            out.push(&mut b.stmts);
                        }
                    } else {
                        out.extend(els.blocks_mut());
                    }
                }
                out
            }
            StmtKind::For(f) => vec![&mut f.body.stmts],
            StmtKind::Switch(s) => s.clauses.iter_mut().map(|c| &mut c.body).collect(),
            StmtKind::Select(s) => s.clauses.iter_mut().map(|c| &mut c.body).collect(),
            StmtKind::Block(b) => vec![&mut b.stmts],
            StmtKind::Labeled { stmt, .. } => stmt.blocks_mut(),
            _ => Vec::new(),
        }
    }

    /// Read-only counterpart of [`Stmt::blocks_mut`].
    pub fn blocks(&self) -> Vec<&Vec<Stmt>> {
        match &self.kind {
            StmtKind::If(s) => {
                let mut out = vec![&s.body.stmts];
                if let Some(els) = s.els.as_deref() {
                    match &els.kind {
                        StmtKind::Block(b) => out.push(&b.stmts),
                        _ => out.extend(els.blocks()),
                    }
                }
                out
            }
            StmtKind::For(f) => vec![&f.body.stmts],
            StmtKind::Switch(s) => s.clauses.iter().map(|c| &c.body).collect(),
            StmtKind::Select(s) => s.clauses.iter().map(|c| &c.body).collect(),
            StmtKind::Block(b) => vec![&b.stmts],
            StmtKind::Labeled { stmt, .. } => stmt.blocks(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_arg_inherits_line_layout() {
        let mut first = Expr::string_lit("host");
        first.decs.before = Space::NewLine;
        let mut call = CallExpr::new(Expr::qualified("grpc", "Dial"), vec![first]);
        call.push_arg(Expr::ident("opt"));
        assert_eq!(call.args[1].decs.before, Space::NewLine);

        let mut flat = CallExpr::new(Expr::ident("f"), vec![Expr::ident("a")]);
        flat.push_arg(Expr::ident("b"));
        assert_eq!(flat.args[1].decs.before, Space::None);
    }

    #[test]
    fn test_field_list_len_counts_grouped_names() {
        let list = FieldList {
            fields: vec![
                Field {
                    names: vec![Ident::new("a"), Ident::new("b")],
                    ty: Expr::ident("int"),
                    variadic: false,
                    decs: Decorations::default(),
                },
                Field::new("s", Expr::ident("string")),
            ],
            rparen_newline: false,
        };
        assert_eq!(list.len(), 3);
        assert!(!list.is_variadic());
        assert_eq!(list.params()[1].0.map(|i| i.name.as_str()), Some("b"));
    }

    #[test]
    fn test_string_lit_escapes() {
        assert_eq!(Expr::string_lit("a\"b").kind, ExprKind::BasicLit("\"a\\\"b\"".into()));
    }

    #[test]
    fn test_method_key() {
        let decl = FuncDecl {
            recv: Some(FieldList {
                fields: vec![Field::new("s", Expr::star(Expr::ident("server")))],
                rparen_newline: false,
            }),
            name: Ident::new("GetFeature"),
            type_params: None,
            params: FieldList::default(),
            results: None,
            body: None,
        };
        assert_eq!(decl.key(), "server.GetFeature");
        assert_eq!(decl.receiver_name(), Some("s"));
    }
}
