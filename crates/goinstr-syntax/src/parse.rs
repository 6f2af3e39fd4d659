//! Conversion from the tree-sitter Go grammar into the decorated tree.
//!
//! Comments are tree-sitter "extras" that can appear between any two
//! children; they are attached to the neighbouring node as [`Decorations`].
//! Any node whose comments cannot be placed on a modelled child is kept as
//! verbatim `Raw` text instead, so the printed output never loses a comment.

use tree_sitter::{Node, Parser};

use crate::ast::*;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to load the Go grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("the parser produced no syntax tree")]
    NoTree,

    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },
}

/// Parse one Go source file.
pub fn parse_file(source: &str, ids: &mut IdGen) -> Result<File, ParseError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_go::LANGUAGE.into())?;
    let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
    let root = tree.root_node();

    if root.has_error() {
        let bad = first_error(root).unwrap_or(root);
        let pos = bad.start_position();
        return Err(ParseError::Syntax {
            line: pos.row + 1,
            column: pos.column + 1,
        });
    }

    let mut conv = Converter { src: source, ids };
    Ok(conv.file(root))
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    children(node).into_iter().find_map(first_error)
}

fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

fn is_comment(node: Node<'_>) -> bool {
    node.kind() == "comment"
}

fn has_direct_comment(node: Node<'_>) -> bool {
    children(node).into_iter().any(is_comment)
}

fn row_gap(prev_row: usize, row: usize) -> Space {
    match row.saturating_sub(prev_row) {
        0 => Space::None,
        1 => Space::NewLine,
        _ => Space::EmptyLine,
    }
}

/// Statement-like children of a block or case clause, with `statement_list`
/// wrappers flattened and punctuation dropped.
fn list_items(node: Node<'_>) -> Vec<Node<'_>> {
    let mut items = Vec::new();
    for child in children(node) {
        match child.kind() {
            "statement_list" => items.extend(list_items(child)),
            "empty_statement" => {}
            _ if child.is_named() => items.push(child),
            _ => {}
        }
    }
    items
}

struct Converter<'s, 'g> {
    src: &'s str,
    ids: &'g mut IdGen,
}

/// Outcome of attaching comments to a sequence of sibling nodes.
struct Attached<'t> {
    items: Vec<(Node<'t>, Decorations)>,
    trailing: Vec<String>,
}

impl<'s, 'g> Converter<'s, 'g> {
    fn text(&self, node: Node<'_>) -> &'s str {
        &self.src[node.byte_range()]
    }

    fn attach<'t>(&self, nodes: Vec<Node<'t>>, open_row: usize) -> Attached<'t> {
        let mut items: Vec<(Node<'t>, Decorations)> = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        let mut pending_before = Space::None;
        let mut prev_row = open_row;

        for node in nodes {
            let row = node.start_position().row;
            if is_comment(node) {
                let text = self.text(node).trim_end().to_string();
                let trailing_target = match items.last() {
                    Some((last, _)) if pending.is_empty() && last.end_position().row == row => {
                        Some(last.end_byte())
                    }
                    _ => None,
                };
                if let Some(last_end) = trailing_target {
                    let between = &self.src[last_end..node.start_byte()];
                    let pad_start = between
                        .rfind(|c: char| !c.is_whitespace())
                        .map(|i| i + 1)
                        .unwrap_or(0);
                    let pad = &between[pad_start..];
                    let pad = if pad.is_empty() { " " } else { pad };
                    if let Some((_, decs)) = items.last_mut() {
                        decs.end.push(format!("{pad}{text}"));
                    }
                } else {
                    let gap = row_gap(prev_row, row);
                    if pending.is_empty() {
                        pending_before = gap;
                    } else if gap == Space::EmptyLine {
                        pending.push(String::new());
                    }
                    pending.push(text);
                }
                prev_row = node.end_position().row;
                continue;
            }

            let gap = row_gap(prev_row, row);
            let mut decs = Decorations::default();
            if pending.is_empty() {
                decs.before = gap;
            } else {
                decs.before = pending_before;
                if gap == Space::EmptyLine {
                    pending.push(String::new());
                }
                decs.start = std::mem::take(&mut pending);
            }
            prev_row = node.end_position().row;
            items.push((node, decs));
        }

        let mut trailing = Vec::new();
        if !pending.is_empty() {
            if pending_before == Space::EmptyLine {
                trailing.push(String::new());
            }
            trailing.extend(pending);
        }
        Attached { items, trailing }
    }

    fn ident(&mut self, node: Node<'_>) -> Ident {
        let id = self.ids.next_id();
        Ident::with_id(self.text(node), id)
    }

    fn file(&mut self, root: Node<'_>) -> File {
        let nodes: Vec<Node<'_>> = children(root)
            .into_iter()
            .filter(|n| n.is_named())
            .collect();
        let attached = self.attach(nodes, 0);

        let mut file = File {
            package: String::new(),
            package_decs: Decorations::default(),
            decls: Vec::new(),
            trailing: attached.trailing,
        };

        for (node, decs) in attached.items {
            match node.kind() {
                "package_clause" => {
                    file.package = named_children(node)
                        .into_iter()
                        .find(|n| n.kind() == "package_identifier")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    file.package_decs = decs;
                }
                "import_declaration" => file.decls.push(Decl {
                    kind: DeclKind::Import(self.import_decl(node)),
                    decs,
                }),
                "function_declaration" | "method_declaration" => file.decls.push(Decl {
                    kind: DeclKind::Func(self.func_decl(node)),
                    decs,
                }),
                "var_declaration" | "const_declaration" | "type_declaration" => {
                    file.decls.push(Decl {
                        kind: DeclKind::Gen(self.gen_decl(node)),
                        decs,
                    })
                }
                _ => file.decls.push(Decl {
                    kind: DeclKind::Raw(self.text(node).to_string()),
                    decs,
                }),
            }
        }
        file
    }

    fn import_decl(&mut self, node: Node<'_>) -> ImportDecl {
        let mut decl = ImportDecl {
            specs: Vec::new(),
            grouped: false,
            trailing: Vec::new(),
        };
        for child in named_children(node) {
            match child.kind() {
                "import_spec" => decl.specs.push(self.import_spec(child, Decorations::default())),
                "import_spec_list" => {
                    decl.grouped = true;
                    let nodes: Vec<Node<'_>> = named_children(child);
                    let attached = self.attach(nodes, child.start_position().row);
                    for (spec, decs) in attached.items {
                        if spec.kind() == "import_spec" {
                            decl.specs.push(self.import_spec(spec, decs));
                        }
                    }
                    decl.trailing = attached.trailing;
                }
                _ => {}
            }
        }
        decl
    }

    fn import_spec(&mut self, node: Node<'_>, decs: Decorations) -> ImportSpec {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string());
        let path = node
            .child_by_field_name("path")
            .map(|n| unquote(self.text(n)))
            .unwrap_or_default();
        ImportSpec { name, path, decs }
    }

    fn func_decl(&mut self, node: Node<'_>) -> FuncDecl {
        let recv = node
            .child_by_field_name("receiver")
            .map(|n| self.field_list(n));
        let name = node
            .child_by_field_name("name")
            .map(|n| self.ident(n))
            .unwrap_or_else(|| Ident::new("_"));
        let type_params = node
            .child_by_field_name("type_parameters")
            .map(|n| self.text(n).to_string());
        let params = node
            .child_by_field_name("parameters")
            .map(|n| self.field_list(n))
            .unwrap_or_default();
        let results = node
            .child_by_field_name("result")
            .map(|n| self.results(n));
        let body = node.child_by_field_name("body").map(|n| self.block(n));
        FuncDecl {
            recv,
            name,
            type_params,
            params,
            results,
            body,
        }
    }

    fn results(&mut self, node: Node<'_>) -> Results {
        let text = self.text(node).to_string();
        let types = if node.kind() == "parameter_list" {
            self.field_list(node)
                .params()
                .into_iter()
                .map(|(_, ty)| ty.clone())
                .collect()
        } else {
            vec![self.expr(node)]
        };
        Results { text, types }
    }

    fn field_list(&mut self, node: Node<'_>) -> FieldList {
        let nodes: Vec<Node<'_>> = named_children(node);
        let attached = self.attach(nodes, node.start_position().row);
        let mut list = FieldList::default();
        let mut last_row = node.start_position().row;

        for (child, decs) in attached.items {
            let variadic = child.kind() == "variadic_parameter_declaration";
            if child.kind() != "parameter_declaration" && !variadic {
                continue;
            }
            let names = field_children(child, "name")
                .into_iter()
                .map(|n| self.ident(n))
                .collect();
            let ty = child
                .child_by_field_name("type")
                .map(|n| self.expr(n))
                .unwrap_or_else(|| Expr::raw(self.text(child)));
            last_row = child.end_position().row;
            list.fields.push(Field {
                names,
                ty,
                variadic,
                decs,
            });
        }

        if let Some(last) = list.fields.last_mut() {
            last.decs.end.extend(attached.trailing);
        }
        list.rparen_newline =
            !list.fields.is_empty() && node.end_position().row > last_row;
        list
    }

    fn block(&mut self, node: Node<'_>) -> Block {
        let open_row = node.start_position().row;
        let attached = self.attach(list_items(node), open_row);
        let inline = attached.trailing.is_empty() && node.end_position().row == open_row;
        let stmts = attached
            .items
            .into_iter()
            .map(|(n, decs)| Stmt {
                kind: self.stmt(n),
                decs,
            })
            .collect();
        Block {
            stmts,
            trailing: attached.trailing,
            inline,
        }
    }

    fn simple_stmt(&mut self, node: Node<'_>) -> Stmt {
        Stmt {
            kind: self.stmt(node),
            decs: Decorations::default(),
        }
    }

    fn stmt(&mut self, node: Node<'_>) -> StmtKind {
        if node.kind() != "block" && has_direct_comment(node) {
            return StmtKind::Raw(self.text(node).to_string());
        }
        match node.kind() {
            "expression_statement" => match named_children(node).first() {
                Some(e) => StmtKind::Expr(self.expr(*e)),
                None => StmtKind::Raw(self.text(node).to_string()),
            },
            "short_var_declaration" => StmtKind::Assign {
                lhs: self.expr_list_field(node, "left"),
                op: AssignOp::Define,
                rhs: self.expr_list_field(node, "right"),
            },
            "assignment_statement" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|n| self.text(n))
                    .unwrap_or("=");
                if op == "=" {
                    StmtKind::Assign {
                        lhs: self.expr_list_field(node, "left"),
                        op: AssignOp::Assign,
                        rhs: self.expr_list_field(node, "right"),
                    }
                } else {
                    StmtKind::Raw(self.text(node).to_string())
                }
            }
            "go_statement" | "defer_statement" => match named_children(node).first() {
                Some(e) => {
                    let e = self.expr(*e);
                    if node.kind() == "go_statement" {
                        StmtKind::Go(e)
                    } else {
                        StmtKind::Defer(e)
                    }
                }
                None => StmtKind::Raw(self.text(node).to_string()),
            },
            "return_statement" => {
                let mut results = Vec::new();
                for child in named_children(node) {
                    if child.kind() == "expression_list" {
                        results = self.expr_list(child);
                    } else {
                        results.push(self.expr(child));
                    }
                }
                StmtKind::Return(results)
            }
            "if_statement" => self.if_stmt(node),
            "for_statement" => self.for_stmt(node),
            "expression_switch_statement" | "type_switch_statement" => {
                StmtKind::Switch(self.switch_stmt(node))
            }
            "select_statement" => {
                let (clauses, trailing) = self.case_clauses(node);
                StmtKind::Select(SelectStmt { clauses, trailing })
            }
            "block" => StmtKind::Block(self.block(node)),
            "labeled_statement" => {
                let label = node
                    .child_by_field_name("label")
                    .map(|n| self.text(n).to_string());
                let inner = named_children(node)
                    .into_iter()
                    .find(|n| n.kind() != "label_name" && !is_comment(*n));
                match (label, inner) {
                    (Some(label), Some(inner)) => StmtKind::Labeled {
                        label,
                        stmt: Box::new(self.simple_stmt(inner)),
                    },
                    _ => StmtKind::Raw(self.text(node).to_string()),
                }
            }
            "var_declaration" | "const_declaration" | "type_declaration" => {
                StmtKind::Decl(self.gen_decl(node))
            }
            _ => StmtKind::Raw(self.text(node).to_string()),
        }
    }

    fn if_stmt(&mut self, node: Node<'_>) -> StmtKind {
        let (Some(cond), Some(body)) = (
            node.child_by_field_name("condition"),
            node.child_by_field_name("consequence"),
        ) else {
            return StmtKind::Raw(self.text(node).to_string());
        };
        let init = node
            .child_by_field_name("initializer")
            .map(|n| Box::new(self.simple_stmt(n)));
        let cond = self.expr(cond);
        let body = self.block(body);
        let els = node.child_by_field_name("alternative").map(|n| {
            let mut stmt = self.simple_stmt(n);
            stmt.decs = Decorations::default();
            Box::new(stmt)
        });
        StmtKind::If(IfStmt {
            init,
            cond,
            body,
            els,
        })
    }

    fn for_stmt(&mut self, node: Node<'_>) -> StmtKind {
        let Some(body) = node.child_by_field_name("body") else {
            return StmtKind::Raw(self.text(node).to_string());
        };
        let mut header = ForHeader::Infinite;
        for child in named_children(node) {
            if child.id() == body.id() {
                continue;
            }
            header = match child.kind() {
                "for_clause" => ForHeader::Clause(self.text(child).to_string()),
                "range_clause" => self.range_clause(child),
                _ => ForHeader::Cond(self.expr(child)),
            };
        }
        let body = self.block(body);
        StmtKind::For(ForStmt { header, body })
    }

    fn range_clause(&mut self, node: Node<'_>) -> ForHeader {
        let mut op = None;
        for child in children(node) {
            match child.kind() {
                ":=" => op = Some(AssignOp::Define),
                "=" => op = Some(AssignOp::Assign),
                _ => {}
            }
        }
        let mut lhs = node
            .child_by_field_name("left")
            .map(|n| self.expr_list(n))
            .unwrap_or_default()
            .into_iter();
        let key = lhs.next();
        let value = lhs.next();
        let x = match node.child_by_field_name("right") {
            Some(n) => self.expr(n),
            None => Expr::raw(""),
        };
        ForHeader::Range { key, value, op, x }
    }

    fn switch_stmt(&mut self, node: Node<'_>) -> SwitchStmt {
        let kids = children(node);
        let keyword_end = kids
            .iter()
            .find(|n| n.kind() == "switch")
            .map(|n| n.end_byte())
            .unwrap_or(node.start_byte());
        let brace_start = kids
            .iter()
            .find(|n| n.kind() == "{")
            .map(|n| n.start_byte())
            .unwrap_or(keyword_end);
        let header = self.src[keyword_end..brace_start].trim();
        let header = (!header.is_empty()).then(|| header.to_string());
        let (clauses, trailing) = self.case_clauses(node);
        SwitchStmt {
            header,
            clauses,
            trailing,
        }
    }

    fn case_clauses(&mut self, node: Node<'_>) -> (Vec<CaseClause>, Vec<String>) {
        let kids = children(node);
        let open_row = kids
            .iter()
            .find(|n| n.kind() == "{")
            .map(|n| n.start_position().row)
            .unwrap_or(node.start_position().row);
        let nodes: Vec<Node<'_>> = kids
            .into_iter()
            .filter(|n| {
                is_comment(*n)
                    || matches!(
                        n.kind(),
                        "expression_case" | "default_case" | "type_case" | "communication_case"
                    )
            })
            .collect();
        let attached = self.attach(nodes, open_row);
        let clauses = attached
            .items
            .into_iter()
            .map(|(n, decs)| self.case_clause(n, decs))
            .collect();
        (clauses, attached.trailing)
    }

    fn case_clause(&mut self, node: Node<'_>, decs: Decorations) -> CaseClause {
        let kids = children(node);
        let colon = kids.iter().position(|n| n.kind() == ":");
        let (head, body_nodes, colon_row) = match colon {
            Some(i) => {
                let head = self.src[node.start_byte()..kids[i].end_byte()].to_string();
                let mut body = Vec::new();
                for child in &kids[i + 1..] {
                    match child.kind() {
                        "statement_list" => body.extend(list_items(*child)),
                        "empty_statement" => {}
                        _ if child.is_named() => body.push(*child),
                        _ => {}
                    }
                }
                (head, body, kids[i].start_position().row)
            }
            None => (
                self.text(node).to_string(),
                Vec::new(),
                node.start_position().row,
            ),
        };
        let attached = self.attach(body_nodes, colon_row);
        let body = attached
            .items
            .into_iter()
            .map(|(n, decs)| Stmt {
                kind: self.stmt(n),
                decs,
            })
            .collect();
        CaseClause {
            head,
            body,
            trailing: attached.trailing,
            decs,
        }
    }

    fn gen_decl(&mut self, node: Node<'_>) -> GenDecl {
        let text = self.text(node).to_string();
        let mut specs = Vec::new();
        self.collect_specs(node, &mut specs);
        GenDecl { text, specs }
    }

    fn collect_specs(&mut self, node: Node<'_>, specs: &mut Vec<Spec>) {
        for child in named_children(node) {
            match child.kind() {
                "var_spec" | "const_spec" => {
                    let names = field_children(child, "name")
                        .into_iter()
                        .map(|n| self.ident(n))
                        .collect();
                    let ty = child.child_by_field_name("type").map(|n| self.expr(n));
                    let values = child
                        .child_by_field_name("value")
                        .map(|n| self.expr_list(n))
                        .unwrap_or_default();
                    specs.push(Spec::Value(ValueSpec {
                        names,
                        ty,
                        values,
                        constant: child.kind() == "const_spec",
                    }));
                }
                "type_spec" | "type_alias" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let def = match child.child_by_field_name("type") {
                        Some(ty) => self.type_def(ty),
                        None => TypeDef::Other(Expr::raw("")),
                    };
                    specs.push(Spec::Type(TypeSpec {
                        name,
                        alias: child.kind() == "type_alias",
                        def,
                    }));
                }
                "var_spec_list" | "const_spec_list" | "type_spec_list" => {
                    self.collect_specs(child, specs)
                }
                _ => {}
            }
        }
    }

    fn type_def(&mut self, node: Node<'_>) -> TypeDef {
        match node.kind() {
            "struct_type" => {
                let mut fields = Vec::new();
                for list in named_children(node) {
                    if list.kind() != "field_declaration_list" {
                        continue;
                    }
                    for decl in named_children(list) {
                        if decl.kind() != "field_declaration" {
                            continue;
                        }
                        let Some(ty) = decl.child_by_field_name("type") else {
                            continue;
                        };
                        let ty = self.expr(ty);
                        let names = field_children(decl, "name");
                        if names.is_empty() {
                            fields.push(StructField { name: None, ty });
                        } else {
                            for name in names {
                                fields.push(StructField {
                                    name: Some(self.text(name).to_string()),
                                    ty: ty.clone(),
                                });
                            }
                        }
                    }
                }
                TypeDef::Struct(fields)
            }
            "interface_type" => {
                let mut embeds = Vec::new();
                let mut methods = Vec::new();
                for elem in named_children(node) {
                    match elem.kind() {
                        "method_elem" | "method_spec" => {
                            if let Some(name) = elem.child_by_field_name("name") {
                                methods.push(InterfaceMethod {
                                    name: self.text(name).to_string(),
                                    params: elem
                                        .child_by_field_name("parameters")
                                        .map(|n| self.field_list(n))
                                        .unwrap_or_default(),
                                    results: elem
                                        .child_by_field_name("result")
                                        .map(|n| self.results(n)),
                                });
                            }
                        }
                        "comment" => {}
                        "type_elem" | "constraint_elem" | "interface_type_name" => {
                            for ty in named_children(elem) {
                                embeds.push(self.expr(ty));
                            }
                        }
                        _ => embeds.push(self.expr(elem)),
                    }
                }
                TypeDef::Interface { embeds, methods }
            }
            _ => TypeDef::Other(self.expr(node)),
        }
    }

    fn expr_list_field(&mut self, node: Node<'_>, field: &str) -> Vec<Expr> {
        match node.child_by_field_name(field) {
            Some(list) if list.kind() == "expression_list" => self.expr_list(list),
            Some(single) => vec![self.expr(single)],
            None => Vec::new(),
        }
    }

    fn expr_list(&mut self, node: Node<'_>) -> Vec<Expr> {
        if node.kind() != "expression_list" {
            return vec![self.expr(node)];
        }
        named_children(node)
            .into_iter()
            .filter(|n| !is_comment(*n))
            .map(|n| self.expr(n))
            .collect()
    }

    fn expr(&mut self, node: Node<'_>) -> Expr {
        if has_direct_comment(node) && !matches!(node.kind(), "call_expression" | "func_literal")
        {
            return Expr::raw(self.text(node));
        }
        let kind = match node.kind() {
            "identifier" | "field_identifier" | "package_identifier" | "type_identifier"
            | "nil" | "true" | "false" | "iota" => ExprKind::Ident(self.ident(node)),
            "interpreted_string_literal" | "raw_string_literal" | "int_literal"
            | "float_literal" | "imaginary_literal" | "rune_literal" => {
                ExprKind::BasicLit(self.text(node).to_string())
            }
            "selector_expression" => {
                match (
                    node.child_by_field_name("operand"),
                    node.child_by_field_name("field"),
                ) {
                    (Some(x), Some(sel)) => ExprKind::Selector {
                        x: Box::new(self.expr(x)),
                        sel: self.ident(sel),
                    },
                    _ => ExprKind::Raw(self.text(node).to_string()),
                }
            }
            "qualified_type" => {
                match (
                    node.child_by_field_name("package"),
                    node.child_by_field_name("name"),
                ) {
                    (Some(pkg), Some(name)) => ExprKind::Selector {
                        x: Box::new(Expr::from_ident(self.ident(pkg))),
                        sel: self.ident(name),
                    },
                    _ => ExprKind::Raw(self.text(node).to_string()),
                }
            }
            "call_expression" => return self.call(node),
            "unary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|n| self.text(n).to_string());
                match (op, node.child_by_field_name("operand")) {
                    (Some(op), Some(x)) if op == "*" => ExprKind::Star(Box::new(self.expr(x))),
                    (Some(op), Some(x)) => ExprKind::Unary {
                        op,
                        x: Box::new(self.expr(x)),
                    },
                    _ => ExprKind::Raw(self.text(node).to_string()),
                }
            }
            "pointer_type" => match named_children(node).first() {
                Some(x) => ExprKind::Star(Box::new(self.expr(*x))),
                None => ExprKind::Raw(self.text(node).to_string()),
            },
            "binary_expression" => {
                match (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("operator"),
                    node.child_by_field_name("right"),
                ) {
                    // Operands split across lines keep their source layout.
                    (Some(x), _, Some(y)) if x.end_position().row != y.start_position().row => {
                        ExprKind::Raw(self.text(node).to_string())
                    }
                    (Some(x), Some(op), Some(y)) => ExprKind::Binary {
                        x: Box::new(self.expr(x)),
                        op: self.text(op).to_string(),
                        y: Box::new(self.expr(y)),
                    },
                    _ => ExprKind::Raw(self.text(node).to_string()),
                }
            }
            "parenthesized_expression" | "parenthesized_type" => {
                match named_children(node).first() {
                    Some(x) => ExprKind::Paren(Box::new(self.expr(*x))),
                    None => ExprKind::Raw(self.text(node).to_string()),
                }
            }
            "index_expression" => {
                match (
                    node.child_by_field_name("operand"),
                    node.child_by_field_name("index"),
                ) {
                    (Some(x), Some(index)) => ExprKind::Index {
                        x: Box::new(self.expr(x)),
                        indices: vec![self.expr(index)],
                    },
                    _ => ExprKind::Raw(self.text(node).to_string()),
                }
            }
            "generic_type" => {
                match (
                    node.child_by_field_name("type"),
                    node.child_by_field_name("type_arguments"),
                ) {
                    (Some(x), Some(args)) => {
                        let x = Box::new(self.expr(x));
                        let mut indices = Vec::new();
                        for arg in named_children(args) {
                            if arg.kind() == "type_elem" {
                                indices.extend(
                                    named_children(arg).into_iter().map(|n| self.expr(n)),
                                );
                            } else {
                                indices.push(self.expr(arg));
                            }
                        }
                        ExprKind::Index { x, indices }
                    }
                    _ => ExprKind::Raw(self.text(node).to_string()),
                }
            }
            "composite_literal" => match node.child_by_field_name("body") {
                Some(body) => ExprKind::CompositeLit {
                    ty: node
                        .child_by_field_name("type")
                        .map(|t| Box::new(self.expr(t))),
                    body: self.text(body).to_string(),
                },
                None => ExprKind::Raw(self.text(node).to_string()),
            },
            "func_literal" => {
                if has_direct_comment(node) {
                    return Expr::raw(self.text(node));
                }
                match node.child_by_field_name("body") {
                    Some(body) => ExprKind::FuncLit(FuncLit {
                        params: node
                            .child_by_field_name("parameters")
                            .map(|n| self.field_list(n))
                            .unwrap_or_default(),
                        results: node
                            .child_by_field_name("result")
                            .map(|n| self.results(n)),
                        body: self.block(body),
                    }),
                    None => ExprKind::Raw(self.text(node).to_string()),
                }
            }
            _ => ExprKind::Raw(self.text(node).to_string()),
        };
        Expr::new(kind)
    }

    fn call(&mut self, node: Node<'_>) -> Expr {
        let src = self.src;
        let range = node.byte_range();
        let raw = move || Expr::raw(&src[range.clone()]);
        let (Some(fun), Some(arg_list)) = (
            node.child_by_field_name("function"),
            node.child_by_field_name("arguments"),
        ) else {
            return raw();
        };
        if has_direct_comment(node) {
            return raw();
        }

        let mut fun = self.expr(fun);
        if let Some(type_args) = node.child_by_field_name("type_arguments") {
            let indices = named_children(type_args)
                .into_iter()
                .map(|n| self.expr(n))
                .collect();
            fun = Expr::new(ExprKind::Index {
                x: Box::new(fun),
                indices,
            });
        }

        let mut ellipsis = false;
        let mut nodes = Vec::new();
        for child in children(arg_list) {
            match child.kind() {
                "..." => ellipsis = true,
                "variadic_argument" => {
                    ellipsis = true;
                    nodes.push(child);
                }
                _ if child.is_named() => nodes.push(child),
                _ => {}
            }
        }

        let open_row = arg_list.start_position().row;
        let attached = self.attach(nodes, open_row);
        if !attached.trailing.is_empty() {
            return raw();
        }

        let mut last_row = open_row;
        let mut args = Vec::new();
        for (child, decs) in attached.items {
            last_row = child.end_position().row;
            let target = if child.kind() == "variadic_argument" {
                named_children(child).first().copied().unwrap_or(child)
            } else {
                child
            };
            let mut arg = self.expr(target);
            arg.decs = decs;
            args.push(arg);
        }

        let rparen_newline = !args.is_empty() && arg_list.end_position().row > last_row;
        Expr::new(ExprKind::Call(CallExpr {
            fun: Box::new(fun),
            args,
            ellipsis,
            rparen_newline,
        }))
    }
}

/// Strip the quotes from an interpreted or raw string literal.
pub fn unquote(lit: &str) -> String {
    let trimmed = lit.trim();
    let inner = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .unwrap_or(trimmed);
    inner.replace("\\\"", "\"").replace("\\\\", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> File {
        parse_file(src, &mut IdGen::new()).unwrap()
    }

    fn main_body(file: &File) -> &Block {
        file.funcs()
            .find(|f| f.name.name == "main")
            .and_then(|f| f.body.as_ref())
            .unwrap()
    }

    #[test]
    fn test_parse_package_and_imports() {
        let file = parse(
            "package main\n\nimport (\n\t\"fmt\"\n\tnr \"github.com/newrelic/go-agent/v3/newrelic\"\n)\n",
        );
        assert_eq!(file.package, "main");
        let imports: Vec<_> = file.imports().collect();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].path, "fmt");
        assert_eq!(imports[1].name.as_deref(), Some("nr"));
    }

    #[test]
    fn test_parse_reports_syntax_errors() {
        let err = parse_file("package main\n\nfunc main() {\n", &mut IdGen::new()).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn test_comments_become_decorations() {
        let file = parse(
            "package main\n\nfunc main() {\n\t// leading\n\twork() // trailing\n\n\tother()\n\t// tail\n}\n",
        );
        let body = main_body(&file);
        assert_eq!(body.stmts.len(), 2);
        assert_eq!(body.stmts[0].decs.start, vec!["// leading".to_string()]);
        assert_eq!(body.stmts[0].decs.end, vec![" // trailing".to_string()]);
        assert_eq!(body.stmts[1].decs.before, Space::EmptyLine);
        assert_eq!(body.trailing, vec!["// tail".to_string()]);
    }

    #[test]
    fn test_multiline_call_arguments() {
        let file = parse(
            "package main\n\nfunc main() {\n\tconn, err := grpc.Dial(\n\t\t\"host\",\n\t\tgrpc.WithInsecure(),\n\t)\n\t_, _ = conn, err\n}\n",
        );
        let body = main_body(&file);
        let StmtKind::Assign { rhs, op, .. } = &body.stmts[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(*op, AssignOp::Define);
        let call = rhs[0].as_call().unwrap();
        assert_eq!(call.args.len(), 2);
        assert!(call.is_multiline());
        assert!(call.rparen_newline);
    }

    #[test]
    fn test_method_declaration_and_struct_types() {
        let file = parse(
            "package main\n\ntype server struct {\n\tclient *http.Client\n}\n\nfunc (s *server) Get(ctx context.Context) error {\n\treturn nil\n}\n",
        );
        let decl = file.funcs().next().unwrap();
        assert_eq!(decl.key(), "server.Get");
        assert_eq!(decl.params.len(), 1);
        assert_eq!(decl.results.as_ref().unwrap().text, "error");

        let DeclKind::Gen(group) = &file.decls[0].kind else {
            panic!("expected type declaration");
        };
        let Spec::Type(spec) = &group.specs[0] else {
            panic!("expected type spec");
        };
        let TypeDef::Struct(fields) = &spec.def else {
            panic!("expected struct");
        };
        assert_eq!(fields[0].name.as_deref(), Some("client"));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"net/http\""), "net/http");
        assert_eq!(unquote("`raw`"), "raw");
    }
}
