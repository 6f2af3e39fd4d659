//! Traversal helpers over statement lists and expressions.

use crate::ast::*;

/// Position within a statement list being walked by [`walk_list`].
///
/// Statements inserted before the current one are placed immediately and
/// skipped by the walk. Statements inserted after it are spliced in, in call
/// order, once the visitor returns, and are not visited either.
pub struct Cursor<'a> {
    stmts: &'a mut Vec<Stmt>,
    index: usize,
    after: Vec<Stmt>,
}

impl<'a> Cursor<'a> {
    pub fn stmt(&self) -> &Stmt {
        &self.stmts[self.index]
    }

    pub fn stmt_mut(&mut self) -> &mut Stmt {
        &mut self.stmts[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The statement preceding the current one, including inserted ones.
    pub fn prev(&self) -> Option<&Stmt> {
        self.index.checked_sub(1).map(|i| &self.stmts[i])
    }

    /// Statements that follow the current one in the original list.
    pub fn rest(&self) -> &[Stmt] {
        &self.stmts[self.index + 1..]
    }

    pub fn rest_mut(&mut self) -> &mut [Stmt] {
        &mut self.stmts[self.index + 1..]
    }

    pub fn insert_before(&mut self, stmt: Stmt) {
        self.stmts.insert(self.index, stmt);
        self.index += 1;
    }

    pub fn insert_after(&mut self, stmt: Stmt) {
        self.after.push(stmt);
    }

    /// Insert `stmt` after `rest()[offset]`. Unlike [`Cursor::insert_after`]
    /// the statement is visited when the walk reaches it.
    pub fn insert_later(&mut self, offset: usize, stmt: Stmt) {
        let at = (self.index + 2 + offset).min(self.stmts.len());
        self.stmts.insert(at, stmt);
    }

    /// Replace the current statement, returning the old one.
    pub fn replace(&mut self, stmt: Stmt) -> Stmt {
        std::mem::replace(&mut self.stmts[self.index], stmt)
    }
}

/// Visit each statement of `stmts` in order. The visitor decides whether to
/// descend into nested blocks.
pub fn walk_list<F>(stmts: &mut Vec<Stmt>, visit: &mut F)
where
    F: FnMut(&mut Cursor<'_>),
{
    let mut i = 0;
    while i < stmts.len() {
        let mut cursor = Cursor {
            stmts: &mut *stmts,
            index: i,
            after: Vec::new(),
        };
        visit(&mut cursor);
        let Cursor { index, after, .. } = cursor;
        let inserted = after.len();
        for (k, stmt) in after.into_iter().enumerate() {
            stmts.insert(index + 1 + k, stmt);
        }
        i = index + 1 + inserted;
    }
}

/// The statement's own expressions, excluding nested blocks.
pub fn stmt_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match &stmt.kind {
        StmtKind::Expr(e) | StmtKind::Go(e) | StmtKind::Defer(e) => vec![e],
        StmtKind::Assign { lhs, rhs, .. } => lhs.iter().chain(rhs.iter()).collect(),
        StmtKind::Return(results) => results.iter().collect(),
        StmtKind::If(s) => {
            let mut out = s.init.as_deref().map(stmt_exprs).unwrap_or_default();
            out.push(&s.cond);
            out
        }
        StmtKind::For(f) => match &f.header {
            ForHeader::Cond(c) => vec![c],
            ForHeader::Range { x, .. } => vec![x],
            _ => Vec::new(),
        },
        StmtKind::Labeled { stmt, .. } => stmt_exprs(stmt),
        StmtKind::Decl(group) => group
            .specs
            .iter()
            .flat_map(|spec| match spec {
                Spec::Value(v) => v.values.iter().collect::<Vec<_>>(),
                Spec::Type(_) => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Mutable counterpart of [`stmt_exprs`]. Declarations are printed
/// verbatim, so their values are not offered for editing.
pub fn stmt_exprs_mut(stmt: &mut Stmt) -> Vec<&mut Expr> {
    match &mut stmt.kind {
        StmtKind::Expr(e) | StmtKind::Go(e) | StmtKind::Defer(e) => vec![e],
        StmtKind::Assign { lhs, rhs, .. } => lhs.iter_mut().chain(rhs.iter_mut()).collect(),
        StmtKind::Return(results) => results.iter_mut().collect(),
        StmtKind::If(s) => {
            let mut out = s.init.as_deref_mut().map(stmt_exprs_mut).unwrap_or_default();
            out.push(&mut s.cond);
            out
        }
        StmtKind::For(f) => match &mut f.header {
            ForHeader::Cond(c) => vec![c],
            ForHeader::Range { x, .. } => vec![x],
            _ => Vec::new(),
        },
        StmtKind::Labeled { stmt, .. } => stmt_exprs_mut(stmt),
        _ => Vec::new(),
    }
}

/// Visit every expression nested in `expr`, pre-order.
pub fn walk_expr<'e>(expr: &'e Expr, into_func_lits: bool, f: &mut dyn FnMut(&'e Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Selector { x, .. }
        | ExprKind::Star(x)
        | ExprKind::Unary { x, .. }
        | ExprKind::Paren(x) => walk_expr(x, into_func_lits, f),
        ExprKind::Binary { x, y, .. } => {
            walk_expr(x, into_func_lits, f);
            walk_expr(y, into_func_lits, f);
        }
        ExprKind::Call(call) => {
            walk_expr(&call.fun, into_func_lits, f);
            for arg in &call.args {
                walk_expr(arg, into_func_lits, f);
            }
        }
        ExprKind::Index { x, indices } => {
            walk_expr(x, into_func_lits, f);
            for index in indices {
                walk_expr(index, into_func_lits, f);
            }
        }
        ExprKind::CompositeLit { ty: Some(ty), .. } => walk_expr(ty, into_func_lits, f),
        ExprKind::FuncLit(lit) if into_func_lits => {
            walk_stmts(&lit.body.stmts, &mut |s| {
                for e in stmt_exprs(s) {
                    walk_expr(e, true, &mut *f);
                }
            });
        }
        _ => {}
    }
}

/// Visit every statement of `stmts` and its nested blocks, pre-order.
/// Function literal bodies are not entered.
pub fn walk_stmts<'s>(stmts: &'s [Stmt], f: &mut dyn FnMut(&'s Stmt)) {
    for stmt in stmts {
        walk_stmt(stmt, f);
    }
}

fn walk_stmt<'s>(stmt: &'s Stmt, f: &mut dyn FnMut(&'s Stmt)) {
    f(stmt);
    if let StmtKind::If(s) = &stmt.kind {
        walk_stmts(&s.body.stmts, f);
        if let Some(els) = &s.els {
            walk_stmt(els, f);
        }
        return;
    }
    for block in stmt.blocks() {
        walk_stmts(block, f);
    }
}

/// Visit every call expression in `expr`, children before parents.
pub fn visit_calls_mut(expr: &mut Expr, into_func_lits: bool, f: &mut dyn FnMut(&mut CallExpr)) {
    match &mut expr.kind {
        ExprKind::Selector { x, .. }
        | ExprKind::Star(x)
        | ExprKind::Unary { x, .. }
        | ExprKind::Paren(x) => visit_calls_mut(x, into_func_lits, f),
        ExprKind::Binary { x, y, .. } => {
            visit_calls_mut(x, into_func_lits, f);
            visit_calls_mut(y, into_func_lits, f);
        }
        ExprKind::Call(call) => {
            visit_calls_mut(&mut call.fun, into_func_lits, f);
            for arg in &mut call.args {
                visit_calls_mut(arg, into_func_lits, f);
            }
            f(call);
        }
        ExprKind::Index { x, indices } => {
            visit_calls_mut(x, into_func_lits, f);
            for index in indices {
                visit_calls_mut(index, into_func_lits, f);
            }
        }
        ExprKind::FuncLit(lit) if into_func_lits => {
            visit_calls_in_stmts_mut(&mut lit.body.stmts, f);
        }
        _ => {}
    }
}

/// Visit every call in every statement of `stmts`, including nested blocks
/// and function literal bodies.
pub fn visit_calls_in_stmts_mut(stmts: &mut [Stmt], f: &mut dyn FnMut(&mut CallExpr)) {
    for stmt in stmts {
        visit_calls_in_stmt_mut(stmt, f);
    }
}

fn visit_calls_in_stmt_mut(stmt: &mut Stmt, f: &mut dyn FnMut(&mut CallExpr)) {
    for e in stmt_exprs_mut(stmt) {
        visit_calls_mut(e, true, f);
    }
    if let StmtKind::If(s) = &mut stmt.kind {
        visit_calls_in_stmts_mut(&mut s.body.stmts, f);
        if let Some(els) = s.els.as_deref_mut() {
            visit_calls_in_stmt_mut(els, f);
        }
        return;
    }
    for block in stmt.blocks_mut() {
        visit_calls_in_stmts_mut(block, f);
    }
}

/// Visit every identifier in `expr`, entering function literals.
pub fn visit_idents_mut(expr: &mut Expr, f: &mut dyn FnMut(&mut Ident)) {
    match &mut expr.kind {
        ExprKind::Ident(id) => f(id),
        // The selected name is a field or method, never a variable use.
        ExprKind::Selector { x, .. } => visit_idents_mut(x, f),
        ExprKind::Star(x) | ExprKind::Unary { x, .. } | ExprKind::Paren(x) => {
            visit_idents_mut(x, f)
        }
        ExprKind::Binary { x, y, .. } => {
            visit_idents_mut(x, f);
            visit_idents_mut(y, f);
        }
        ExprKind::Call(call) => {
            visit_idents_mut(&mut call.fun, f);
            for arg in &mut call.args {
                visit_idents_mut(arg, f);
            }
        }
        ExprKind::Index { x, indices } => {
            visit_idents_mut(x, f);
            for index in indices {
                visit_idents_mut(index, f);
            }
        }
        ExprKind::FuncLit(lit) => visit_idents_in_stmts_mut(&mut lit.body.stmts, f),
        _ => {}
    }
}

/// Visit every identifier in `stmts`, including nested blocks.
pub fn visit_idents_in_stmts_mut(stmts: &mut [Stmt], f: &mut dyn FnMut(&mut Ident)) {
    for stmt in stmts {
        for e in stmt_exprs_mut(stmt) {
            visit_idents_mut(e, f);
        }
        if let StmtKind::If(s) = &mut stmt.kind {
            visit_idents_in_stmts_mut(&mut s.body.stmts, f);
            if let Some(els) = s.els.as_deref_mut() {
                visit_idents_in_stmts_mut(std::slice::from_mut(els), f);
            }
            continue;
        }
        for block in stmt.blocks_mut() {
            visit_idents_in_stmts_mut(block, f);
        }
    }
}

/// Whether any expression of `stmt`, or of its nested blocks, refers to the
/// identifier `name`.
pub fn mentions(stmt: &Stmt, name: &str) -> bool {
    let mut found = false;
    walk_stmt(stmt, &mut |s| {
        for e in stmt_exprs(s) {
            walk_expr(e, true, &mut |x| {
                if x.is_ident(name) {
                    found = true;
                }
            });
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::stmts_to_string;

    fn call_stmt(name: &str) -> Stmt {
        Stmt::expr(Expr::call(Expr::ident(name), vec![]))
    }

    #[test]
    fn test_inserted_statements_are_not_revisited() {
        let mut stmts = vec![call_stmt("a"), call_stmt("b")];
        let mut seen = Vec::new();
        walk_list(&mut stmts, &mut |cursor| {
            let name = cursor.stmt().call().and_then(|c| c.fun_name()).unwrap().to_string();
            seen.push(name.clone());
            cursor.insert_before(call_stmt(&format!("{name}_before")));
            cursor.insert_after(call_stmt(&format!("{name}_after1")));
            cursor.insert_after(call_stmt(&format!("{name}_after2")));
        });
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(
            stmts_to_string(&stmts, 0),
            "a_before()\na()\na_after1()\na_after2()\nb_before()\nb()\nb_after1()\nb_after2()\n"
        );
    }

    #[test]
    fn test_statements_inserted_later_are_visited() {
        let mut stmts = vec![call_stmt("a"), call_stmt("b"), call_stmt("c")];
        let mut seen = Vec::new();
        walk_list(&mut stmts, &mut |cursor| {
            let name = cursor.stmt().call().and_then(|c| c.fun_name()).unwrap().to_string();
            if name == "a" {
                cursor.insert_later(0, call_stmt("late"));
                cursor.insert_after(call_stmt("now"));
            }
            seen.push(name);
        });
        assert_eq!(seen, vec!["a", "b", "late", "c"]);
        assert_eq!(stmts_to_string(&stmts, 0), "a()\nnow()\nb()\nlate()\nc()\n");
    }

    #[test]
    fn test_visit_calls_enters_nested_blocks_and_literals() {
        let lit = Expr::new(ExprKind::FuncLit(FuncLit {
            params: FieldList::default(),
            results: None,
            body: Block::new(vec![call_stmt("inner")]),
        }));
        let mut stmts = vec![Stmt::if_stmt(
            Expr::call(Expr::ident("cond"), vec![]),
            vec![Stmt::go(Expr::call(lit, vec![]))],
        )];
        let mut names = Vec::new();
        visit_calls_in_stmts_mut(&mut stmts, &mut |call| {
            names.push(call.fun_name().unwrap_or("<lit>").to_string());
        });
        assert_eq!(names, vec!["cond", "inner", "<lit>"]);
    }

    #[test]
    fn test_mentions() {
        let stmt = Stmt::assign(
            vec![Expr::ident("_")],
            vec![Expr::selector(Expr::ident("row"), "Scan")],
        );
        assert!(mentions(&stmt, "row"));
        assert!(!mentions(&stmt, "Scan"));
    }
}
