//! gofmt-style printer for the decorated tree.
//!
//! Layout follows `go/printer`: tab indentation, comments printed where
//! their [`Decorations`] place them, and binary expression spacing chosen by
//! the same precedence cutoff gofmt uses, so `a + b*c` prints the way gofmt
//! would print it.

use std::fmt::Write as _;

use crate::ast::*;

const LOWEST_PREC: u8 = 0;
const UNARY_PREC: u8 = 6;
const HIGHEST_PREC: u8 = 7;
/// Widest line a one-line function body may produce, as in `go/printer`.
const MAX_ONE_LINE: usize = 100;

/// Print a whole file.
pub fn print_file(file: &File) -> String {
    let mut p = Printer::default();
    p.file(file);
    p.out
}

/// Print a single expression on one line of context (indent 0).
pub fn expr_to_string(expr: &Expr) -> String {
    let mut p = Printer::default();
    p.expr(expr);
    p.out
}

/// Print a statement list as it would appear inside a block at `indent`.
pub fn stmts_to_string(stmts: &[Stmt], indent: usize) -> String {
    let mut p = Printer {
        indent,
        ..Default::default()
    };
    p.stmt_list(stmts);
    p.out
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&expr_to_string(self))
    }
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

fn precedence(op: &str) -> u8 {
    match op {
        "||" => 1,
        "&&" => 2,
        "==" | "!=" | "<" | "<=" | ">" | ">=" => 3,
        "+" | "-" | "|" | "^" => 4,
        "*" | "/" | "%" | "<<" | ">>" | "&" | "&^" => 5,
        _ => LOWEST_PREC,
    }
}

fn reduce_depth(depth: usize) -> usize {
    depth.saturating_sub(1).max(1)
}

fn diff_prec(expr: &Expr, prec: u8) -> usize {
    match &expr.kind {
        ExprKind::Binary { op, .. } if precedence(op) == prec => 0,
        _ => 1,
    }
}

/// Returns `(has4, has5, max_problem)` for the binary expression tree rooted
/// at `(x, op, y)`.
fn walk_binary(x: &Expr, op: &str, y: &Expr) -> (bool, bool, u8) {
    let prec = precedence(op);
    let mut has4 = prec == 4;
    let mut has5 = prec == 5;
    let mut max_problem = 0;

    if let ExprKind::Binary { x: lx, op: lop, y: ly } = &x.kind {
        if precedence(lop) >= prec {
            let (h4, h5, mp) = walk_binary(lx, lop, ly);
            has4 |= h4;
            has5 |= h5;
            max_problem = max_problem.max(mp);
        }
    }

    match &y.kind {
        ExprKind::Binary { x: rx, op: rop, y: ry } => {
            if precedence(rop) > prec {
                let (h4, h5, mp) = walk_binary(rx, rop, ry);
                has4 |= h4;
                has5 |= h5;
                max_problem = max_problem.max(mp);
            }
        }
        ExprKind::Star(_) if op == "/" => max_problem = 5,
        ExprKind::Unary { op: uop, .. } => match format!("{op}{uop}").as_str() {
            "/*" | "&&" | "&^" => max_problem = 5,
            "++" | "--" => max_problem = max_problem.max(4),
            _ => {}
        },
        _ => {}
    }
    (has4, has5, max_problem)
}

fn cutoff(x: &Expr, op: &str, y: &Expr, depth: usize) -> u8 {
    let (has4, has5, max_problem) = walk_binary(x, op, y);
    if max_problem > 0 {
        return max_problem + 1;
    }
    if has4 && has5 {
        return if depth == 1 { 5 } else { 4 };
    }
    if depth == 1 { 6 } else { 4 }
}

fn strip_parens(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Paren(inner) if !has_composite_literal(inner) => strip_parens(inner),
        _ => expr,
    }
}

fn has_composite_literal(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::CompositeLit { .. } => true,
        ExprKind::Raw(text) => text.contains('{'),
        ExprKind::Selector { x, .. } | ExprKind::Star(x) | ExprKind::Paren(x) => {
            has_composite_literal(x)
        }
        ExprKind::Unary { x, .. } => has_composite_literal(x),
        ExprKind::Binary { x, y, .. } => has_composite_literal(x) || has_composite_literal(y),
        ExprKind::Call(call) => {
            has_composite_literal(&call.fun) || call.args.iter().any(has_composite_literal)
        }
        _ => false,
    }
}

impl Printer {
    fn tabs(&mut self, n: usize) {
        for _ in 0..n {
            self.out.push('\t');
        }
    }

    fn newline(&mut self, indent: usize) {
        self.out.push('\n');
        self.tabs(indent);
    }

    fn end_comments(&mut self, decs: &Decorations) {
        for comment in &decs.end {
            self.out.push_str(comment);
        }
    }

    /// Comment lines printed above a node, each followed by a newline.
    fn comment_lines(&mut self, lines: &[String], indent: usize) {
        for line in lines {
            if !line.is_empty() {
                self.tabs(indent);
                self.out.push_str(line);
            }
            self.out.push('\n');
        }
    }

    fn file(&mut self, file: &File) {
        self.comment_lines(&file.package_decs.start, 0);
        let _ = write!(self.out, "package {}", file.package);
        self.end_comments(&file.package_decs);
        self.out.push('\n');

        for decl in &file.decls {
            if decl.decs.before == Space::EmptyLine {
                self.out.push('\n');
            }
            self.comment_lines(&decl.decs.start, 0);
            match &decl.kind {
                DeclKind::Import(imp) => self.import_decl(imp),
                DeclKind::Func(func) => self.func_decl(func),
                DeclKind::Gen(group) => self.out.push_str(&group.text),
                DeclKind::Raw(text) => self.out.push_str(text),
            }
            self.end_comments(&decl.decs);
            self.out.push('\n');
        }

        if !file.trailing.is_empty() {
            self.comment_lines(&file.trailing, 0);
        }
    }

    fn import_spec(&mut self, spec: &ImportSpec) {
        if let Some(name) = &spec.name {
            self.out.push_str(name);
            self.out.push(' ');
        }
        let _ = write!(self.out, "\"{}\"", spec.path);
        self.end_comments(&spec.decs);
    }

    fn import_decl(&mut self, imp: &ImportDecl) {
        self.out.push_str("import ");
        if !imp.grouped {
            if let Some(spec) = imp.specs.first() {
                self.import_spec(spec);
            }
            return;
        }
        self.out.push('(');
        for (i, spec) in imp.specs.iter().enumerate() {
            self.out.push('\n');
            if i > 0 && spec.decs.before == Space::EmptyLine {
                self.out.push('\n');
            }
            self.comment_lines(&spec.decs.start, 1);
            self.tabs(1);
            self.import_spec(spec);
        }
        self.out.push('\n');
        self.comment_lines(&imp.trailing, 1);
        self.out.push(')');
    }

    fn func_decl(&mut self, func: &FuncDecl) {
        self.out.push_str("func ");
        if let Some(recv) = &func.recv {
            self.field_list(recv);
            self.out.push(' ');
        }
        self.out.push_str(&func.name.name);
        if let Some(tp) = &func.type_params {
            self.out.push_str(tp);
        }
        self.signature(&func.params, func.results.as_ref());
        if let Some(body) = &func.body {
            self.out.push(' ');
            self.func_body(body);
        }
    }

    fn signature(&mut self, params: &FieldList, results: Option<&Results>) {
        self.field_list(params);
        if let Some(results) = results {
            self.out.push(' ');
            self.out.push_str(&results.text);
        }
    }

    fn field(&mut self, field: &Field) {
        for (i, name) in field.names.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(&name.name);
        }
        if !field.names.is_empty() {
            self.out.push(' ');
        }
        if field.variadic {
            self.out.push_str("...");
        }
        self.expr(&field.ty);
    }

    fn field_list(&mut self, list: &FieldList) {
        self.out.push('(');
        let multiline = list.fields.iter().any(|f| f.decs.before.is_line_break());
        let last = list.fields.len().saturating_sub(1);
        for (i, field) in list.fields.iter().enumerate() {
            if multiline && field.decs.before.is_line_break() {
                for comment in &field.decs.start {
                    self.newline(self.indent + 1);
                    self.out.push_str(comment);
                }
                self.newline(self.indent + 1);
            } else if i > 0 {
                self.out.push(' ');
            }
            self.field(field);
            if i < last || (multiline && list.rparen_newline) {
                self.out.push(',');
            }
            self.end_comments(&field.decs);
        }
        if multiline && list.rparen_newline {
            self.newline(self.indent);
        }
        self.out.push(')');
    }

    fn func_body(&mut self, block: &Block) {
        match self.one_line_body(block) {
            Some(line) => self.out.push_str(&line),
            None => self.block(block),
        }
    }

    /// `{ a; b }` for a body written on one line whose statements all
    /// still sit on the brace's line without comments.
    fn one_line_body(&self, block: &Block) -> Option<String> {
        if !block.inline || block.stmts.is_empty() {
            return None;
        }
        let mut parts = Vec::new();
        for stmt in &block.stmts {
            let plain = stmt.decs.before == Space::None
                && stmt.decs.start.is_empty()
                && stmt.decs.end.is_empty()
                && !matches!(stmt.kind, StmtKind::Labeled { .. });
            if !plain {
                return None;
            }
            let mut p = Printer::default();
            p.stmt(stmt);
            if p.out.contains('\n') {
                return None;
            }
            parts.push(p.out);
        }
        let line = format!("{{ {} }}", parts.join("; "));
        let column = self.out.len() - self.out.rfind('\n').map_or(0, |i| i + 1);
        (column + line.len() <= MAX_ONE_LINE).then_some(line)
    }

    fn block(&mut self, block: &Block) {
        if block.stmts.is_empty() && block.trailing.is_empty() {
            if block.inline {
                self.out.push_str("{}");
            } else {
                self.out.push('{');
                self.newline(self.indent);
                self.out.push('}');
            }
            return;
        }
        self.out.push_str("{\n");
        self.indent += 1;
        self.stmt_list(&block.stmts);
        self.comment_lines(&block.trailing, self.indent);
        self.indent -= 1;
        self.tabs(self.indent);
        self.out.push('}');
    }

    /// Statements at the current indent, each terminated by a newline.
    fn stmt_list(&mut self, stmts: &[Stmt]) {
        for (i, stmt) in stmts.iter().enumerate() {
            if i > 0
                && (stmts[i - 1].decs.after == Space::EmptyLine
                    || stmt.decs.before == Space::EmptyLine)
            {
                self.out.push('\n');
            }
            self.comment_lines(&stmt.decs.start, self.indent);
            if let StmtKind::Labeled { label, stmt: inner } = &stmt.kind {
                self.tabs(self.indent.saturating_sub(1));
                let _ = write!(self.out, "{label}:");
                self.newline(self.indent);
                self.stmt(inner);
                self.end_comments(&inner.decs);
            } else {
                self.tabs(self.indent);
                self.stmt(stmt);
            }
            self.end_comments(&stmt.decs);
            self.out.push('\n');
        }
    }

    fn expr_list(&mut self, exprs: &[Expr], depth: usize) {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr1(e, LOWEST_PREC, depth);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(e) => self.expr(e),
            StmtKind::Assign { lhs, op, rhs } => {
                let depth = if lhs.len() > 1 && rhs.len() > 1 { 2 } else { 1 };
                self.expr_list(lhs, depth);
                self.out.push_str(match op {
                    AssignOp::Define => " := ",
                    AssignOp::Assign => " = ",
                });
                self.expr_list(rhs, depth);
            }
            StmtKind::Go(e) => {
                self.out.push_str("go ");
                self.expr(e);
            }
            StmtKind::Defer(e) => {
                self.out.push_str("defer ");
                self.expr(e);
            }
            StmtKind::Return(results) => {
                self.out.push_str("return");
                if !results.is_empty() {
                    self.out.push(' ');
                    self.expr_list(results, 1);
                }
            }
            StmtKind::If(s) => self.if_stmt(s),
            StmtKind::For(s) => {
                self.out.push_str("for ");
                match &s.header {
                    ForHeader::Infinite => {}
                    ForHeader::Cond(cond) => {
                        self.expr(strip_parens(cond));
                        self.out.push(' ');
                    }
                    ForHeader::Clause(text) => {
                        self.out.push_str(text);
                        self.out.push(' ');
                    }
                    ForHeader::Range { key, value, op, x } => {
                        if let Some(key) = key {
                            self.expr(key);
                            if let Some(value) = value {
                                self.out.push_str(", ");
                                self.expr(value);
                            }
                            self.out.push_str(match op {
                                Some(AssignOp::Assign) => " = ",
                                _ => " := ",
                            });
                        }
                        self.out.push_str("range ");
                        self.expr(strip_parens(x));
                        self.out.push(' ');
                    }
                }
                self.block(&s.body);
            }
            StmtKind::Switch(s) => {
                self.out.push_str("switch ");
                if let Some(header) = &s.header {
                    self.out.push_str(header);
                    self.out.push(' ');
                }
                self.clauses(&s.clauses, &s.trailing);
            }
            StmtKind::Select(s) => {
                self.out.push_str("select ");
                self.clauses(&s.clauses, &s.trailing);
            }
            StmtKind::Block(b) => self.block(b),
            StmtKind::Labeled { label, stmt } => {
                let _ = write!(self.out, "{label}: ");
                self.stmt(stmt);
            }
            StmtKind::Decl(group) => self.out.push_str(&group.text),
            StmtKind::Raw(text) => self.out.push_str(text),
        }
    }

    fn if_stmt(&mut self, s: &IfStmt) {
        self.out.push_str("if ");
        if let Some(init) = &s.init {
            self.stmt(init);
            self.out.push_str("; ");
        }
        self.expr(strip_parens(&s.cond));
        self.out.push(' ');
        self.block(&s.body);
        if let Some(els) = &s.els {
            self.out.push_str(" else ");
            self.stmt(els);
        }
    }

    fn clauses(&mut self, clauses: &[CaseClause], trailing: &[String]) {
        if clauses.is_empty() && trailing.is_empty() {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{\n");
        for clause in clauses {
            if clause.decs.before == Space::EmptyLine {
                self.out.push('\n');
            }
            self.comment_lines(&clause.decs.start, self.indent);
            self.tabs(self.indent);
            self.out.push_str(&clause.head);
            self.end_comments(&clause.decs);
            self.out.push('\n');
            self.indent += 1;
            self.stmt_list(&clause.body);
            self.comment_lines(&clause.trailing, self.indent);
            self.indent -= 1;
        }
        self.comment_lines(trailing, self.indent);
        self.tabs(self.indent);
        self.out.push('}');
    }

    fn expr(&mut self, e: &Expr) {
        self.expr1(e, LOWEST_PREC, 1);
    }

    fn expr1(&mut self, e: &Expr, prec1: u8, depth: usize) {
        match &e.kind {
            ExprKind::Ident(id) => self.out.push_str(&id.name),
            ExprKind::BasicLit(text) | ExprKind::Raw(text) => self.out.push_str(text),
            ExprKind::Selector { x, sel } => {
                self.expr1(x, HIGHEST_PREC, depth);
                self.out.push('.');
                self.out.push_str(&sel.name);
            }
            ExprKind::Call(call) => self.call(call, depth),
            ExprKind::Star(x) => {
                if UNARY_PREC < prec1 {
                    self.out.push_str("(*");
                    self.expr(x);
                    self.out.push(')');
                } else {
                    self.out.push('*');
                    self.expr(x);
                }
            }
            ExprKind::Unary { op, x } => {
                if UNARY_PREC < prec1 {
                    self.out.push('(');
                    self.expr(e);
                    self.out.push(')');
                } else {
                    self.out.push_str(op);
                    self.expr1(x, UNARY_PREC, depth);
                }
            }
            ExprKind::Binary { x, op, y } => self.binary(e, x, op, y, prec1, depth.max(1)),
            ExprKind::Paren(inner) => {
                if matches!(inner.kind, ExprKind::Paren(_)) {
                    self.expr1(inner, LOWEST_PREC, depth);
                } else {
                    self.out.push('(');
                    self.expr1(inner, LOWEST_PREC, reduce_depth(depth));
                    self.out.push(')');
                }
            }
            ExprKind::Index { x, indices } => {
                self.expr1(x, HIGHEST_PREC, 1);
                self.out.push('[');
                self.expr_list(indices, depth + 1);
                self.out.push(']');
            }
            ExprKind::CompositeLit { ty, body } => {
                if let Some(ty) = ty {
                    self.expr1(ty, HIGHEST_PREC, depth);
                }
                self.out.push_str(body);
            }
            ExprKind::FuncLit(lit) => {
                self.out.push_str("func");
                self.signature(&lit.params, lit.results.as_ref());
                self.out.push(' ');
                self.func_body(&lit.body);
            }
        }
    }

    fn binary(&mut self, whole: &Expr, x: &Expr, op: &str, y: &Expr, prec1: u8, depth: usize) {
        let prec = precedence(op);
        if prec < prec1 {
            self.out.push('(');
            self.expr1(whole, LOWEST_PREC, reduce_depth(depth));
            self.out.push(')');
            return;
        }
        let blank = prec < cutoff(x, op, y, depth);
        self.expr1(x, prec, depth + diff_prec(x, prec));
        if blank {
            self.out.push(' ');
        }
        self.out.push_str(op);
        if blank {
            self.out.push(' ');
        }
        self.expr1(y, prec + 1, depth + 1);
    }

    fn call(&mut self, call: &CallExpr, depth: usize) {
        let depth = if call.args.len() > 1 { depth + 1 } else { depth };
        self.expr1(&call.fun, HIGHEST_PREC, depth);
        self.out.push('(');

        let multiline = call.is_multiline();
        let last = call.args.len().saturating_sub(1);
        for (i, arg) in call.args.iter().enumerate() {
            if multiline && arg.decs.before.is_line_break() {
                if i > 0 && arg.decs.before == Space::EmptyLine {
                    self.out.push('\n');
                }
                for comment in &arg.decs.start {
                    self.newline(self.indent + 1);
                    self.out.push_str(comment);
                }
                self.newline(self.indent + 1);
            } else if i > 0 {
                self.out.push(' ');
            }

            self.indent += usize::from(multiline);
            self.expr1(arg, LOWEST_PREC, depth);
            self.indent -= usize::from(multiline);

            if i == last && call.ellipsis {
                self.out.push_str("...");
            }
            if multiline {
                if i < last || call.rparen_newline {
                    self.out.push(',');
                }
                self.end_comments(&arg.decs);
            } else {
                self.end_comments(&arg.decs);
                if i < last {
                    self.out.push(',');
                }
            }
        }

        if multiline && call.rparen_newline {
            self.newline(self.indent);
        }
        self.out.push(')');
    }
}
