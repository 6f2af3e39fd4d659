//! Moving transactions in and out of `context.Context` values.

use goinstr_syntax::ast::*;

use super::{is_qualified, method_call, nr};

/// `newrelic.NewContext(<ctx>, <txn>)`
pub fn wrap_context_expression(ctx: &Expr, txn: Expr) -> Expr {
    let mut ctx = ctx.clone();
    ctx.decs = Decorations::default();
    Expr::call(nr("NewContext"), vec![ctx, txn])
}

/// `<new_name> := newrelic.NewContext(<ctx>, <txn>)`
pub fn wrap_context(ctx: &Expr, txn: Expr, new_name: &str) -> Stmt {
    Stmt::define(
        vec![Expr::ident(new_name)],
        vec![wrap_context_expression(ctx, txn)],
    )
}

/// `newrelic.FromContext(<ctx>)`
pub fn txn_from_context_expression(ctx: Expr) -> Expr {
    Expr::call(nr("FromContext"), vec![ctx])
}

/// `<name> := newrelic.FromContext(<ctx>)`
pub fn txn_from_context(name: &str, ctx: Expr) -> Stmt {
    Stmt::define(
        vec![Expr::ident(name)],
        vec![txn_from_context_expression(ctx)],
    )
}

/// `<stream>.Context()`
pub fn stream_context(stream: &str) -> Expr {
    method_call(Expr::ident(stream), "Context", Vec::new())
}

/// The variable bound by a `<name> := newrelic.FromContext(..)` statement.
pub fn from_context_binding(stmt: &Stmt) -> Option<&str> {
    let StmtKind::Assign { lhs, rhs, .. } = &stmt.kind else {
        return None;
    };
    match (lhs.as_slice(), rhs.as_slice()) {
        ([name], [value]) => {
            let call = value.as_call()?;
            if !is_qualified(&call.fun, "newrelic", "FromContext") {
                return None;
            }
            name.as_ident().map(|id| id.name.as_str())
        }
        _ => None,
    }
}

/// Whether `expr` already wraps a context with a transaction.
pub fn is_wrapped_context(expr: &Expr) -> bool {
    expr.as_call()
        .is_some_and(|call| is_qualified(&call.fun, "newrelic", "NewContext"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use goinstr_syntax::printer::stmts_to_string;

    #[test]
    fn test_context_fragments() {
        let ctx = Expr::ident("ctx");
        let stmts = vec![
            txn_from_context("nrTxn", stream_context("stream")),
            wrap_context(&ctx, Expr::ident("nrTxn"), "nrCtx"),
        ];
        assert_eq!(
            stmts_to_string(&stmts, 0),
            "nrTxn := newrelic.FromContext(stream.Context())\n\
             nrCtx := newrelic.NewContext(ctx, nrTxn)\n"
        );
        assert_eq!(from_context_binding(&stmts[0]), Some("nrTxn"));
        assert_eq!(from_context_binding(&stmts[1]), None);
    }

    #[test]
    fn test_wrapped_expression_drops_argument_layout() {
        let mut ctx = Expr::ident("ctx");
        ctx.decs.before = Space::NewLine;
        let wrapped = wrap_context_expression(&ctx, Expr::ident("nrTxn"));
        assert_eq!(wrapped.to_string(), "newrelic.NewContext(ctx, nrTxn)");
        assert!(is_wrapped_context(&wrapped));
        assert!(!is_wrapped_context(&ctx));
    }
}
