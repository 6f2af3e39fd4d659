//! Constructors for the syntax fragments the engine inserts.
//!
//! Every constructor that embeds a node borrowed from the application tree
//! clones it, so a fragment never shares a subtree with the code it was
//! derived from.

pub mod advice;
pub mod context;
pub mod errors;
pub mod grpc;
pub mod http;
pub mod spacing;
pub mod txn;

use goinstr_syntax::ast::*;

/// `newrelic.<name>`
pub fn nr(name: &str) -> Expr {
    Expr::qualified("newrelic", name)
}

/// `<recv>.<name>(<args>)`
pub fn method_call(recv: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::selector(recv, name), args)
}

/// `*newrelic.Transaction`
pub fn transaction_type() -> Expr {
    Expr::star(nr("Transaction"))
}

/// Whether `expr` is `<pkg>.<name>` for the package name `pkg`.
pub fn is_qualified(expr: &Expr, pkg: &str, name: &str) -> bool {
    matches!(expr.as_selector(), Some((x, sel)) if x.is_ident(pkg) && sel.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_helpers() {
        let ty = transaction_type();
        assert_eq!(ty.to_string(), "*newrelic.Transaction");
        assert!(is_qualified(&nr("FromContext"), "newrelic", "FromContext"));
        assert!(!is_qualified(&Expr::ident("FromContext"), "newrelic", "FromContext"));
        let call = method_call(Expr::ident("nrTxn"), "End", Vec::new());
        assert_eq!(call.to_string(), "nrTxn.End()");
    }
}
