use goinstr_syntax::ast::*;

use super::method_call;

/// `<txn>.NoticeError(<err>)`
pub fn notice_error(err: &Expr, txn: Expr) -> Stmt {
    let mut err = err.clone();
    err.decs = Decorations::default();
    Stmt::expr(method_call(txn, "NoticeError", vec![err]))
}

/// `if <err> != nil { <txn>.NoticeError(<err>) }`
pub fn if_error_not_nil_notice_error(err: &Expr, txn: Expr) -> Stmt {
    let mut check = err.clone();
    check.decs = Decorations::default();
    Stmt::if_stmt(
        Expr::binary(check, "!=", Expr::nil()),
        vec![notice_error(err, txn)],
    )
}

/// Whether any statement of `stmts` already reports an error.
pub fn calls_notice_error(stmts: &[Stmt]) -> bool {
    let mut found = false;
    goinstr_syntax::walk::walk_stmts(stmts, &mut |s| {
        for e in goinstr_syntax::walk::stmt_exprs(s) {
            goinstr_syntax::walk::walk_expr(e, false, &mut |x| {
                if x.as_call().is_some_and(|c| c.fun_name() == Some("NoticeError")) {
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
    use goinstr_syntax::printer::stmts_to_string;

    #[test]
    fn test_notice_error_forms() {
        let err = Expr::ident("err");
        let stmts = vec![
            notice_error(&err, Expr::ident("nrTxn")),
            if_error_not_nil_notice_error(&err, Expr::ident("txn")),
        ];
        assert_eq!(
            stmts_to_string(&stmts, 0),
            "nrTxn.NoticeError(err)\nif err != nil {\n\ttxn.NoticeError(err)\n}\n"
        );
        assert!(calls_notice_error(&stmts[1..]));
        assert!(!calls_notice_error(&[]));
    }
}
