//! Agent, transaction and segment lifecycle statements.

use goinstr_syntax::ast::*;

use super::{method_call, nr, transaction_type};
use crate::consts;

/// `<agent>, err := newrelic.NewApplication(..)` followed by the panic check.
/// The application name option comes first when a name is given.
pub fn agent_init(agent: &str, app_name: &str) -> Vec<Stmt> {
    let mut options = Vec::new();
    if !app_name.is_empty() {
        options.push(Expr::call(
            nr("ConfigAppName"),
            vec![Expr::string_lit(app_name)],
        ));
    }
    options.push(Expr::call(nr("ConfigFromEnvironment"), Vec::new()));

    let init = Stmt::define(
        vec![Expr::ident(agent), Expr::ident("err")],
        vec![Expr::call(nr("NewApplication"), options)],
    );
    let mut check = Stmt::if_stmt(
        Expr::binary(Expr::ident("err"), "!=", Expr::nil()),
        vec![Stmt::expr(Expr::call(
            Expr::ident("panic"),
            vec![Expr::ident("err")],
        ))],
    );
    check.decs.after = Space::EmptyLine;
    vec![init, check]
}

/// `<agent>.Shutdown(5 * time.Second)`
pub fn agent_shutdown(agent: &str) -> Stmt {
    let timeout = Expr::binary(
        Expr::basic(consts::SHUTDOWN_SECONDS),
        "*",
        Expr::qualified("time", "Second"),
    );
    let mut stmt = Stmt::expr(method_call(Expr::ident(agent), "Shutdown", vec![timeout]));
    stmt.decs.before = Space::EmptyLine;
    stmt
}

/// `<txn> := <agent>.StartTransaction("<name>")`, or `=` when the variable
/// already exists in scope.
pub fn start_transaction(agent: &str, txn: &str, name: &str, overwrite: bool) -> Stmt {
    let lhs = vec![Expr::ident(txn)];
    let rhs = vec![method_call(
        Expr::ident(agent),
        "StartTransaction",
        vec![Expr::string_lit(name)],
    )];
    if overwrite {
        Stmt::assign(lhs, rhs)
    } else {
        Stmt::define(lhs, rhs)
    }
}

/// `<txn>.End()`
pub fn end_transaction(txn: &str) -> Stmt {
    Stmt::expr(method_call(Expr::ident(txn), "End", Vec::new()))
}

/// A `<name> *newrelic.Transaction` parameter.
pub fn transaction_parameter(name: &str) -> Field {
    Field::new(name, transaction_type())
}

/// `defer <txn>.StartSegment("<name>").End()`
pub fn defer_segment(name: &str, txn: &str) -> Stmt {
    let start = method_call(
        Expr::ident(txn),
        "StartSegment",
        vec![Expr::string_lit(name)],
    );
    Stmt::defer(method_call(start, "End", Vec::new()))
}

/// `<txn>.NewGoroutine()`
pub fn new_goroutine(txn: Expr) -> Expr {
    method_call(txn, "NewGoroutine", Vec::new())
}

/// `<txn>.Application()`
pub fn txn_application(txn: &str) -> Expr {
    method_call(Expr::ident(txn), "Application", Vec::new())
}

/// Whether `stmt` is a `defer <x>.StartSegment(..).End()`.
pub fn is_defer_segment(stmt: &Stmt) -> bool {
    let StmtKind::Defer(e) = &stmt.kind else {
        return false;
    };
    let Some(end) = e.as_call() else { return false };
    if end.fun_name() != Some("End") {
        return false;
    }
    match end.fun.as_selector() {
        Some((x, _)) => x.as_call().is_some_and(|c| c.fun_name() == Some("StartSegment")),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goinstr_syntax::printer::stmts_to_string;

    #[test]
    fn test_agent_init_with_name() {
        let mut stmts = agent_init("NewRelicAgent", "shop");
        stmts.push(agent_shutdown("NewRelicAgent"));
        assert_eq!(
            stmts_to_string(&stmts, 1),
            "\tNewRelicAgent, err := newrelic.NewApplication(newrelic.ConfigAppName(\"shop\"), newrelic.ConfigFromEnvironment())\n\
             \tif err != nil {\n\
             \t\tpanic(err)\n\
             \t}\n\
             \n\
             \tNewRelicAgent.Shutdown(5 * time.Second)\n"
        );
    }

    #[test]
    fn test_agent_init_without_name() {
        let stmts = agent_init("app", "");
        assert!(stmts_to_string(&stmts[..1], 0)
            .starts_with("app, err := newrelic.NewApplication(newrelic.ConfigFromEnvironment())"));
    }

    #[test]
    fn test_transaction_statements() {
        let stmts = vec![
            start_transaction("NewRelicAgent", "nrTxn", "work", false),
            defer_segment("work", "nrTxn"),
            start_transaction("NewRelicAgent", "nrTxn", "other", true),
            end_transaction("nrTxn"),
        ];
        assert_eq!(
            stmts_to_string(&stmts, 0),
            "nrTxn := NewRelicAgent.StartTransaction(\"work\")\n\
             defer nrTxn.StartSegment(\"work\").End()\n\
             nrTxn = NewRelicAgent.StartTransaction(\"other\")\n\
             nrTxn.End()\n"
        );
        assert!(is_defer_segment(&stmts[1]));
        assert!(!is_defer_segment(&stmts[3]));
    }
}
