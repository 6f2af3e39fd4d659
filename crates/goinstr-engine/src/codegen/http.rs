//! net/http handler wrapping and outbound request instrumentation.

use goinstr_syntax::ast::*;

use super::{is_qualified, method_call, nr};

/// Rewrite `HandleFunc(pattern, handler)` (or `Handle`) in place so both
/// arguments go through `newrelic.WrapHandleFunc(agent, pattern, handler)`.
/// Returns false when the call does not have the two expected arguments or
/// is already wrapped.
pub fn wrap_handle_func(agent: Expr, call: &mut CallExpr) -> bool {
    let wrapper = match call.fun_name() {
        Some("Handle") => "WrapHandle",
        _ => "WrapHandleFunc",
    };
    if call.args.len() != 2 || is_wrapped_handler(call) {
        return false;
    }
    let layout = call.args[0].decs.clone();
    let mut args = std::mem::take(&mut call.args);
    for arg in &mut args {
        arg.decs.before = Space::None;
    }
    args.insert(0, agent);
    let mut wrapped = Expr::call(nr(wrapper), args);
    wrapped.decs = layout;
    call.args.push(wrapped);
    true
}

/// The call already passes its arguments through a `newrelic.Wrap*` helper.
pub fn is_wrapped_handler(call: &CallExpr) -> bool {
    call.args.first().and_then(Expr::as_call).is_some_and(|inner| {
        is_qualified(&inner.fun, "newrelic", "WrapHandleFunc")
            || is_qualified(&inner.fun, "newrelic", "WrapHandle")
    })
}

/// `<client>.Transport = newrelic.NewRoundTripper(<client>.Transport)`
pub fn round_tripper(client: &Expr, after: Space) -> Stmt {
    let transport = Expr::selector(client.clone(), "Transport");
    let mut stmt = Stmt::assign(
        vec![transport.clone()],
        vec![Expr::call(nr("NewRoundTripper"), vec![transport])],
    );
    stmt.decs.after = after;
    stmt
}

/// Whether `stmt` installs the agent's round tripper on some client.
pub fn is_round_tripper(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Assign { rhs, .. } => rhs.iter().any(|e| {
            e.as_call()
                .is_some_and(|c| is_qualified(&c.fun, "newrelic", "NewRoundTripper"))
        }),
        _ => false,
    }
}

/// `<segment> := newrelic.StartExternalSegment(<txn>, <req>)`
pub fn start_external_segment(txn: Expr, req: &Expr, segment: &str, overwrite: bool) -> Stmt {
    let lhs = vec![Expr::ident(segment)];
    let rhs = vec![Expr::call(nr("StartExternalSegment"), vec![txn, req.clone()])];
    if overwrite {
        Stmt::assign(lhs, rhs)
    } else {
        Stmt::define(lhs, rhs)
    }
}

/// `<segment>.End()`
pub fn end_external_segment(segment: &str) -> Stmt {
    Stmt::expr(method_call(Expr::ident(segment), "End", Vec::new()))
}

/// `<segment>.Response = <resp>`
pub fn capture_http_response(segment: &str, resp: &Expr) -> Stmt {
    Stmt::assign(
        vec![Expr::selector(Expr::ident(segment), "Response")],
        vec![resp.clone()],
    )
}

/// `<req> = newrelic.RequestWithTransactionContext(<req>, <txn>)`
pub fn wrap_request_context(req: &Expr, txn: Expr) -> Stmt {
    Stmt::assign(
        vec![req.clone()],
        vec![Expr::call(
            nr("RequestWithTransactionContext"),
            vec![req.clone(), txn],
        )],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use goinstr_syntax::printer::stmts_to_string;

    fn handle_func() -> CallExpr {
        CallExpr::new(
            Expr::qualified("http", "HandleFunc"),
            vec![Expr::string_lit("/"), Expr::ident("index")],
        )
    }

    #[test]
    fn test_wrap_handle_func_in_place() {
        let mut call = handle_func();
        assert!(wrap_handle_func(Expr::ident("NewRelicAgent"), &mut call));
        assert_eq!(
            Expr::new(ExprKind::Call(call.clone())).to_string(),
            "http.HandleFunc(newrelic.WrapHandleFunc(NewRelicAgent, \"/\", index))"
        );
        assert!(!wrap_handle_func(Expr::ident("NewRelicAgent"), &mut call));
    }

    #[test]
    fn test_wrap_handle_uses_wrap_handle() {
        let mut call = CallExpr::new(
            Expr::selector(Expr::ident("mux"), "Handle"),
            vec![Expr::string_lit("/api"), Expr::ident("api")],
        );
        assert!(wrap_handle_func(
            crate::codegen::txn::txn_application("nrTxn"),
            &mut call
        ));
        assert_eq!(
            Expr::new(ExprKind::Call(call)).to_string(),
            "mux.Handle(newrelic.WrapHandle(nrTxn.Application(), \"/api\", api))"
        );
    }

    #[test]
    fn test_external_segment_statements() {
        let req = Expr::ident("req");
        let stmts = vec![
            round_tripper(&Expr::ident("client"), Space::None),
            start_external_segment(Expr::ident("nrTxn"), &req, "externalSegment", false),
            capture_http_response("externalSegment", &Expr::ident("resp")),
            end_external_segment("externalSegment"),
            wrap_request_context(&req, Expr::ident("nrTxn")),
        ];
        assert_eq!(
            stmts_to_string(&stmts, 0),
            "client.Transport = newrelic.NewRoundTripper(client.Transport)\n\
             externalSegment := newrelic.StartExternalSegment(nrTxn, req)\n\
             externalSegment.Response = resp\n\
             externalSegment.End()\n\
             req = newrelic.RequestWithTransactionContext(req, nrTxn)\n"
        );
        assert!(is_round_tripper(&stmts[0]));
    }
}
