//! gRPC interceptors, router middleware and log handler wrapping.

use goinstr_syntax::ast::*;

use super::{is_qualified, method_call};

fn interceptor_option(grpc: &str, option: &str, interceptor: Expr) -> Expr {
    Expr::call(Expr::qualified(grpc, option), vec![interceptor])
}

/// Append the agent's client interceptors to a `grpc.Dial`-style call,
/// following the call's argument layout.
pub fn add_client_interceptors(grpc: &str, call: &mut CallExpr) {
    call.push_arg(interceptor_option(
        grpc,
        "WithUnaryInterceptor",
        Expr::qualified("nrgrpc", "UnaryClientInterceptor"),
    ));
    call.push_arg(interceptor_option(
        grpc,
        "WithStreamInterceptor",
        Expr::qualified("nrgrpc", "StreamClientInterceptor"),
    ));
}

/// Append the agent's server interceptors to a `grpc.NewServer` call.
pub fn add_server_interceptors(grpc: &str, agent: Expr, call: &mut CallExpr) {
    let unary = Expr::call(
        Expr::qualified("nrgrpc", "UnaryServerInterceptor"),
        vec![agent.clone()],
    );
    let stream = Expr::call(
        Expr::qualified("nrgrpc", "StreamServerInterceptor"),
        vec![agent],
    );
    call.push_arg(interceptor_option(grpc, "UnaryInterceptor", unary));
    call.push_arg(interceptor_option(grpc, "StreamInterceptor", stream));
}

/// The call already passes one of the agent's interceptors.
pub fn has_interceptors(call: &CallExpr) -> bool {
    call.args.iter().any(|arg| {
        arg.as_call().is_some_and(|option| {
            option.args.iter().any(|a| {
                let target = a.as_call().map(|c| c.fun.as_ref()).unwrap_or(a);
                matches!(target.as_selector(), Some((x, _)) if x.is_ident("nrgrpc"))
            })
        })
    })
}

/// `<router>.Use(<pkg>.Middleware(<agent>))`
pub fn use_middleware(router: &Expr, pkg: &str, agent: Expr) -> Stmt {
    let middleware = Expr::call(Expr::qualified(pkg, "Middleware"), vec![agent]);
    Stmt::expr(method_call(router.clone(), "Use", vec![middleware]))
}

/// Whether `stmt` is `<router>.Use(<pkg>.Middleware(..))`.
pub fn is_middleware_use(stmt: &Stmt, pkg: &str) -> bool {
    let Some(call) = stmt.call() else { return false };
    call.fun_name() == Some("Use")
        && call.args.iter().any(|a| {
            a.as_call()
                .is_some_and(|c| is_qualified(&c.fun, pkg, "Middleware"))
        })
}

/// `nrslog.WrapHandler(<agent>, <handler>)`
pub fn wrap_log_handler(agent: Expr, handler: Expr) -> Expr {
    Expr::call(Expr::qualified("nrslog", "WrapHandler"), vec![agent, handler])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_interceptors_follow_layout() {
        let mut host = Expr::string_lit("localhost:50051");
        host.decs.before = Space::NewLine;
        let mut opt = Expr::call(Expr::qualified("grpc", "WithInsecure"), Vec::new());
        opt.decs.before = Space::NewLine;
        let mut call = CallExpr::new(Expr::qualified("grpc", "Dial"), vec![host, opt]);
        call.rparen_newline = true;
        assert!(!has_interceptors(&call));
        add_client_interceptors("grpc", &mut call);
        assert!(has_interceptors(&call));
        assert_eq!(
            Expr::new(ExprKind::Call(call)).to_string(),
            "grpc.Dial(\n\t\"localhost:50051\",\n\tgrpc.WithInsecure(),\n\tgrpc.WithUnaryInterceptor(nrgrpc.UnaryClientInterceptor),\n\tgrpc.WithStreamInterceptor(nrgrpc.StreamClientInterceptor),\n)"
        );
    }

    #[test]
    fn test_server_interceptors() {
        let mut call = CallExpr::new(Expr::qualified("grpc", "NewServer"), Vec::new());
        add_server_interceptors("grpc", Expr::ident("NewRelicAgent"), &mut call);
        assert!(has_interceptors(&call));
        assert_eq!(
            Expr::new(ExprKind::Call(call)).to_string(),
            "grpc.NewServer(grpc.UnaryInterceptor(nrgrpc.UnaryServerInterceptor(NewRelicAgent)), grpc.StreamInterceptor(nrgrpc.StreamServerInterceptor(NewRelicAgent)))"
        );
    }

    #[test]
    fn test_middleware_use() {
        let stmt = use_middleware(&Expr::ident("router"), "nrgin", Expr::ident("NewRelicAgent"));
        assert!(is_middleware_use(&stmt, "nrgin"));
        assert!(!is_middleware_use(&stmt, "nrgorilla"));
        let wrapped = wrap_log_handler(Expr::ident("NewRelicAgent"), Expr::ident("handler"));
        assert_eq!(wrapped.to_string(), "nrslog.WrapHandler(NewRelicAgent, handler)");
    }
}
