//! How a transaction travels from a caller into a callee.

use goinstr_syntax::ast::*;
use goinstr_syntax::{Type, TypeInfo};
use log::debug;

use crate::codegen::{context, txn};
use crate::consts::{self, Advisory};

/// The way tracing is available inside a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceCarrier {
    /// A `*newrelic.Transaction` variable.
    Transaction(String),
    /// A `context.Context` variable carrying a transaction.
    Context(String),
    /// A gRPC server stream whose context carries a transaction.
    Stream { name: String, ty: Type },
}

/// Outcome of [`TraceCarrier::pass`].
#[derive(Debug, Default, PartialEq)]
pub struct Passed {
    /// Carrier to use inside the callee.
    pub child: Option<TraceCarrier>,
    /// Import the caller's package now needs.
    pub import: Option<&'static str>,
    /// The callee gained a transaction parameter.
    pub extended: bool,
    /// Advisory for the calling statement.
    pub advisory: Option<Advisory>,
}

pub fn transaction_type() -> Type {
    Type::pointer(Type::named(consts::NEWRELIC, "Transaction"))
}

pub fn context_type() -> Type {
    Type::named(consts::CONTEXT, "Context")
}

/// Resolved type of a parameter type expression. Parameters the engine
/// inserted itself have no recorded resolution and are recognised by shape.
pub fn resolved_type(info: &TypeInfo, ty: &Expr) -> Option<Type> {
    if let Some(resolved) = info.type_expr(ty) {
        return Some(resolved);
    }
    match ty.to_string().as_str() {
        "*newrelic.Transaction" => Some(transaction_type()),
        "context.Context" => Some(context_type()),
        _ => None,
    }
}

fn param_name(name: Option<&Ident>) -> Option<String> {
    name.filter(|n| !n.is_blank()).map(|n| n.name.clone())
}

impl TraceCarrier {
    pub fn name(&self) -> &str {
        match self {
            TraceCarrier::Transaction(name) | TraceCarrier::Context(name) => name,
            TraceCarrier::Stream { name, .. } => name,
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            TraceCarrier::Transaction(_) => transaction_type(),
            TraceCarrier::Context(_) => context_type(),
            TraceCarrier::Stream { ty, .. } => ty.clone(),
        }
    }

    pub fn type_name(&self) -> String {
        self.ty().to_string()
    }

    /// Statement binding `name` to the carried transaction, if the carrier
    /// is not a transaction variable already.
    pub fn assign_transaction_variable(&self, name: &str) -> (Option<Stmt>, Option<&'static str>) {
        match self {
            TraceCarrier::Transaction(_) => (None, None),
            TraceCarrier::Context(ctx) => (
                Some(context::txn_from_context(name, Expr::ident(ctx))),
                Some(consts::NEWRELIC),
            ),
            TraceCarrier::Stream { name: stream, .. } => (
                Some(context::txn_from_context(name, context::stream_context(stream))),
                Some(consts::NEWRELIC),
            ),
        }
    }

    /// Whether [`TraceCarrier::pass`] would hand the transaction to the
    /// callee of `call`, either as an argument or through its parameters.
    pub fn would_pass(&self, info: &TypeInfo, params: &FieldList, call: &CallExpr, may_extend: bool) -> bool {
        let mut params = params.clone();
        let mut trial = call.clone();
        let passed = self.pass(info, &mut params, &mut trial, false, may_extend, &mut || {
            Expr::ident(self.name())
        });
        passed != Passed::default() || trial.args.len() != call.args.len()
    }

    /// Propagate tracing into `call`, whose callee declares `params`.
    ///
    /// `txn` yields the caller's transaction expression. When `may_extend`
    /// is false the callee's parameter list is left alone and only the call
    /// site is brought in line with it.
    pub fn pass(
        &self,
        info: &TypeInfo,
        params: &mut FieldList,
        call: &mut CallExpr,
        is_async: bool,
        may_extend: bool,
        txn: &mut dyn FnMut() -> Expr,
    ) -> Passed {
        let mut txn_arg = || {
            let t = txn();
            if is_async { txn::new_goroutine(t) } else { t }
        };
        let flat: Vec<(Option<String>, Option<Type>)> = params
            .params()
            .into_iter()
            .map(|(name, ty)| (param_name(name), resolved_type(info, ty)))
            .collect();
        let own = self.ty();

        if !matches!(self, TraceCarrier::Context(_)) {
            if let Some(i) = flat.iter().position(|(_, ty)| ty.as_ref() == Some(&own)) {
                let mut passed = Passed::default();
                if call.args.len() == i && !call.ellipsis {
                    let arg = match self {
                        TraceCarrier::Transaction(_) => txn_arg(),
                        _ => Expr::ident(self.name()),
                    };
                    call.push_arg(arg);
                }
                passed.child = flat[i].0.clone().map(|name| match self {
                    TraceCarrier::Transaction(_) => TraceCarrier::Transaction(name),
                    TraceCarrier::Context(_) => TraceCarrier::Context(name),
                    TraceCarrier::Stream { ty, .. } => TraceCarrier::Stream {
                        name,
                        ty: ty.clone(),
                    },
                });
                return passed;
            }
        }

        let ctx_type = context_type();
        if let Some(i) = flat.iter().position(|(_, ty)| ty.as_ref() == Some(&ctx_type)) {
            let mut passed = Passed {
                child: flat[i].0.clone().map(TraceCarrier::Context),
                ..Default::default()
            };
            let Some(arg) = call.args.get_mut(i) else {
                return passed;
            };
            let same_context = matches!(self, TraceCarrier::Context(ctx) if arg.is_ident(ctx));
            if (same_context && !is_async) || context::is_wrapped_context(arg) {
                return passed;
            }
            let layout = std::mem::take(&mut arg.decs);
            let mut wrapped = context::wrap_context_expression(arg, txn_arg());
            wrapped.decs = layout;
            *arg = wrapped;
            passed.import = Some(consts::NEWRELIC);
            if matches!(self, TraceCarrier::Context(_)) && !same_context {
                passed.advisory = Some(consts::CONTEXT_WRAPPED);
            }
            return passed;
        }

        if !may_extend {
            return Passed::default();
        }
        if params.is_variadic() || params.is_unnamed() {
            debug!("cannot add a transaction parameter to this signature");
            return Passed::default();
        }
        params.push(txn::transaction_parameter(consts::DEFAULT_TXN_VARIABLE));
        call.push_arg(txn_arg());
        Passed {
            child: Some(TraceCarrier::Transaction(
                consts::DEFAULT_TXN_VARIABLE.to_string(),
            )),
            import: Some(consts::NEWRELIC),
            extended: true,
            advisory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goinstr_syntax::{PackageSource, parse_file};

    fn setup(src: &str) -> (File, TypeInfo) {
        let mut ids = IdGen::new();
        let mut info = TypeInfo::new(&mut ids).unwrap();
        let file = parse_file(src, &mut ids).unwrap();
        info.check(&[PackageSource {
            path: "example.com/app",
            name: "main",
            files: vec![&file],
        }]);
        (file, info)
    }

    fn params_of(file: &File, name: &str) -> FieldList {
        file.funcs().find(|f| f.name.name == name).unwrap().params.clone()
    }

    fn render(call: CallExpr) -> String {
        Expr::new(ExprKind::Call(call)).to_string()
    }

    const SRC: &str = r#"package main

import (
	"context"

	"github.com/newrelic/go-agent/v3/newrelic"
)

func plain(url string) {}

func withCtx(ctx context.Context, id int) {}

func withTxn(id int, txn *newrelic.Transaction) {}

func spread(args ...string) {}
"#;

    #[test]
    fn test_extends_plain_function() {
        let (file, info) = setup(SRC);
        let mut params = params_of(&file, "plain");
        let mut call = CallExpr::new(Expr::ident("plain"), vec![Expr::ident("u")]);
        let carrier = TraceCarrier::Transaction("nrTxn".into());
        let passed = carrier.pass(&info, &mut params, &mut call, false, true, &mut || {
            Expr::ident("nrTxn")
        });
        assert!(passed.extended);
        assert_eq!(passed.child, Some(TraceCarrier::Transaction("nrTxn".into())));
        assert_eq!(passed.import, Some(consts::NEWRELIC));
        assert_eq!(params.len(), 2);
        assert_eq!(render(call), "plain(u, nrTxn)");
    }

    #[test]
    fn test_async_call_clones_transaction() {
        let (file, info) = setup(SRC);
        let mut params = params_of(&file, "plain");
        let mut call = CallExpr::new(Expr::ident("plain"), vec![Expr::ident("u")]);
        let carrier = TraceCarrier::Transaction("txn".into());
        carrier.pass(&info, &mut params, &mut call, true, true, &mut || Expr::ident("txn"));
        assert_eq!(render(call), "plain(u, txn.NewGoroutine())");
    }

    #[test]
    fn test_context_argument_is_wrapped() {
        let (file, info) = setup(SRC);
        let mut params = params_of(&file, "withCtx");
        let mut call = CallExpr::new(
            Expr::ident("withCtx"),
            vec![Expr::ident("ctx"), Expr::basic("1")],
        );
        let carrier = TraceCarrier::Transaction("nrTxn".into());
        let passed = carrier.pass(&info, &mut params, &mut call, false, true, &mut || {
            Expr::ident("nrTxn")
        });
        assert!(!passed.extended);
        assert_eq!(passed.child, Some(TraceCarrier::Context("ctx".into())));
        assert_eq!(params.len(), 2);
        assert_eq!(render(call), "withCtx(newrelic.NewContext(ctx, nrTxn), 1)");
    }

    #[test]
    fn test_same_context_passes_through() {
        let (file, info) = setup(SRC);
        let mut params = params_of(&file, "withCtx");
        let mut call = CallExpr::new(
            Expr::ident("withCtx"),
            vec![Expr::ident("ctx"), Expr::basic("1")],
        );
        let carrier = TraceCarrier::Context("ctx".into());
        let passed = carrier.pass(&info, &mut params, &mut call, false, true, &mut || {
            Expr::ident("nrTxn")
        });
        assert_eq!(passed.import, None);
        assert_eq!(passed.advisory, None);
        assert_eq!(render(call), "withCtx(ctx, 1)");

        let mut other = CallExpr::new(
            Expr::ident("withCtx"),
            vec![Expr::ident("background"), Expr::basic("2")],
        );
        let passed = carrier.pass(&info, &mut params, &mut other, false, true, &mut || {
            Expr::ident("nrTxn")
        });
        assert_eq!(passed.advisory, Some(consts::CONTEXT_WRAPPED));
        assert_eq!(render(other), "withCtx(newrelic.NewContext(background, nrTxn), 2)");
    }

    #[test]
    fn test_existing_transaction_parameter_is_not_duplicated() {
        let (file, info) = setup(SRC);
        let mut params = params_of(&file, "withTxn");
        let mut call = CallExpr::new(
            Expr::ident("withTxn"),
            vec![Expr::basic("1"), Expr::ident("txn")],
        );
        let carrier = TraceCarrier::Transaction("txn".into());
        let passed = carrier.pass(&info, &mut params, &mut call, false, true, &mut || {
            Expr::ident("txn")
        });
        assert!(!passed.extended);
        assert_eq!(passed.child, Some(TraceCarrier::Transaction("txn".into())));
        assert_eq!(render(call), "withTxn(1, txn)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_missing_argument_is_supplied_without_extending() {
        let (file, info) = setup(SRC);
        let mut params = params_of(&file, "withTxn");
        let mut call = CallExpr::new(Expr::ident("withTxn"), vec![Expr::basic("1")]);
        let carrier = TraceCarrier::Transaction("nrTxn".into());
        carrier.pass(&info, &mut params, &mut call, false, false, &mut || {
            Expr::ident("nrTxn")
        });
        assert_eq!(render(call), "withTxn(1, nrTxn)");
    }

    #[test]
    fn test_variadic_signature_is_left_alone() {
        let (file, info) = setup(SRC);
        let mut params = params_of(&file, "spread");
        let mut call = CallExpr::new(Expr::ident("spread"), vec![Expr::ident("a")]);
        let carrier = TraceCarrier::Transaction("nrTxn".into());
        let passed = carrier.pass(&info, &mut params, &mut call, false, true, &mut || {
            Expr::ident("nrTxn")
        });
        assert_eq!(passed, Passed::default());
        assert_eq!(render(call), "spread(a)");
    }

    #[test]
    fn test_bind_transaction_variable() {
        let stream = TraceCarrier::Stream {
            name: "stream".into(),
            ty: Type::named("google.golang.org/grpc", "ServerStream"),
        };
        let (stmt, import) = stream.assign_transaction_variable("nrTxn");
        assert_eq!(
            goinstr_syntax::printer::stmts_to_string(&[stmt.unwrap()], 0),
            "nrTxn := newrelic.FromContext(stream.Context())\n"
        );
        assert_eq!(import, Some(consts::NEWRELIC));
        let (none, _) = TraceCarrier::Transaction("t".into()).assign_transaction_variable("t");
        assert!(none.is_none());
        assert_eq!(stream.type_name(), "google.golang.org/grpc.ServerStream");
    }

    #[test]
    fn test_would_pass_leaves_the_call_alone() {
        let (file, info) = setup(SRC);
        let carrier = TraceCarrier::Transaction("nrTxn".into());
        let plain = CallExpr::new(Expr::ident("plain"), vec![Expr::ident("u")]);
        assert!(carrier.would_pass(&info, &params_of(&file, "plain"), &plain, true));
        assert!(!carrier.would_pass(&info, &params_of(&file, "plain"), &plain, false));
        assert_eq!(render(plain), "plain(u)");

        let short = CallExpr::new(Expr::ident("withTxn"), vec![Expr::basic("1")]);
        assert!(carrier.would_pass(&info, &params_of(&file, "withTxn"), &short, false));

        let spread = CallExpr::new(Expr::ident("spread"), vec![Expr::ident("a")]);
        assert!(!carrier.would_pass(&info, &params_of(&file, "spread"), &spread, true));
    }
}
