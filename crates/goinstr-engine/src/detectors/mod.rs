//! Detectors and rewriters, in the order they run.
//!
//! Function detectors decide whether a declaration starts a trace. Stateless
//! detectors look at one statement at a time in every function of the
//! application. Stateful rewriters run inside the tracing walk and may use
//! the transaction in scope.

pub mod entry;
pub mod errors;
pub mod goroutine;
pub mod grpc;
pub mod http;
pub mod router;
pub mod slog;
pub mod sql;

use goinstr_syntax::ast::*;
use goinstr_syntax::walk::{Cursor, stmt_exprs, walk_expr};
use goinstr_syntax::{Callee, TypeInfo};

use crate::manager::{Invocation, Manager};
use crate::state::TracingState;

pub struct FunctionDetector {
    pub name: &'static str,
    /// Returns whether the function was instrumented.
    pub detect: fn(&mut Manager, &Invocation) -> bool,
}

pub struct StatelessDetector {
    pub name: &'static str,
    /// Called with the id of the package the statement belongs to.
    pub detect: fn(&mut Manager, &str, &mut Cursor<'_>),
}

pub struct StatefulRewriter {
    pub name: &'static str,
    pub rewrite: fn(&mut Manager, &mut Cursor<'_>, &mut TracingState),
}

pub const FUNCTION_DETECTORS: &[FunctionDetector] = &[
    FunctionDetector {
        name: "entry point",
        detect: entry::instrument_main,
    },
    FunctionDetector {
        name: "http handler",
        detect: http::instrument_handler,
    },
    FunctionDetector {
        name: "grpc server method",
        detect: grpc::instrument_server_method,
    },
];

pub const STATELESS_DETECTORS: &[StatelessDetector] = &[
    StatelessDetector {
        name: "http client",
        detect: http::instrument_client,
    },
    StatelessDetector {
        name: "http helper",
        detect: http::advise_helper_call,
    },
    StatelessDetector {
        name: "grpc client",
        detect: grpc::instrument_dial,
    },
];

pub const STATEFUL_REWRITERS: &[StatefulRewriter] = &[
    StatefulRewriter {
        name: "goroutine",
        rewrite: goroutine::trace_literal,
    },
    StatefulRewriter {
        name: "handler registration",
        rewrite: http::wrap_handler_registration,
    },
    StatefulRewriter {
        name: "outbound request",
        rewrite: http::instrument_request,
    },
    StatefulRewriter {
        name: "router middleware",
        rewrite: router::install_middleware,
    },
    StatefulRewriter {
        name: "grpc server",
        rewrite: grpc::instrument_server,
    },
    StatefulRewriter {
        name: "slog handler",
        rewrite: slog::wrap_handler,
    },
    StatefulRewriter {
        name: "database query",
        rewrite: sql::trace_query,
    },
];

/// Callees of the calls `stmt` makes itself, outside function literals.
pub fn callees(types: &TypeInfo, stmt: &Stmt) -> Vec<Callee> {
    let mut out = Vec::new();
    for e in stmt_exprs(stmt) {
        walk_expr(e, false, &mut |x| {
            if let Some(callee) = x.as_call().and_then(|c| types.callee(c)) {
                out.push(callee);
            }
        });
    }
    out
}

/// The single call on the right of an assignment, or the call of an
/// expression statement.
pub fn primary_call(stmt: &Stmt) -> Option<&CallExpr> {
    match &stmt.kind {
        StmtKind::Assign { rhs, .. } if rhs.len() == 1 => rhs[0].as_call(),
        StmtKind::Expr(e) => e.as_call(),
        _ => None,
    }
}

pub fn primary_call_mut(stmt: &mut Stmt) -> Option<&mut CallExpr> {
    match &mut stmt.kind {
        StmtKind::Assign { rhs, .. } if rhs.len() == 1 => rhs[0].as_call_mut(),
        StmtKind::Expr(e) => e.as_call_mut(),
        _ => None,
    }
}

/// Names bound on the left of an assignment, `_` included.
pub fn assigned_names(stmt: &Stmt) -> Vec<&str> {
    match &stmt.kind {
        StmtKind::Assign { lhs, .. } => lhs
            .iter()
            .filter_map(|e| e.as_ident().map(|id| id.name.as_str()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Package name a call's qualifier uses, e.g. `grpc` in `grpc.Dial(..)`.
pub fn qualifier(call: &CallExpr) -> Option<&str> {
    let (x, _) = call.fun.as_selector()?;
    x.as_ident().map(|id| id.name.as_str())
}
