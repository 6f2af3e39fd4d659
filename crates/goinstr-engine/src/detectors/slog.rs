//! log/slog: route handlers through the agent's log forwarding wrapper.

use goinstr_syntax::TypeInfo;
use goinstr_syntax::ast::*;
use goinstr_syntax::walk::{Cursor, stmt_exprs, stmt_exprs_mut, visit_calls_mut, visit_idents_in_stmts_mut, walk_expr};

use crate::codegen::grpc::wrap_log_handler;
use crate::codegen::is_qualified;
use crate::consts::{self, LOG_SLOG};
use crate::manager::Manager;
use crate::state::TracingState;

const WRAPPED_HANDLER: &str = "nrHandler";

fn is_handler_constructor(types: &TypeInfo, expr: &Expr) -> bool {
    expr.as_call()
        .and_then(|c| types.callee(c))
        .is_some_and(|c| c.is_func(LOG_SLOG, "NewTextHandler") || c.is_func(LOG_SLOG, "NewJSONHandler"))
}

/// `slog.New(slog.NewTextHandler(..))` with the handler not yet wrapped.
fn is_unwrapped_logger(types: &TypeInfo, call: &CallExpr) -> bool {
    types.callee(call).is_some_and(|c| c.is_func(LOG_SLOG, "New"))
        && call.args.first().is_some_and(|h| is_handler_constructor(types, h))
}

fn wraps_handler(stmt: &Stmt) -> bool {
    let mut found = false;
    for e in stmt_exprs(stmt) {
        walk_expr(e, false, &mut |x| {
            if x.as_call().is_some_and(|c| is_qualified(&c.fun, "nrslog", "WrapHandler")) {
                found = true;
            }
        });
    }
    found
}

pub fn wrap_handler(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) {
    let mut nested = false;
    for e in stmt_exprs(cursor.stmt()) {
        walk_expr(e, false, &mut |x| {
            if x.as_call().is_some_and(|c| is_unwrapped_logger(mgr.types(), c)) {
                nested = true;
            }
        });
    }
    if nested {
        let Some(agent) = state.agent() else {
            return;
        };
        let types = mgr.types();
        for e in stmt_exprs_mut(cursor.stmt_mut()) {
            visit_calls_mut(e, false, &mut |call| {
                if is_unwrapped_logger(types, call) {
                    let mut handler = call.args.remove(0);
                    let layout = std::mem::take(&mut handler.decs);
                    let mut wrapped = wrap_log_handler(agent.clone(), handler);
                    wrapped.decs = layout;
                    call.args.insert(0, wrapped);
                }
            });
        }
        mgr.add_import(&state.pkg, consts::NRSLOG);
        return;
    }

    // handler := slog.NewTextHandler(..)
    let StmtKind::Assign { lhs, rhs, .. } = &cursor.stmt().kind else {
        return;
    };
    let ([name], [value]) = (lhs.as_slice(), rhs.as_slice()) else {
        return;
    };
    let Some(handler) = name.as_ident().filter(|id| !id.is_blank()).map(|id| id.name.clone()) else {
        return;
    };
    if !is_handler_constructor(mgr.types(), value) || cursor.rest().first().is_some_and(wraps_handler) {
        return;
    }
    let Some(agent) = state.agent() else {
        return;
    };
    let wrapped_name = if state.is_declared(WRAPPED_HANDLER) {
        format!("{WRAPPED_HANDLER}{}", cursor.index())
    } else {
        WRAPPED_HANDLER.to_string()
    };
    visit_idents_in_stmts_mut(cursor.rest_mut(), &mut |id| {
        if id.name == handler {
            id.name = wrapped_name.clone();
        }
    });
    let mut wrap = state.bind(&wrapped_name, wrap_log_handler(agent, Expr::ident(&handler)));
    wrap.decs.after = cursor.stmt_mut().decs.take_after();
    cursor.insert_after(wrap);
    mgr.add_import(&state.pkg, consts::NRSLOG);
}
