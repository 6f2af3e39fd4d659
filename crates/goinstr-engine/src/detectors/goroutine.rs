use goinstr_syntax::ast::*;
use goinstr_syntax::walk::Cursor;

use crate::carrier::{TraceCarrier, resolved_type, transaction_type};
use crate::codegen::{advice, txn};
use crate::consts::{self, DEFAULT_TXN_VARIABLE};
use crate::manager::Manager;
use crate::state::TracingState;
use crate::trace;

const SEGMENT: &str = "async literal";

fn go_literal(stmt: &Stmt) -> Option<&FuncLit> {
    let StmtKind::Go(e) = &stmt.kind else {
        return None;
    };
    match &e.as_call()?.fun.kind {
        ExprKind::FuncLit(lit) => Some(lit),
        _ => None,
    }
}

fn go_literal_mut(stmt: &mut Stmt) -> Option<&mut CallExpr> {
    let StmtKind::Go(e) = &mut stmt.kind else {
        return None;
    };
    let call = e.as_call_mut()?;
    matches!(call.fun.kind, ExprKind::FuncLit(_)).then_some(call)
}

/// Hand a goroutine started from a function literal its own transaction
/// and trace the literal's body.
pub fn trace_literal(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) {
    let Some(lit) = go_literal(cursor.stmt()) else {
        return;
    };
    if state.in_main {
        advice::attach(cursor.stmt_mut(), &consts::GOROUTINE_IN_MAIN);
        return;
    }
    if !state.has_txn() || lit.params.is_variadic() {
        return;
    }
    let txn_type = transaction_type();
    let existing = lit.params.params().into_iter().find_map(|(name, ty)| {
        let name = name?;
        (resolved_type(mgr.types(), ty).as_ref() == Some(&txn_type)).then(|| name.name.clone())
    });

    let name = match existing {
        Some(name) => name,
        None => {
            let Some(parent) = state.txn() else {
                return;
            };
            let Some(call) = go_literal_mut(cursor.stmt_mut()) else {
                return;
            };
            if let ExprKind::FuncLit(lit) = &mut call.fun.kind {
                lit.params.push(txn::transaction_parameter(DEFAULT_TXN_VARIABLE));
            }
            call.push_arg(txn::new_goroutine(parent));
            mgr.add_import(&state.pkg, consts::NEWRELIC);
            DEFAULT_TXN_VARIABLE.to_string()
        }
    };

    let mut child = TracingState::traced(
        &state.pkg,
        state.agent_var(),
        TraceCarrier::Transaction(name),
        DEFAULT_TXN_VARIABLE,
    );
    child.is_async = true;
    child.segment = Some(SEGMENT.to_string());
    let Some(call) = go_literal_mut(cursor.stmt_mut()) else {
        return;
    };
    if let ExprKind::FuncLit(lit) = &mut call.fun.kind {
        trace::trace_body(mgr, &mut lit.body, &mut child);
    }
}
