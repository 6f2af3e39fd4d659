//! The tracing walk: follows calls out of a traced function, threading the
//! transaction into each application callee and running the stateful
//! rewriters on every statement it visits.

use goinstr_syntax::ast::*;
use goinstr_syntax::walk::{Cursor, stmt_exprs, stmt_exprs_mut, visit_calls_mut, walk_expr, walk_list};
use log::debug;

use crate::carrier::TraceCarrier;
use crate::codegen::{advice, context, spacing, txn};
use crate::consts::{self, Advisory};
use crate::detectors::{self, errors};
use crate::manager::{Invocation, Manager};
use crate::state::{Binding, TracingState};

/// Trace the body of `inv` with `state`.
pub fn trace_function(mgr: &mut Manager, inv: &Invocation, mut state: TracingState) {
    let Some(mut body) = mgr.take_body(inv) else {
        return;
    };
    debug!("tracing {}.{}", inv.pkg, inv.name);
    trace_body(mgr, &mut body, &mut state);
    mgr.restore_body(inv, body);
}

/// Walk `body`, then open it with the transaction binding and segment the
/// walk turned out to need.
pub fn trace_body(mgr: &mut Manager, body: &mut Block, state: &mut TracingState) {
    let mut at = 0;
    if matches!(state.binding, Binding::Pending(_)) {
        if let Some((k, name)) = body
            .stmts
            .iter()
            .enumerate()
            .find_map(|(k, s)| context::from_context_binding(s).map(|n| (k, n.to_string())))
        {
            state.txn_var = name;
            state.binding = Binding::Bound;
            at = k + 1;
        }
    }
    let has_segment = body.stmts.iter().any(txn::is_defer_segment);

    walk_block(mgr, &mut body.stmts, state);

    let prologue = state.prologue(has_segment);
    for (i, stmt) in prologue.into_iter().enumerate() {
        body.stmts.insert(at + i, stmt);
    }
}

fn walk_block(mgr: &mut Manager, stmts: &mut Vec<Stmt>, state: &mut TracingState) {
    state.push_scope();
    walk_list(stmts, &mut |cursor| visit(mgr, cursor, state));
    state.pop_scope();
}

fn visit(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) {
    let started = trace_invocations(mgr, cursor, state);

    if !state.in_main && state.has_txn() {
        errors::notice_errors(mgr, cursor, state);
    }
    for rewriter in detectors::STATEFUL_REWRITERS {
        (rewriter.rewrite)(mgr, cursor, state);
    }
    for block in cursor.stmt_mut().blocks_mut() {
        walk_block(mgr, block, state);
    }

    state.declare_stmt(cursor.stmt());
    if started {
        state.end_main_transaction();
    } else if state.in_main {
        track_main_transaction(cursor.stmt(), state);
    }
}

/// Follow transactions the entry function starts and ends itself.
fn track_main_transaction(stmt: &Stmt, state: &mut TracingState) {
    match &stmt.kind {
        StmtKind::Assign { lhs, rhs, .. } if lhs.len() == 1 && rhs.len() == 1 => {
            let starts = rhs[0]
                .as_call()
                .is_some_and(|c| c.fun_name() == Some("StartTransaction"));
            if let (true, Some(name)) = (starts, lhs[0].as_ident()) {
                state.start_main_transaction(&name.name);
            }
        }
        StmtKind::Expr(e) if state.has_txn() => {
            let ends = e.as_call().is_some_and(|c| {
                c.fun_name() == Some("End")
                    && matches!(c.fun.as_selector(), Some((x, _)) if x.is_ident(&state.txn_var))
            });
            if ends {
                state.end_main_transaction();
            }
        }
        _ => {}
    }
}

/// Pass the transaction into every application call the statement makes.
/// In the entry function a statement calling into the application is first
/// wrapped in a transaction of its own; returns whether that happened.
fn trace_invocations(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) -> bool {
    let invocations = mgr.find_all_invocations(cursor.stmt(), None);
    if invocations.iter().all(|inv| inv.name == "main") {
        return false;
    }
    let is_go = matches!(cursor.stmt().kind, StmtKind::Go(_));
    if is_go && state.in_main {
        advice::attach(cursor.stmt_mut(), &consts::GOROUTINE_IN_MAIN);
        return false;
    }

    let mut started = false;
    if state.in_main && !state.has_txn() {
        if matches!(cursor.stmt().kind, StmtKind::Defer(_) | StmtKind::Return(_)) {
            return false;
        }
        let name = consts::DEFAULT_TXN_VARIABLE;
        let carrier = TraceCarrier::Transaction(name.to_string());
        let Some(first) = first_traced_call(mgr, cursor.stmt(), &carrier) else {
            return false;
        };
        let mut start = txn::start_transaction(
            state.agent_var(),
            name,
            first.display_name(),
            state.is_declared(name),
        );
        let mut end = txn::end_transaction(name);
        spacing::wrap_statements(&mut start, cursor.stmt_mut(), &mut end);
        cursor.insert_before(start);
        cursor.insert_after(end);
        state.declare(name);
        state.start_main_transaction(name);
        started = true;
    }

    let mut advisories = Vec::new();
    if is_go {
        if let StmtKind::Go(e) = &mut cursor.stmt_mut().kind {
            if let Some(call) = e.as_call_mut() {
                for arg in &mut call.args {
                    visit_calls_mut(arg, false, &mut |c| {
                        pass_call(mgr, c, state, false, &mut advisories)
                    });
                }
                pass_call(mgr, call, state, true, &mut advisories);
            }
        }
    } else {
        for e in stmt_exprs_mut(cursor.stmt_mut()) {
            visit_calls_mut(e, false, &mut |c| {
                pass_call(mgr, c, state, false, &mut advisories)
            });
        }
    }
    for advisory in advisories {
        advice::attach(cursor.stmt_mut(), &advisory);
    }
    started
}

/// The first application call of `stmt` that `carrier` would reach. Calls
/// inside declarations are printed verbatim and never receive it.
fn first_traced_call(mgr: &Manager, stmt: &Stmt, carrier: &TraceCarrier) -> Option<Invocation> {
    if matches!(stmt.kind, StmtKind::Decl(_)) {
        return None;
    }
    let mut found = None;
    for e in stmt_exprs(stmt) {
        walk_expr(e, false, &mut |x| {
            if found.is_some() {
                return;
            }
            let Some(call) = x.as_call() else { return };
            let Some(inv) = mgr.resolve_invocation(call, None) else {
                return;
            };
            if inv.name == "main" {
                return;
            }
            let may_extend = mgr.should_instrument_function(&inv);
            let reached = mgr
                .func_decl(&inv)
                .is_some_and(|decl| carrier.would_pass(mgr.types(), &decl.params, call, may_extend));
            if reached {
                found = Some(inv);
            }
        });
    }
    found
}

/// Thread the transaction into one call and trace its callee the first time
/// it is reached.
pub fn pass_call(
    mgr: &mut Manager,
    call: &mut CallExpr,
    state: &mut TracingState,
    is_async: bool,
    advisories: &mut Vec<Advisory>,
) {
    let Some(inv) = mgr.resolve_invocation(call, None) else {
        return;
    };
    if inv.name == "main" {
        return;
    }
    let Some(carrier) = state.carrier.clone() else {
        return;
    };
    let may_extend = mgr.should_instrument_function(&inv);
    let passed = {
        let Some((decl, types)) = mgr.decl_with_types(&inv) else {
            return;
        };
        carrier.pass(types, &mut decl.params, call, is_async, may_extend, &mut || {
            state.txn().unwrap_or_else(Expr::nil)
        })
    };

    if let Some(path) = passed.import {
        mgr.add_import(&state.pkg, path);
    }
    if passed.extended {
        mgr.mark_extended(&inv);
        mgr.add_import(&inv.pkg, consts::NEWRELIC);
    }
    advisories.extend(passed.advisory);

    if !may_extend {
        return;
    }
    mgr.update_function_declaration(&inv);
    let agent = state.agent_var().to_string();
    let child = match passed.child {
        Some(child) => {
            let mut child = TracingState::traced(&inv.pkg, &agent, child, consts::DEFAULT_TXN_VARIABLE);
            child.is_async = is_async;
            child.segment = Some(if is_async {
                format!("async {}", inv.display_name())
            } else {
                inv.display_name().to_string()
            });
            child
        }
        None => TracingState::untraced(&inv.pkg, &agent),
    };
    trace_function(mgr, &inv, child);
}
