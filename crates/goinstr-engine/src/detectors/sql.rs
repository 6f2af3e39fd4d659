//! database/sql in the entry function: the first query on an opened
//! database runs inside a transaction carried by its context.

use goinstr_syntax::ast::*;
use goinstr_syntax::walk::{Cursor, mentions};
use log::debug;

use super::{assigned_names, primary_call, primary_call_mut};
use crate::codegen::{context, spacing, txn};
use crate::consts::{self, DATABASE_SQL, DEFAULT_TXN_VARIABLE};
use crate::manager::Manager;
use crate::state::TracingState;

const QUERY_METHODS: &[&str] = &["QueryRow", "Query", "Exec"];
const CONTEXT_VARIABLE: &str = "ctx";

fn opened_database(mgr: &Manager, stmt: &Stmt) -> Option<String> {
    let call = primary_call(stmt)?;
    let opens = mgr
        .types()
        .callee(call)
        .is_some_and(|c| c.is_func(DATABASE_SQL, "Open"));
    if !opens {
        return None;
    }
    let db = assigned_names(stmt).first().copied()?;
    (db != "_").then(|| db.to_string())
}

fn query_method(mgr: &Manager, stmt: &Stmt, db: &str) -> Option<&'static str> {
    let call = primary_call(stmt)?;
    let (x, _) = call.fun.as_selector()?;
    if !x.is_ident(db) {
        return None;
    }
    let callee = mgr.types().callee(call)?;
    QUERY_METHODS
        .iter()
        .copied()
        .find(|name| callee.is_method(DATABASE_SQL, "DB", name))
}

pub fn trace_query(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) {
    if !state.in_main {
        return;
    }
    if let Some(db) = opened_database(mgr, cursor.stmt()) {
        debug!("main opens database {db}");
        state.sql_db = Some(db);
        return;
    }
    if state.sql_done || state.has_txn() {
        return;
    }
    let Some(db) = state.sql_db.clone() else {
        return;
    };
    let Some(method) = query_method(mgr, cursor.stmt(), &db) else {
        return;
    };
    state.sql_done = true;

    let results: Vec<String> = assigned_names(cursor.stmt())
        .into_iter()
        .filter(|name| *name != "_")
        .map(str::to_string)
        .collect();
    let last_use = cursor
        .rest()
        .iter()
        .rposition(|s| results.iter().any(|name| mentions(s, name)));

    if let Some(call) = primary_call_mut(cursor.stmt_mut()) {
        if let ExprKind::Selector { sel, .. } = &mut call.fun.kind {
            sel.name = format!("{method}Context");
        }
        let mut ctx = Expr::ident(CONTEXT_VARIABLE);
        if let Some(first) = call.args.first() {
            ctx.decs.before = first.decs.before;
        }
        call.args.insert(0, ctx);
    }

    let agent = state.agent_var().to_string();
    let mut start = txn::start_transaction(
        &agent,
        DEFAULT_TXN_VARIABLE,
        method,
        state.is_declared(DEFAULT_TXN_VARIABLE),
    );
    state.declare(DEFAULT_TXN_VARIABLE);
    let background = Expr::call(Expr::qualified("context", "Background"), Vec::new());
    let bind_ctx = state.bind(
        CONTEXT_VARIABLE,
        context::wrap_context_expression(&background, Expr::ident(DEFAULT_TXN_VARIABLE)),
    );
    let mut end = txn::end_transaction(DEFAULT_TXN_VARIABLE);
    let mut scratch = txn::end_transaction(DEFAULT_TXN_VARIABLE);
    spacing::wrap_statements(&mut start, cursor.stmt_mut(), &mut scratch);
    cursor.insert_before(start);
    cursor.insert_before(bind_ctx);

    match last_use {
        Some(offset) => {
            let after = cursor
                .rest_mut()
                .get_mut(offset)
                .map(|s| s.decs.take_after())
                .unwrap_or_default();
            end.decs.after = after;
            cursor.insert_later(offset, end);
            // Statements up to the end of the transaction pass it along.
            state.start_main_transaction(DEFAULT_TXN_VARIABLE);
        }
        None => {
            end.decs.after = scratch.decs.after;
            cursor.insert_after(end);
        }
    }
    mgr.add_import(&state.pkg, consts::NEWRELIC);
    mgr.add_import(&state.pkg, consts::CONTEXT);
}
