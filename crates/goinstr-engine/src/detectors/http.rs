//! net/http: handlers, handler registration, clients and outbound requests.

use goinstr_syntax::Callee;
use goinstr_syntax::ast::*;
use goinstr_syntax::walk::Cursor;
use log::debug;

use super::{callees, primary_call, primary_call_mut};
use crate::carrier::resolved_type;
use crate::codegen::{advice, context, http, is_qualified, method_call, spacing};
use crate::consts::{self, DEFAULT_TXN_VARIABLE, EXTERNAL_SEGMENT_VARIABLE, NET_HTTP};
use crate::manager::{Invocation, Manager};
use crate::state::TracingState;
use crate::trace;

/// Trace a function with the `(http.ResponseWriter, *http.Request)`
/// signature, taking its transaction from the request context.
pub fn instrument_handler(mgr: &mut Manager, inv: &Invocation) -> bool {
    if !mgr.should_instrument_function(inv) {
        return false;
    }
    let Some(decl) = mgr.func_decl(inv) else {
        return false;
    };
    let params = decl.params.params();
    let [(_, writer), (Some(request), req_ty)] = params.as_slice() else {
        return false;
    };
    let types = mgr.types();
    let is_writer = resolved_type(types, writer).is_some_and(|t| t.is(NET_HTTP, "ResponseWriter"));
    let is_request =
        resolved_type(types, req_ty).is_some_and(|t| t.is_pointer_to(NET_HTTP, "Request"));
    if !is_writer || !is_request || request.is_blank() {
        return false;
    }
    let request = request.name.clone();
    debug!("{} is an http handler", inv.name);

    mgr.update_function_declaration(inv);
    let binding = context::txn_from_context(
        DEFAULT_TXN_VARIABLE,
        method_call(Expr::ident(&request), "Context", Vec::new()),
    );
    let state = TracingState::with_binding(&inv.pkg, &mgr.agent, DEFAULT_TXN_VARIABLE, binding);
    mgr.add_import(&inv.pkg, consts::NEWRELIC);
    trace::trace_function(mgr, inv, state);
    true
}

fn is_registration(callee: &Callee) -> bool {
    ["HandleFunc", "Handle"]
        .iter()
        .any(|name| callee.is_func(NET_HTTP, name) || callee.is_method(NET_HTTP, "ServeMux", name))
}

/// Route handler registrations through `newrelic.WrapHandleFunc`.
pub fn wrap_handler_registration(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) {
    let Some(call) = primary_call(cursor.stmt()) else {
        return;
    };
    if call.args.len() != 2 || http::is_wrapped_handler(call) {
        return;
    }
    if !mgr.types().callee(call).is_some_and(|c| is_registration(&c)) {
        return;
    }
    let anonymous = matches!(call.args[1].kind, ExprKind::FuncLit(_));
    let Some(agent) = state.agent() else {
        return;
    };
    let wrapped = primary_call_mut(cursor.stmt_mut()).is_some_and(|call| http::wrap_handle_func(agent, call));
    if wrapped {
        mgr.add_import(&state.pkg, consts::NEWRELIC);
        if anonymous {
            advice::attach(cursor.stmt_mut(), &consts::ANONYMOUS_HANDLER);
        }
    }
}

/// Install the agent's round tripper on a client right after it is built.
pub fn instrument_client(mgr: &mut Manager, pkg: &str, cursor: &mut Cursor<'_>) {
    let StmtKind::Assign { lhs, rhs, .. } = &cursor.stmt().kind else {
        return;
    };
    let ([client], [value]) = (lhs.as_slice(), rhs.as_slice()) else {
        return;
    };
    let is_client = mgr.types().type_of(value).is_some_and(|t| {
        t.is_pointer_to(NET_HTTP, "Client") || t.is(NET_HTTP, "Client")
    });
    if !is_client || client.as_ident().is_none_or(Ident::is_blank) {
        return;
    }
    if cursor.rest().first().is_some_and(http::is_round_tripper) {
        return;
    }
    let mut client = client.clone();
    client.decs = Decorations::default();
    let after = cursor.stmt_mut().decs.take_after();
    cursor.insert_after(http::round_tripper(&client, after));
    mgr.add_import(pkg, consts::NEWRELIC);
}

/// Mark calls of the package-level request helpers, which cannot carry a
/// transaction.
pub fn advise_helper_call(mgr: &mut Manager, _pkg: &str, cursor: &mut Cursor<'_>) {
    let helper = callees(mgr.types(), cursor.stmt()).iter().any(|callee| {
        consts::HTTP_HELPERS
            .iter()
            .any(|name| callee.is_func(NET_HTTP, name))
    });
    if helper {
        advice::http_helper(cursor.stmt_mut());
    }
}

fn is_default_client(mgr: &Manager, client: &Expr) -> bool {
    match client.as_selector() {
        Some((pkg, sel)) => {
            sel.name == "DefaultClient"
                && mgr.types().imported_path(pkg).as_deref() == Some(NET_HTTP)
        }
        None => false,
    }
}

fn starts_external_segment(stmt: &Stmt) -> bool {
    primary_call(stmt).is_some_and(|c| is_qualified(&c.fun, "newrelic", "StartExternalSegment"))
}

fn wraps_request(stmt: &Stmt) -> bool {
    primary_call(stmt).is_some_and(|c| is_qualified(&c.fun, "newrelic", "RequestWithTransactionContext"))
}

/// Record `Client.Do` calls: an external segment around requests sent by
/// the default client, the transaction attached to the request otherwise.
pub fn instrument_request(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) {
    if !state.has_txn() {
        return;
    }
    let Some(call) = primary_call(cursor.stmt()) else {
        return;
    };
    if !mgr
        .types()
        .callee(call)
        .is_some_and(|c| c.is_method(NET_HTTP, "Client", "Do"))
    {
        return;
    }
    let Some(mut req) = call.args.first().cloned() else {
        return;
    };
    req.decs = Decorations::default();
    let default_client = call
        .fun
        .as_selector()
        .is_some_and(|(client, _)| is_default_client(mgr, client));

    if default_client {
        if cursor.prev().is_some_and(starts_external_segment) {
            return;
        }
        let resp = super::assigned_names(cursor.stmt())
            .first()
            .filter(|name| **name != "_")
            .map(|name| Expr::ident(*name));
        let Some(txn) = state.txn() else {
            return;
        };
        let segment = EXTERNAL_SEGMENT_VARIABLE;
        let overwrite = state.is_declared(segment);
        state.declare(segment);
        let mut start = http::start_external_segment(txn, &req, segment, overwrite);
        let mut end = http::end_external_segment(segment);
        spacing::wrap_statements(&mut start, cursor.stmt_mut(), &mut end);
        cursor.insert_before(start);
        if let Some(resp) = resp {
            cursor.insert_after(http::capture_http_response(segment, &resp));
        }
        cursor.insert_after(end);
    } else {
        if req.as_ident().is_none() || cursor.prev().is_some_and(wraps_request) {
            return;
        }
        let Some(txn) = state.txn() else {
            return;
        };
        let mut wrap = http::wrap_request_context(&req, txn);
        let (before, comments) = cursor.stmt_mut().decs.take_before();
        wrap.decs.before = before;
        wrap.decs.start = comments;
        cursor.stmt_mut().decs.before = Space::NewLine;
        cursor.insert_before(wrap);
    }
    mgr.add_import(&state.pkg, consts::NEWRELIC);
}
