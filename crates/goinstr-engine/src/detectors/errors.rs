//! Report errors returned inside traced functions to the transaction.

use goinstr_syntax::TypeInfo;
use goinstr_syntax::ast::*;
use goinstr_syntax::walk::Cursor;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::codegen::{advice, errors, is_qualified};
use crate::manager::Manager;
use crate::state::TracingState;

/// Left-hand side positions of an assignment that receive an error: by the
/// callee's result types, or by the conventional name when those are
/// unknown.
fn error_positions(types: &TypeInfo, stmt: &Stmt) -> Vec<usize> {
    let StmtKind::Assign { lhs, rhs, .. } = &stmt.kind else {
        return Vec::new();
    };
    let [value] = rhs.as_slice() else {
        return Vec::new();
    };
    let Some(call) = value.as_call() else {
        return Vec::new();
    };
    let results = types.results_of_call(call);
    if results.len() == lhs.len() {
        return results
            .iter()
            .enumerate()
            .filter(|(_, ty)| ty.is_error())
            .map(|(i, _)| i)
            .collect();
    }
    lhs.iter()
        .enumerate()
        .filter(|(_, e)| e.is_ident("err"))
        .map(|(i, _)| i)
        .collect()
}

enum Caught {
    Discarded,
    Bound(Expr),
}

fn caught_error(types: &TypeInfo, stmt: &Stmt) -> Option<Caught> {
    let StmtKind::Assign { lhs, .. } = &stmt.kind else {
        return None;
    };
    let positions = error_positions(types, stmt);
    let mut discarded = false;
    for i in positions {
        match lhs[i].as_ident() {
            Some(id) if id.is_blank() => discarded = true,
            Some(_) => {
                let mut err = lhs[i].clone();
                err.decs = Decorations::default();
                return Some(Caught::Bound(err));
            }
            None => {}
        }
    }
    discarded.then_some(Caught::Discarded)
}

/// `<err> != nil`
fn is_not_nil_check(cond: &Expr, err: &Expr) -> bool {
    match &cond.unparen().kind {
        ExprKind::Binary { x, op, y } => op == "!=" && x.same_as(err) && y.is_nil(),
        _ => false,
    }
}

/// `<err> == nil`, `<err> == ErrX`, `<err> != ErrX` or `errors.Is(<err>, ..)`.
fn is_expected_error_check(cond: &Expr, err: &Expr) -> bool {
    match &cond.unparen().kind {
        ExprKind::Binary { x, op, y } if op == "==" || op == "!=" => {
            x.same_as(err) && (op == "==" || !y.is_nil())
        }
        ExprKind::Unary { op, x } if op == "!" => is_expected_error_check(x, err),
        ExprKind::Call(call) => {
            is_qualified(&call.fun, "errors", "Is")
                && call.args.first().is_some_and(|a| a.same_as(err))
        }
        _ => false,
    }
}

fn mentions_word(text: &str, name: &str) -> bool {
    static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid regex"));
    WORD.find_iter(text).any(|m| m.as_str() == name)
}

fn notice_in_branch(body: &mut Block, err: &Expr, state: &mut TracingState) {
    if errors::calls_notice_error(&body.stmts) {
        return;
    }
    let Some(txn) = state.txn() else {
        return;
    };
    debug!("noticing {err} in error branch");
    body.inline = false;
    body.stmts.insert(0, errors::notice_error(err, txn));
}

/// Add `NoticeError` to the branch checking an error the current statement
/// produces, or flag error handling it cannot follow.
pub fn notice_errors(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) {
    if let StmtKind::If(s) = &mut cursor.stmt_mut().kind {
        let Some(init) = &s.init else {
            return;
        };
        if let Some(Caught::Bound(err)) = caught_error(mgr.types(), init) {
            if is_not_nil_check(&s.cond, &err) {
                notice_in_branch(&mut s.body, &err, state);
            }
        }
        return;
    }

    let err = match caught_error(mgr.types(), cursor.stmt()) {
        None => return,
        Some(Caught::Discarded) => {
            advice::notice_unchecked_error(cursor.stmt_mut());
            return;
        }
        Some(Caught::Bound(err)) => err,
    };
    let Some(next) = cursor.rest_mut().first_mut() else {
        return;
    };
    match &mut next.kind {
        StmtKind::If(s) if s.init.is_none() => {
            if is_not_nil_check(&s.cond, &err) {
                notice_in_branch(&mut s.body, &err, state);
            } else if is_expected_error_check(&s.cond, &err) {
                advice::suspect_expected_error(next);
            }
        }
        StmtKind::Switch(s) => {
            let inspects = s.header.as_deref().is_some_and(|h| mentions_word(h, &err.to_string()));
            if inspects {
                advice::unknown_error(next);
            }
        }
        _ => {}
    }
}
