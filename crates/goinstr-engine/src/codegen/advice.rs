//! Advisory comment blocks attached above statements.

use goinstr_syntax::ast::*;
use log::warn;

use crate::console;
use crate::consts::{self, Advisory};

/// Prepend `lines` to the comments above `decs`. An existing comment block
/// is kept below a `//` separator. Returns false when the block is already
/// attached.
pub fn attach_lines(decs: &mut Decorations, lines: &[String]) -> bool {
    let Some(first) = lines.first() else {
        return false;
    };
    if decs.start.iter().any(|line| line == first) {
        return false;
    }
    let mut start = lines.to_vec();
    if !decs.start.is_empty() {
        start.push("//".to_string());
    }
    start.append(&mut decs.start);
    decs.start = start;
    true
}

pub fn attach(stmt: &mut Stmt, advisory: &Advisory) -> bool {
    let attached = attach_lines(&mut stmt.decs, &advisory.lines());
    if attached {
        warn!("attached advisory: {}", advisory.message);
        console::warn(advisory.message);
    }
    attached
}

pub fn notice_unchecked_error(stmt: &mut Stmt) -> bool {
    attach(stmt, &consts::UNCHECKED_ERROR)
}

pub fn suspect_expected_error(stmt: &mut Stmt) -> bool {
    attach(stmt, &consts::SUSPECT_EXPECTED_ERROR)
}

pub fn unknown_error(stmt: &mut Stmt) -> bool {
    attach(stmt, &consts::UNKNOWN_ERROR)
}

pub fn http_helper(stmt: &mut Stmt) -> bool {
    attach(stmt, &consts::HTTP_HELPER)
}
