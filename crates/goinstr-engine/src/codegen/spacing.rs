//! Moving decorations around rewritten statements.

use goinstr_syntax::ast::*;

/// Give `wrapped`'s leading band to `first` and its trailing band to
/// `last`, leaving `wrapped` as a plain line between them.
pub fn wrap_statements(first: &mut Stmt, wrapped: &mut Stmt, last: &mut Stmt) {
    let (before, start) = wrapped.decs.take_before();
    first.decs.before = before;
    let mut comments = start;
    comments.append(&mut first.decs.start);
    first.decs.start = comments;
    wrapped.decs.before = Space::NewLine;
    last.decs.after = wrapped.decs.take_after();
}

/// One statement per line, with a blank line after the last one.
pub fn create_statement_block(stmts: &mut [Stmt]) {
    for stmt in stmts.iter_mut() {
        if stmt.decs.before != Space::EmptyLine {
            stmt.decs.before = Space::NewLine;
        }
        stmt.decs.after = Space::None;
    }
    if let Some(last) = stmts.last_mut() {
        last.decs.after = Space::EmptyLine;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::txn;
    use goinstr_syntax::printer::stmts_to_string;

    #[test]
    fn test_wrap_statements_moves_bands() {
        let mut call = Stmt::raw("work()");
        call.decs.before = Space::EmptyLine;
        call.decs.start = vec!["// do the work".to_string()];
        call.decs.after = Space::EmptyLine;
        let mut start = txn::start_transaction("NewRelicAgent", "nrTxn", "work", false);
        let mut end = txn::end_transaction("nrTxn");
        wrap_statements(&mut start, &mut call, &mut end);

        assert!(call.decs.start.is_empty());
        assert_eq!(call.decs.before, Space::NewLine);
        assert_eq!(call.decs.after, Space::None);

        let stmts = vec![Stmt::raw("setup()"), start, call, end, Stmt::raw("done()")];
        assert_eq!(
            stmts_to_string(&stmts, 0),
            "setup()\n\n// do the work\nnrTxn := NewRelicAgent.StartTransaction(\"work\")\nwork()\nnrTxn.End()\n\ndone()\n"
        );
    }

    #[test]
    fn test_statement_block_ends_with_blank_line() {
        let mut stmts = vec![Stmt::raw("a()"), Stmt::raw("b()")];
        stmts[0].decs.after = Space::EmptyLine;
        create_statement_block(&mut stmts);
        assert_eq!(stmts[0].decs.after, Space::None);
        assert_eq!(stmts[1].decs.after, Space::EmptyLine);
    }
}
