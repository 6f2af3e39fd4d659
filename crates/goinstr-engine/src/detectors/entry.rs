//! The entry function: agent start-up and shutdown, and the trace root.

use std::collections::HashSet;

use goinstr_syntax::ast::*;
use log::{debug, info};

use crate::codegen::{is_qualified, txn};
use crate::consts;
use crate::manager::{Invocation, Manager};
use crate::state::TracingState;
use crate::trace;

/// Variable an existing `newrelic.NewApplication` call is bound to.
pub fn existing_agent(stmts: &[Stmt]) -> Option<String> {
    stmts.iter().find_map(|stmt| {
        let StmtKind::Assign { lhs, rhs, .. } = &stmt.kind else {
            return None;
        };
        let call = rhs.first()?.as_call()?;
        if !is_qualified(&call.fun, "newrelic", "NewApplication") {
            return None;
        }
        lhs.first()?.as_ident().map(|id| id.name.clone())
    })
}

/// Turn top-level `:=` statements of `main` that no longer declare anything
/// into plain assignments, once the agent set-up has declared `declared`.
pub fn lower_redeclarations(stmts: &mut [Stmt], declared: &[&str]) {
    let mut seen: HashSet<String> = declared.iter().map(|n| n.to_string()).collect();
    for stmt in stmts {
        let StmtKind::Assign { lhs, op, .. } = &mut stmt.kind else {
            continue;
        };
        if *op != AssignOp::Define {
            continue;
        }
        if !lhs.iter().all(|e| e.as_ident().is_some()) {
            continue;
        }
        let names: Vec<&str> = lhs
            .iter()
            .filter_map(|e| e.as_ident())
            .filter(|id| !id.is_blank())
            .map(|id| id.name.as_str())
            .collect();
        if !names.is_empty() && names.iter().all(|n| seen.contains(*n)) {
            debug!("{} is declared by the agent set-up", names.join(", "));
            *op = AssignOp::Assign;
        }
        seen.extend(names.into_iter().map(str::to_string));
    }
}

pub fn instrument_main(mgr: &mut Manager, inv: &Invocation) -> bool {
    if inv.name != "main" || inv.package_name != "main" {
        return false;
    }
    if mgr.package(&inv.pkg).is_none_or(|p| p.test) || mgr.is_generated(inv) {
        return false;
    }
    let Some(mut body) = mgr.take_body(inv) else {
        return false;
    };

    let agent = match existing_agent(&body.stmts) {
        Some(agent) => {
            info!("main already starts the agent as {agent}");
            agent
        }
        None => {
            let agent = mgr.agent.clone();
            lower_redeclarations(&mut body.stmts, &[agent.as_str(), "err"]);
            let init = txn::agent_init(&agent, &mgr.app_name);
            body.stmts.splice(0..0, init);
            body.stmts.push(txn::agent_shutdown(&agent));
            mgr.add_import(&inv.pkg, consts::NEWRELIC);
            mgr.add_import(&inv.pkg, consts::TIME);
            info!("added agent start-up to main as {agent}");
            agent
        }
    };

    let mut state = TracingState::main(&inv.pkg, &agent);
    state.declare(&agent);
    trace::trace_body(mgr, &mut body, &mut state);
    mgr.restore_body(inv, body);
    mgr.update_function_declaration(inv);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_agent_is_found() {
        let stmts = vec![Stmt::define(
            vec![Expr::ident("app"), Expr::ident("err")],
            vec![Expr::call(
                Expr::qualified("newrelic", "NewApplication"),
                Vec::new(),
            )],
        )];
        assert_eq!(existing_agent(&stmts), Some("app".to_string()));
        assert_eq!(existing_agent(&[Stmt::raw("run()")]), None);
    }

    #[test]
    fn test_redeclared_error_becomes_assignment() {
        let mut stmts = vec![
            Stmt::define(vec![Expr::ident("err")], vec![Expr::call(Expr::ident("run"), Vec::new())]),
            Stmt::define(
                vec![Expr::ident("n"), Expr::ident("err")],
                vec![Expr::call(Expr::ident("count"), Vec::new())],
            ),
            Stmt::define(
                vec![Expr::ident("_"), Expr::ident("err")],
                vec![Expr::call(Expr::ident("load"), Vec::new())],
            ),
            Stmt::define(vec![Expr::ident("m")], vec![Expr::basic("2")]),
        ];
        lower_redeclarations(&mut stmts, &["NewRelicAgent", "err"]);
        assert_eq!(
            goinstr_syntax::printer::stmts_to_string(&stmts, 0),
            "err = run()\nn, err := count()\n_, err = load()\nm := 2\n"
        );
    }
}
