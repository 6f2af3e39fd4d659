//! Per-function tracing state carried through a body walk.

use std::collections::HashSet;

use goinstr_syntax::ast::*;

use crate::carrier::TraceCarrier;
use crate::codegen::txn;

/// Where a traced function's transaction variable comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Already in scope: a parameter or an existing binding statement.
    Bound,
    /// Bound by this statement at the top of the body once something uses it.
    Pending(Stmt),
}

#[derive(Debug)]
pub struct TracingState {
    /// Package whose imports receive additions.
    pub pkg: String,
    pub carrier: Option<TraceCarrier>,
    pub txn_var: String,
    pub binding: Binding,
    used: bool,
    pub in_main: bool,
    pub is_async: bool,
    /// Segment opened at the top of the body.
    pub segment: Option<String>,
    agent: String,
    scopes: Vec<HashSet<String>>,
    /// Database handle opened in the entry function.
    pub sql_db: Option<String>,
    pub sql_done: bool,
}

impl TracingState {
    fn empty(pkg: &str, agent: &str) -> Self {
        Self {
            pkg: pkg.to_string(),
            carrier: None,
            txn_var: String::new(),
            binding: Binding::Bound,
            used: false,
            in_main: false,
            is_async: false,
            segment: None,
            agent: agent.to_string(),
            scopes: vec![HashSet::new()],
            sql_db: None,
            sql_done: false,
        }
    }

    /// State for the entry function, where transactions are started per
    /// statement from the agent.
    pub fn main(pkg: &str, agent: &str) -> Self {
        Self {
            in_main: true,
            ..Self::empty(pkg, agent)
        }
    }

    /// State for a function entered without a way to reach the transaction.
    pub fn untraced(pkg: &str, agent: &str) -> Self {
        Self::empty(pkg, agent)
    }

    /// State for a function reached with `carrier`, whose transaction is
    /// bound to `txn_var`.
    pub fn traced(pkg: &str, agent: &str, carrier: TraceCarrier, txn_var: &str) -> Self {
        let binding = match carrier.assign_transaction_variable(txn_var) {
            (Some(stmt), _) => Binding::Pending(stmt),
            (None, _) => Binding::Bound,
        };
        let txn_var = match &carrier {
            TraceCarrier::Transaction(name) => name.clone(),
            _ => txn_var.to_string(),
        };
        Self {
            carrier: Some(carrier),
            txn_var,
            binding,
            ..Self::empty(pkg, agent)
        }
    }

    /// State for a function whose transaction is bound by `binding`.
    pub fn with_binding(pkg: &str, agent: &str, txn_var: &str, binding: Stmt) -> Self {
        Self {
            carrier: Some(TraceCarrier::Transaction(txn_var.to_string())),
            txn_var: txn_var.to_string(),
            binding: Binding::Pending(binding),
            ..Self::empty(pkg, agent)
        }
    }

    pub fn has_txn(&self) -> bool {
        self.carrier.is_some()
    }

    /// Expression for the transaction in scope, recording the use.
    pub fn txn(&mut self) -> Option<Expr> {
        self.carrier.as_ref()?;
        self.used = true;
        Some(Expr::ident(&self.txn_var))
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Expression for the application: the agent variable in the entry
    /// function, the transaction's application elsewhere.
    pub fn agent(&mut self) -> Option<Expr> {
        if self.in_main {
            return Some(Expr::ident(&self.agent));
        }
        self.txn()?;
        Some(txn::txn_application(&self.txn_var))
    }

    pub fn agent_var(&self) -> &str {
        &self.agent
    }

    /// Begin a transaction bound to `name` for the statements that follow.
    pub fn start_main_transaction(&mut self, name: &str) {
        self.carrier = Some(TraceCarrier::Transaction(name.to_string()));
        self.txn_var = name.to_string();
        self.binding = Binding::Bound;
    }

    pub fn end_main_transaction(&mut self) {
        self.carrier = None;
        self.txn_var.clear();
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    /// Whether `name` is declared in the current scope, where redeclaring it
    /// with `:=` would not compile.
    pub fn is_declared(&self, name: &str) -> bool {
        self.scopes.last().is_some_and(|s| s.contains(name))
    }

    /// Record the names a `:=` statement introduces.
    pub fn declare_stmt(&mut self, stmt: &Stmt) {
        if let StmtKind::Assign {
            lhs,
            op: AssignOp::Define,
            ..
        } = &stmt.kind
        {
            for name in lhs.iter().filter_map(|e| e.as_ident()) {
                if !name.is_blank() {
                    self.declare(&name.name);
                }
            }
        }
    }

    /// `<name> := <value>`, or `<name> = <value>` when `name` is already
    /// declared in the current scope.
    pub fn bind(&mut self, name: &str, value: Expr) -> Stmt {
        let stmt = if self.is_declared(name) {
            Stmt::assign(vec![Expr::ident(name)], vec![value])
        } else {
            Stmt::define(vec![Expr::ident(name)], vec![value])
        };
        self.declare(name);
        stmt
    }

    /// Statements to place at the top of the traced body: the pending
    /// transaction binding if anything used it, then the segment.
    pub fn prologue(&mut self, has_segment: bool) -> Vec<Stmt> {
        let mut out = Vec::new();
        let segment = match &self.segment {
            Some(name) if !has_segment && self.carrier.is_some() => {
                Some(txn::defer_segment(name, &self.txn_var))
            }
            _ => None,
        };
        if segment.is_some() {
            self.used = true;
        }
        if let Binding::Pending(stmt) = &self.binding {
            if self.used {
                out.push(stmt.clone());
            }
        }
        out.extend(segment);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goinstr_syntax::printer::stmts_to_string;

    #[test]
    fn test_binding_only_emitted_when_used() {
        let mut state = TracingState::traced(
            "example.com/app",
            "NewRelicAgent",
            TraceCarrier::Context("ctx".into()),
            "nrTxn",
        );
        assert!(state.prologue(false).is_empty());
        assert_eq!(state.txn().unwrap().to_string(), "nrTxn");
        assert_eq!(
            stmts_to_string(&state.prologue(false), 0),
            "nrTxn := newrelic.FromContext(ctx)\n"
        );
    }

    #[test]
    fn test_segment_forces_binding() {
        let mut state = TracingState::traced(
            "example.com/app",
            "NewRelicAgent",
            TraceCarrier::Context("ctx".into()),
            "nrTxn",
        );
        state.segment = Some("work".into());
        assert_eq!(
            stmts_to_string(&state.prologue(false), 0),
            "nrTxn := newrelic.FromContext(ctx)\ndefer nrTxn.StartSegment(\"work\").End()\n"
        );
    }

    #[test]
    fn test_transaction_parameter_needs_no_binding() {
        let mut state = TracingState::traced(
            "example.com/app",
            "NewRelicAgent",
            TraceCarrier::Transaction("txn".into()),
            "nrTxn",
        );
        assert_eq!(state.txn().unwrap().to_string(), "txn");
        assert_eq!(state.agent().unwrap().to_string(), "txn.Application()");
        assert!(state.prologue(true).is_empty());
    }

    #[test]
    fn test_bind_defines_then_assigns() {
        let mut state = TracingState::main("example.com/app", "NewRelicAgent");
        assert!(state.txn().is_none());
        assert_eq!(state.agent().unwrap().to_string(), "NewRelicAgent");
        let first = state.bind("nrTxn", Expr::ident("a"));
        let second = state.bind("nrTxn", Expr::ident("b"));
        assert_eq!(stmts_to_string(&[first, second], 0), "nrTxn := a\nnrTxn = b\n");

        state.push_scope();
        assert!(!state.is_declared("nrTxn"));
        state.pop_scope();
        assert!(state.is_declared("nrTxn"));
    }
}
