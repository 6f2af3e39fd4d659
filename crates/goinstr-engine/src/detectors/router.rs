use goinstr_syntax::ast::*;
use goinstr_syntax::walk::Cursor;

use crate::codegen::grpc::{is_middleware_use, use_middleware};
use crate::consts;
use crate::manager::Manager;
use crate::state::TracingState;

/// Router constructors and the middleware package that instruments them.
const ROUTERS: &[(&str, &str, &str)] = &[
    (consts::GIN, "Default", consts::NRGIN),
    (consts::GIN, "New", consts::NRGIN),
    (consts::GORILLA_MUX, "NewRouter", consts::NRGORILLA),
];

/// Install the agent's middleware right after a router is created.
pub fn install_middleware(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) {
    let StmtKind::Assign { lhs, rhs, .. } = &cursor.stmt().kind else {
        return;
    };
    let ([router], [value]) = (lhs.as_slice(), rhs.as_slice()) else {
        return;
    };
    let Some(callee) = value.as_call().and_then(|c| mgr.types().callee(c)) else {
        return;
    };
    let Some(&(_, _, middleware)) = ROUTERS
        .iter()
        .find(|(pkg, name, _)| callee.is_func(pkg, name))
    else {
        return;
    };
    if router.as_ident().is_none_or(Ident::is_blank) {
        return;
    }
    let name = consts::package_name(middleware);
    if cursor.rest().iter().any(|s| is_middleware_use(s, name)) {
        return;
    }
    let mut router = router.clone();
    router.decs = Decorations::default();
    let Some(agent) = state.agent() else {
        return;
    };

    let mut stmt = use_middleware(&router, name, agent);
    stmt.decs.after = cursor.stmt_mut().decs.take_after();
    cursor.insert_after(stmt);
    mgr.add_import(&state.pkg, middleware);
}
