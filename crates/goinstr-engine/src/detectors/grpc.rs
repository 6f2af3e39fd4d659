//! gRPC: fact discovery for service implementations and stream types,
//! client and server interceptors, and tracing of server methods.

use goinstr_syntax::ast::*;
use goinstr_syntax::walk::{Cursor, stmt_exprs, stmt_exprs_mut, visit_calls_mut, walk_expr, walk_stmts};
use goinstr_syntax::{Type, TypeInfo};
use log::debug;

use super::qualifier;
use crate::carrier::{TraceCarrier, context_type, resolved_type};
use crate::codegen::grpc::{add_client_interceptors, add_server_interceptors, has_interceptors};
use crate::consts::{self, DEFAULT_TXN_VARIABLE, GRPC};
use crate::facts::{Fact, FactError, Keeper};
use crate::manager::{Invocation, Manager};
use crate::state::TracingState;
use crate::trace;

/// Stream interfaces of the gRPC runtime itself.
const GENERIC_STREAMS: &[&str] = &[
    "ServerStream",
    "ServerStreamingServer",
    "ClientStreamingServer",
    "BidiStreamingServer",
];

const DIAL_FUNCS: &[&str] = &["Dial", "DialContext", "NewClient"];

fn fact_name(ty: &Type) -> Option<String> {
    let (pkg, name) = ty.deref().as_named()?;
    (!pkg.is_empty()).then(|| format!("{pkg}.{name}"))
}

/// Whether values of `ty` are server streams.
pub fn is_server_stream(facts: &Keeper, ty: &Type) -> bool {
    let Some((pkg, name)) = ty.as_named() else {
        return false;
    };
    if pkg == GRPC && GENERIC_STREAMS.contains(&name) {
        return true;
    }
    facts.get_fact(&format!("{pkg}.{name}")) == Fact::ServerStreamType
}

fn record(keeper: &mut Keeper, name: String, fact: Fact, errors: &mut Vec<FactError>) {
    if keeper.get_fact(&name) == fact {
        return;
    }
    debug!("fact {name}: {fact}");
    if let Err(err) = keeper.add_fact(&name, fact) {
        errors.push(err);
    }
}

/// Implementation types passed to generated `Register<Service>Server`
/// functions.
fn registered_servers(types: &TypeInfo, file: &File) -> Vec<String> {
    let mut found = Vec::new();
    for func in file.funcs() {
        let Some(body) = &func.body else { continue };
        walk_stmts(&body.stmts, &mut |stmt| {
            for e in stmt_exprs(stmt) {
                walk_expr(e, true, &mut |x| {
                    let Some(call) = x.as_call() else { return };
                    let registers = call
                        .fun_name()
                        .is_some_and(|n| n.starts_with("Register") && n.ends_with("Server"));
                    if !registers || call.args.len() != 2 {
                        return;
                    }
                    if let Some(name) = types.type_of(&call.args[1]).as_ref().and_then(fact_name) {
                        found.push(name);
                    }
                });
            }
        });
    }
    found
}

/// Interfaces embedding a server stream, and aliases of the generic stream
/// types, declared in `file`.
fn stream_types(types: &TypeInfo, path: &str, file: &File) -> Vec<String> {
    let is_stream = |e: &Expr| {
        types.type_expr(e).is_some_and(|t| {
            t.as_named()
                .is_some_and(|(pkg, name)| pkg == GRPC && GENERIC_STREAMS.contains(&name))
        })
    };
    let mut found = Vec::new();
    for decl in &file.decls {
        let DeclKind::Gen(group) = &decl.kind else { continue };
        for spec in &group.specs {
            let Spec::Type(ts) = spec else { continue };
            let stream = match &ts.def {
                TypeDef::Interface { embeds, .. } => embeds.iter().any(is_stream),
                TypeDef::Other(expr) => ts.alias && is_stream(expr),
                TypeDef::Struct(_) => false,
            };
            if stream {
                found.push(format!("{path}.{}", ts.name));
            }
        }
    }
    found
}

/// First pass over the application: classify service implementations and
/// stream types.
pub fn discover_facts(mgr: &mut Manager) -> Vec<FactError> {
    let mut servers = Vec::new();
    let mut streams = Vec::new();
    for package in mgr.packages() {
        for file in &package.files {
            servers.extend(registered_servers(mgr.types(), &file.ast));
            streams.extend(stream_types(mgr.types(), &package.path, &file.ast));
        }
    }
    let mut errors = Vec::new();
    let keeper = mgr.facts_mut();
    for name in streams {
        record(keeper, name, Fact::ServerStreamType, &mut errors);
    }
    for name in servers {
        record(keeper, name, Fact::ServerHandlerType, &mut errors);
    }
    errors
}

/// Trace a method of a registered service implementation, taking its
/// transaction from the stream or the context the interceptor populated.
pub fn instrument_server_method(mgr: &mut Manager, inv: &Invocation) -> bool {
    if !mgr.should_instrument_function(inv) {
        return false;
    }
    let (Some(decl), Some(package)) = (mgr.func_decl(inv), mgr.package(&inv.pkg)) else {
        return false;
    };
    let Some(recv) = decl.receiver_type_name() else {
        return false;
    };
    let handler = format!("{}.{recv}", package.path);
    if mgr.facts().get_fact(&handler) != Fact::ServerHandlerType {
        return false;
    }

    let ctx = context_type();
    let mut stream = None;
    let mut context = None;
    for (name, ty) in decl.params.params() {
        let Some(name) = name.filter(|n| !n.is_blank()) else {
            continue;
        };
        let Some(ty) = resolved_type(mgr.types(), ty) else {
            continue;
        };
        if stream.is_none() && is_server_stream(mgr.facts(), &ty) {
            stream = Some(TraceCarrier::Stream {
                name: name.name.clone(),
                ty,
            });
        } else if context.is_none() && ty == ctx {
            context = Some(TraceCarrier::Context(name.name.clone()));
        }
    }
    let Some(carrier) = stream.or(context) else {
        return false;
    };
    debug!("{} serves {handler} with {}", inv.name, carrier.type_name());

    mgr.update_function_declaration(inv);
    let state = TracingState::traced(&inv.pkg, &mgr.agent, carrier, DEFAULT_TXN_VARIABLE);
    trace::trace_function(mgr, inv, state);
    true
}

/// Add the client interceptors to connections the application dials.
pub fn instrument_dial(mgr: &mut Manager, pkg: &str, cursor: &mut Cursor<'_>) {
    let types = mgr.types();
    let mut changed = false;
    for e in stmt_exprs_mut(cursor.stmt_mut()) {
        visit_calls_mut(e, true, &mut |call| {
            let dials = types
                .callee(call)
                .is_some_and(|c| DIAL_FUNCS.iter().any(|name| c.is_func(GRPC, name)));
            if !dials || has_interceptors(call) {
                return;
            }
            let grpc = qualifier(call).unwrap_or("grpc").to_string();
            add_client_interceptors(&grpc, call);
            changed = true;
        });
    }
    if changed {
        mgr.add_import(pkg, consts::NRGRPC);
    }
}

fn is_new_server(types: &TypeInfo, call: &CallExpr) -> bool {
    types.callee(call).is_some_and(|c| c.is_func(GRPC, "NewServer")) && !has_interceptors(call)
}

/// Add the server interceptors to servers the application creates.
pub fn instrument_server(mgr: &mut Manager, cursor: &mut Cursor<'_>, state: &mut TracingState) {
    let mut pending = false;
    for e in stmt_exprs(cursor.stmt()) {
        walk_expr(e, false, &mut |x| {
            if x.as_call().is_some_and(|c| is_new_server(mgr.types(), c)) {
                pending = true;
            }
        });
    }
    if !pending {
        return;
    }
    let Some(agent) = state.agent() else {
        return;
    };
    let types = mgr.types();
    for e in stmt_exprs_mut(cursor.stmt_mut()) {
        visit_calls_mut(e, false, &mut |call| {
            if is_new_server(types, call) {
                let grpc = qualifier(call).unwrap_or("grpc").to_string();
                add_server_interceptors(&grpc, agent.clone(), call);
            }
        });
    }
    mgr.add_import(&state.pkg, consts::NRGRPC);
}

#[cfg(test)]
mod tests {
    use super::*;
    use goinstr_syntax::{PackageSource, parse_file};

    #[test]
    fn test_stream_types_and_registrations() {
        let mut ids = IdGen::new();
        let mut types = TypeInfo::new(&mut ids).unwrap();
        let pb = parse_file(
            r#"package pb

import "google.golang.org/grpc"

type RouteGuide_ListFeaturesServer = grpc.ServerStreamingServer[Feature]

type RouteGuide_RouteChatServer interface {
	Send(*Note) error
	grpc.ServerStream
}

type Feature struct{}

type Note struct{}

func RegisterRouteGuideServer(s *grpc.Server, srv any) {}
"#,
            &mut ids,
        )
        .unwrap();
        let app = parse_file(
            r#"package main

import (
	"example.com/guide/pb"
	"google.golang.org/grpc"
)

type routeGuideServer struct{}

func main() {
	s := grpc.NewServer()
	pb.RegisterRouteGuideServer(s, &routeGuideServer{})
}
"#,
            &mut ids,
        )
        .unwrap();
        types.check(&[
            PackageSource {
                path: "example.com/guide/pb",
                name: "pb",
                files: vec![&pb],
            },
            PackageSource {
                path: "example.com/guide",
                name: "main",
                files: vec![&app],
            },
        ]);

        assert_eq!(
            stream_types(&types, "example.com/guide/pb", &pb),
            vec![
                "example.com/guide/pb.RouteGuide_ListFeaturesServer",
                "example.com/guide/pb.RouteGuide_RouteChatServer",
            ]
        );
        assert_eq!(
            registered_servers(&types, &app),
            vec!["example.com/guide.routeGuideServer"]
        );

        let mut keeper = Keeper::new();
        let mut errors = Vec::new();
        record(&mut keeper, "a.T".into(), Fact::ServerHandlerType, &mut errors);
        record(&mut keeper, "a.T".into(), Fact::ServerHandlerType, &mut errors);
        assert!(errors.is_empty());
        record(&mut keeper, "a.T".into(), Fact::ServerStreamType, &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(is_server_stream(&keeper, &Type::named(GRPC, "BidiStreamingServer")));
        assert!(!is_server_stream(&keeper, &Type::named("a", "T")));
    }
}
