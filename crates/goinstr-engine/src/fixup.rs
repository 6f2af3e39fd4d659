//! Call-site consistency: calls into functions that gained a transaction
//! parameter but were never reached by tracing pass `nil` for it.

use std::collections::HashMap;

use goinstr_syntax::TypeInfo;
use goinstr_syntax::ast::*;
use goinstr_syntax::walk::visit_calls_in_stmts_mut;
use log::{debug, info};

use crate::manager::Manager;

/// Parameter counts of extended functions, keyed by declaring package path
/// and function key.
fn extended_arity(mgr: &Manager) -> HashMap<(String, String), usize> {
    let mut out = HashMap::new();
    for (pkg, name) in mgr.extended() {
        let Some(package) = mgr.package(pkg) else {
            continue;
        };
        let Some(decl) = package.funcs.get(name).and_then(|e| package.decl(*e)) else {
            continue;
        };
        out.insert((package.path.clone(), name.clone()), decl.params.len());
    }
    out
}

fn callee_key(types: &TypeInfo, call: &CallExpr) -> Option<(String, String)> {
    let callee = types.callee(call)?;
    let name = match &callee.recv {
        Some(recv) => format!("{recv}.{}", callee.name),
        None => callee.name,
    };
    Some((callee.pkg, name))
}

/// `f(g())` where `g` returns several values already fills the parameters.
fn spreads_results(types: &TypeInfo, call: &CallExpr) -> bool {
    match call.args.as_slice() {
        [only] => only
            .as_call()
            .is_some_and(|inner| types.results_of_call(inner).len() > 1),
        _ => false,
    }
}

/// Append `nil` to every short call of an extended function, in every
/// non-generated file of the application, tests included. Returns the
/// number of calls fixed.
pub fn fix_call_sites(mgr: &mut Manager) -> usize {
    let arity = extended_arity(mgr);
    if arity.is_empty() {
        return 0;
    }
    let (packages, types, _) = mgr.parts_mut();
    let mut fixed = 0;
    for package in packages.values_mut() {
        let mut in_package = 0;
        for file in package.files.iter_mut().filter(|f| !f.generated) {
            for func in file.ast.funcs_mut() {
                let Some(body) = &mut func.body else { continue };
                visit_calls_in_stmts_mut(&mut body.stmts, &mut |call| {
                    if call.ellipsis || spreads_results(types, call) {
                        return;
                    }
                    let Some(want) = callee_key(types, call).and_then(|k| arity.get(&k)) else {
                        return;
                    };
                    if call.args.len() + 1 == *want {
                        debug!("passing nil transaction to {}", call.fun);
                        call.push_arg(Expr::nil());
                        in_package += 1;
                    }
                });
            }
        }
        if in_package > 0 {
            info!("fixed {in_package} call sites in {}", package.id);
        }
        fixed += in_package;
    }
    fixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{Invocation, Package, SourceFile};
    use goinstr_syntax::printer::print_file;
    use goinstr_syntax::{PackageSource, parse_file};
    use std::path::PathBuf;

    const SRC: &str = r#"package app

import "github.com/newrelic/go-agent/v3/newrelic"

func work(n int, nrTxn *newrelic.Transaction) int { return n }

func other() {
	work(1)
	f := func() { work(2) }
	f()
}
"#;

    fn manager(generated: bool) -> Manager {
        let mut ids = IdGen::new();
        let mut types = TypeInfo::new(&mut ids).unwrap();
        let ast = parse_file(SRC, &mut ids).unwrap();
        types.check(&[PackageSource {
            path: "example.com/app",
            name: "app",
            files: vec![&ast],
        }]);
        let mut package = Package::new("example.com/app", "example.com/app", "app", PathBuf::new(), false);
        package.files.push(SourceFile {
            path: PathBuf::from("app.go"),
            original: SRC.to_string(),
            baseline: print_file(&ast),
            ast,
            generated,
        });
        let decls = package.files[0].ast.decls.len();
        let mut mgr = Manager::new(vec![package], types, "NewRelicAgent", "");
        for decl in 0..decls {
            mgr.create_function_declaration("example.com/app", 0, decl);
        }
        mgr.mark_extended(&Invocation {
            pkg: "example.com/app".into(),
            name: "work".into(),
            package_name: "app".into(),
        });
        mgr
    }

    #[test]
    fn test_short_calls_get_nil() {
        let mut mgr = manager(false);
        assert_eq!(fix_call_sites(&mut mgr), 2);
        let printed = print_file(&mgr.package("example.com/app").unwrap().files[0].ast);
        assert!(printed.contains("\twork(1, nil)\n"));
        assert!(printed.contains("work(2, nil)"));
        assert_eq!(fix_call_sites(&mut mgr), 0);
    }

    #[test]
    fn test_generated_files_are_left_alone() {
        let mut mgr = manager(true);
        assert_eq!(fix_call_sites(&mut mgr), 0);
        let file = &mgr.package("example.com/app").unwrap().files[0];
        assert_eq!(print_file(&file.ast), file.baseline);
    }
}
