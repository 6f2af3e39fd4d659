//! The instrumentation run: discovery, tracing from the detected roots,
//! per-statement detectors, call-site fixup and import restoration.

use std::io::Write;

use goinstr_syntax::ast::Stmt;
use goinstr_syntax::walk::walk_list;
use log::{debug, info};

use crate::detectors::{self, grpc};
use crate::error::{Error, Result};
use crate::manager::{Invocation, Manager};
use crate::modresolver::{self, ModuleResolver};
use crate::restore::{self, AddedImport};
use crate::{InstrumentOptions, diff, fixup, loader};

/// What a run changed.
#[derive(Debug, Default)]
pub struct Report {
    pub module: String,
    /// Functions a detector instrumented, as `<package id>.<function>`.
    pub instrumented: Vec<String>,
    pub call_sites_fixed: usize,
    pub imports: Vec<AddedImport>,
    pub files_patched: usize,
}

fn register_functions(mgr: &mut Manager) {
    for id in mgr.package_ids() {
        let Some(package) = mgr.package(&id) else {
            continue;
        };
        let decls: Vec<(usize, usize)> = package
            .files
            .iter()
            .enumerate()
            .flat_map(|(f, file)| (0..file.ast.decls.len()).map(move |d| (f, d)))
            .collect();
        for (file, decl) in decls {
            mgr.create_function_declaration(&id, file, decl);
        }
    }
}

/// Functions detectors consider, in package then key order. Test packages
/// and generated files are never rewritten.
fn candidates(mgr: &Manager) -> Vec<Invocation> {
    mgr.packages()
        .filter(|p| !p.test)
        .flat_map(|p| {
            p.funcs.keys().map(|name| Invocation {
                pkg: p.id.clone(),
                name: name.clone(),
                package_name: p.name.clone(),
            })
        })
        .filter(|inv| !mgr.is_generated(inv))
        .collect()
}

fn has_entry_point(mgr: &Manager) -> bool {
    mgr.packages()
        .any(|p| !p.test && p.name == "main" && p.funcs.contains_key("main"))
}

/// First pass: function table and facts. A missing entry point is reported
/// together with any fact conflicts.
pub fn discover(mgr: &mut Manager) -> Result<()> {
    register_functions(mgr);
    mgr.pin_generated_callees();
    let mut errors = Vec::new();
    let conflicts = grpc::discover_facts(mgr);
    if !conflicts.is_empty() {
        errors.push(Error::Facts(conflicts));
    }
    if !has_entry_point(mgr) {
        errors.push(Error::NoEntryPoint);
    }
    match Error::combine(errors) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn run_stateless(mgr: &mut Manager, pkg: &str, stmts: &mut Vec<Stmt>) {
    walk_list(stmts, &mut |cursor| {
        for detector in detectors::STATELESS_DETECTORS {
            (detector.detect)(mgr, pkg, cursor);
        }
        for block in cursor.stmt_mut().blocks_mut() {
            run_stateless(mgr, pkg, block);
        }
    });
}

/// Second pass: trace from every root a function detector accepts, then run
/// the stateless detectors over every application function.
pub fn rewrite(mgr: &mut Manager) -> Vec<String> {
    let mut instrumented = Vec::new();
    for detector in detectors::FUNCTION_DETECTORS {
        for inv in candidates(mgr) {
            if (detector.detect)(mgr, &inv) {
                debug!("{} instrumented {}.{}", detector.name, inv.pkg, inv.name);
                instrumented.push(format!("{}.{}", inv.pkg, inv.name));
            }
        }
    }

    for inv in candidates(mgr) {
        let Some(mut body) = mgr.take_body(&inv) else {
            continue;
        };
        run_stateless(mgr, &inv.pkg, &mut body.stmts);
        mgr.restore_body(&inv, body);
    }
    instrumented
}

/// Rewrite the application described by `options` in memory, fetch the
/// modules of new imports and append the patch to `out`.
pub fn run(
    options: &InstrumentOptions,
    resolver: &dyn ModuleResolver,
    out: &mut dyn Write,
) -> Result<Report> {
    let root = options.app_root.as_path();
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }
    let loaded = loader::load(root)?;
    let mut mgr = Manager::new(
        loaded.packages,
        loaded.types,
        &options.agent_variable,
        &options.app_name,
    );

    discover(&mut mgr)?;
    let instrumented = rewrite(&mut mgr);
    let call_sites_fixed = fixup::fix_call_sites(&mut mgr);
    // Adding an import declaration shifts declaration indices, so this
    // comes after everything that looks functions up.
    let imports = restore::restore_imports(&mut mgr);

    modresolver::resolve_all(
        resolver,
        imports
            .iter()
            .map(|i| (i.package_dir.as_path(), i.path.as_str())),
    )?;

    let files_patched = diff::write_patches(&mgr, root, out)?;
    info!(
        "instrumented {} functions, patched {files_patched} files",
        instrumented.len()
    );
    Ok(Report {
        module: loaded.module,
        instrumented,
        call_sites_fixed,
        imports,
        files_patched,
    })
}
