//! Import restoration: each file of a package gains the imports the
//! generated code in it refers to.

use std::collections::BTreeSet;
use std::path::PathBuf;

use goinstr_syntax::ast::*;
use goinstr_syntax::imports::add_import;
use goinstr_syntax::walk::{stmt_exprs, walk_expr, walk_stmts};
use log::debug;

use crate::consts;
use crate::manager::Manager;

/// An import added to at least one file of a package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AddedImport {
    pub package_dir: PathBuf,
    pub path: String,
}

fn collect_qualifiers(expr: &Expr, out: &mut BTreeSet<String>) {
    walk_expr(expr, true, &mut |x| match &x.kind {
        ExprKind::Selector { x: base, .. } => {
            if let Some(id) = base.as_ident() {
                out.insert(id.name.clone());
            }
        }
        ExprKind::FuncLit(lit) => {
            for (_, ty) in lit.params.params() {
                collect_qualifiers(ty, out);
            }
        }
        _ => {}
    });
}

/// Names used as the left side of a selector anywhere in the file's
/// functions, parameter types included.
fn qualifiers(file: &File) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for func in file.funcs() {
        for (_, ty) in func.params.params() {
            collect_qualifiers(ty, &mut out);
        }
        let Some(body) = &func.body else { continue };
        walk_stmts(&body.stmts, &mut |stmt| {
            for e in stmt_exprs(stmt) {
                collect_qualifiers(e, &mut out);
            }
        });
    }
    out
}

/// Add every import recorded for a package to the files of that package
/// that use it. Returns the additions, one per package and path.
pub fn restore_imports(mgr: &mut Manager) -> Vec<AddedImport> {
    let (packages, _, _) = mgr.parts_mut();
    let mut added = BTreeSet::new();
    for package in packages.values_mut() {
        if package.imports.is_empty() {
            continue;
        }
        for file in package.files.iter_mut().filter(|f| !f.generated) {
            let used = qualifiers(&file.ast);
            for path in &package.imports {
                if !used.contains(consts::package_name(path)) {
                    continue;
                }
                if add_import(&mut file.ast, path) {
                    debug!("imported {path} in {}", file.path.display());
                    added.insert(AddedImport {
                        package_dir: package.dir.clone(),
                        path: path.clone(),
                    });
                }
            }
        }
    }
    added.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use goinstr_syntax::parse_file;

    #[test]
    fn test_qualifiers_include_literal_parameters() {
        let mut ids = IdGen::new();
        let file = parse_file(
            r#"package app

func run(nrTxn *newrelic.Transaction) {
	go func(t *trace.Span) {
		fmt.Println(t)
	}(nil)
}
"#,
            &mut ids,
        )
        .unwrap();
        let names: Vec<String> = qualifiers(&file).into_iter().collect();
        assert_eq!(names, vec!["fmt", "newrelic", "trace"]);
    }
}
