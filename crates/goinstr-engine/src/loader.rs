//! Loading a Go application from disk: module path, packages per directory,
//! parsed files and resolved types.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use goinstr_syntax::ast::IdGen;
use goinstr_syntax::{PackageSource, TypeInfo, parse_file, print_file};
use ignore::WalkBuilder;
use log::{debug, info};
use once_cell::sync::Lazy;
use path_slash::PathExt;
use regex::Regex;

use crate::error::{Error, Result};
use crate::manager::{Package, SourceFile};

static MODULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^module\s+"?([^\s"]+)"?"#).expect("valid regex"));

static GENERATED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^// Code generated .* DO NOT EDIT\.$").expect("valid regex"));

pub struct Loaded {
    pub module: String,
    pub packages: Vec<Package>,
    pub types: TypeInfo,
}

/// Module path declared by `go.mod`, or the directory name when there is
/// none.
pub fn module_path(root: &Path) -> String {
    let declared = fs::read_to_string(root.join("go.mod"))
        .ok()
        .and_then(|text| MODULE_RE.captures(&text).map(|c| c[1].to_string()));
    declared.unwrap_or_else(|| {
        root.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app")
            .to_string()
    })
}

/// Whether the source carries the generated-code marker in the comments
/// above its package clause.
pub fn is_generated(source: &str) -> bool {
    source
        .lines()
        .take_while(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with("//") || line.starts_with("/*") || line.starts_with('*')
        })
        .any(|line| GENERATED_RE.is_match(line.trim_end()))
}

/// Go source files under `root`, sorted. Hidden entries, git-ignored
/// entries, `vendor` and `testdata` are skipped, as are files the go tool
/// ignores.
pub fn collect_go_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .filter_entry(|entry| {
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                if let Some(name) = entry.file_name().to_str() {
                    if name == "vendor" || name == "testdata" {
                        return false;
                    }
                }
            }
            true
        });

    let mut files = Vec::new();
    for result in builder.build() {
        let entry = result?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && name.ends_with(".go") && !name.starts_with('_') {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn import_path(module: &str, root: &Path, dir: &Path) -> String {
    let rel = pathdiff::diff_paths(dir, root).unwrap_or_default();
    let rel = rel.to_slash_lossy();
    if rel.is_empty() || rel == "." {
        module.to_string()
    } else {
        format!("{module}/{rel}")
    }
}

/// Read, parse and type-check every package of the application at `root`.
pub fn load(root: &Path) -> Result<Loaded> {
    let module = module_path(root);
    info!("loading module {module} from {}", root.display());

    let mut ids = IdGen::new();
    let mut types = TypeInfo::new(&mut ids).map_err(|source| Error::Parse {
        path: PathBuf::from("<known packages>"),
        source,
    })?;

    // (directory, package clause) -> files
    let mut groups: BTreeMap<(PathBuf, String), Vec<SourceFile>> = BTreeMap::new();
    for path in collect_go_files(root)? {
        let original = fs::read_to_string(&path).map_err(|source| Error::Read {
            path: path.clone(),
            source,
        })?;
        let ast = parse_file(&original, &mut ids).map_err(|source| Error::Parse {
            path: path.clone(),
            source,
        })?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let test_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_test.go"));
        // Internal test files are kept apart from the package they test.
        let key = if test_file && !ast.package.ends_with("_test") {
            format!("{} [test]", ast.package)
        } else {
            ast.package.clone()
        };
        groups.entry((dir, key)).or_default().push(SourceFile {
            generated: is_generated(&original),
            baseline: print_file(&ast),
            path,
            original,
            ast,
        });
    }

    let mut packages = Vec::new();
    for ((dir, key), files) in groups {
        let base = import_path(&module, root, &dir);
        let mut package = match key.strip_suffix(" [test]") {
            Some(name) => Package::new(&format!("{base} [test]"), &base, name, dir, true),
            None if key.ends_with("_test") => {
                let path = format!("{base}_test");
                Package::new(&path, &path, &key, dir, true)
            }
            None => Package::new(&base, &base, &key, dir, false),
        };
        debug!("package {} with {} files", package.id, files.len());
        package.files = files;
        packages.push(package);
    }

    // Internal test files resolve against the package they test.
    let mut by_path: BTreeMap<&str, (&str, Vec<&goinstr_syntax::ast::File>)> = BTreeMap::new();
    for package in &packages {
        let slot = by_path
            .entry(package.path.as_str())
            .or_insert_with(|| (package.name.as_str(), Vec::new()));
        slot.1.extend(package.files.iter().map(|f| &f.ast));
    }
    let sources: Vec<PackageSource<'_>> = by_path
        .into_iter()
        .map(|(path, (name, files))| PackageSource { path, name, files })
        .collect();
    types.check(&sources);

    info!("loaded {} packages", packages.len());
    Ok(Loaded {
        module,
        packages,
        types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, text: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_generated_marker() {
        assert!(is_generated(
            "// Code generated by protoc-gen-go. DO NOT EDIT.\n\npackage pb\n"
        ));
        assert!(!is_generated("package pb\n\n// Code generated by hand. DO NOT EDIT.\n"));
        assert!(!is_generated("// Code generated by protoc.\npackage pb\n"));
        assert!(is_generated(
            "// Copyright 2024 Shop\n\n// Code generated by Wire. DO NOT EDIT.\n\npackage main\n"
        ));
        assert!(!is_generated(
            "package main\n\nfunc work() {}\n\n// Code generated by hand. DO NOT EDIT.\nfunc other() {}\n"
        ));
    }

    #[test]
    fn test_load_groups_packages() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(root, "go.mod", "module example.com/shop\n\ngo 1.22\n");
        write(root, "main.go", "package main\n\nfunc main() {}\n");
        write(root, "main_test.go", "package main\n\nfunc helper() {}\n");
        write(root, "store/store.go", "package store\n\nfunc Load() {}\n");
        write(root, "store/store_test.go", "package store_test\n\nfunc check() {}\n");
        write(root, "vendor/dep/dep.go", "package dep\n");
        write(root, "_scratch.go", "package main\n");

        let loaded = load(root).unwrap();
        assert_eq!(loaded.module, "example.com/shop");
        let ids: Vec<(&str, &str, bool)> = loaded
            .packages
            .iter()
            .map(|p| (p.id.as_str(), p.path.as_str(), p.test))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("example.com/shop", "example.com/shop", false),
                ("example.com/shop [test]", "example.com/shop", true),
                ("example.com/shop/store", "example.com/shop/store", false),
                ("example.com/shop/store_test", "example.com/shop/store_test", true),
            ]
        );
    }

    #[test]
    fn test_module_path_falls_back_to_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let app = tmp.path().join("billing");
        fs::create_dir_all(&app).unwrap();
        assert_eq!(module_path(&app), "billing");
    }
}
