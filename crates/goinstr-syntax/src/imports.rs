//! Import table helpers: package-name guessing, standard-library
//! classification and goimports-style insertion.

use crate::ast::*;

/// Standard-library paths have no dot in their first element.
pub fn is_std_path(path: &str) -> bool {
    path.split('/').next().is_some_and(|first| !first.contains('.'))
}

/// The package name an import path is referred to by when the importing file
/// gives no explicit name and the package's own clause is unknown.
pub fn default_package_name(path: &str) -> String {
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let is_major_version =
        |p: &str| p.len() > 1 && p.starts_with('v') && p[1..].chars().all(|c| c.is_ascii_digit());
    if parts.len() > 1 && parts.last().is_some_and(|p| is_major_version(p)) {
        parts.pop();
    }
    let last = parts.last().copied().unwrap_or(path);
    // gopkg.in/yaml.v3
    let last = match last.split_once(".v") {
        Some((base, version)) if version.chars().all(|c| c.is_ascii_digit()) => base,
        _ => last,
    };
    let last = last.strip_prefix("go-").unwrap_or(last);
    let last = last.strip_suffix("-go").unwrap_or(last);
    last.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Add an import of `path` to `file` unless it is already imported.
/// Returns whether the file changed.
///
/// Standard-library paths join the first group of standard-library imports;
/// other paths join the last group of non-standard imports, or start a new
/// group. Within a group the import lands at its sorted position.
pub fn add_import(file: &mut File, path: &str) -> bool {
    if file.has_import(path) {
        return false;
    }

    let Some(decl) = file.decls.iter_mut().find_map(|d| match &mut d.kind {
        DeclKind::Import(imp) => Some(imp),
        _ => None,
    }) else {
        let mut spec = ImportSpec::new(path);
        spec.decs.before = Space::None;
        file.decls.insert(
            0,
            Decl {
                kind: DeclKind::Import(ImportDecl {
                    specs: vec![spec],
                    grouped: false,
                    trailing: Vec::new(),
                }),
                decs: Decorations {
                    before: Space::EmptyLine,
                    ..Default::default()
                },
            },
        );
        return true;
    };

    if !decl.grouped {
        decl.grouped = true;
        for spec in &mut decl.specs {
            spec.decs.before = Space::NewLine;
        }
    }

    let groups = group_ranges(&decl.specs);
    let std = is_std_path(path);
    let target = if std {
        groups.iter().find(|r| is_std_path(&decl.specs[r.start].path))
    } else {
        groups.iter().rev().find(|r| !is_std_path(&decl.specs[r.start].path))
    };

    let mut spec = ImportSpec::new(path);
    match target {
        Some(range) => {
            let at = (range.start..range.end)
                .find(|&i| decl.specs[i].path.as_str() > path)
                .unwrap_or(range.end);
            if at == range.start && at < decl.specs.len() {
                let first = &mut decl.specs[at];
                spec.decs.before = first.decs.before;
                first.decs.before = Space::NewLine;
            }
            decl.specs.insert(at, spec);
        }
        None if std => {
            // Standard imports go first, ahead of every third-party group.
            if let Some(first) = decl.specs.first_mut() {
                first.decs.before = Space::EmptyLine;
            }
            decl.specs.insert(0, spec);
        }
        None => {
            if !decl.specs.is_empty() {
                spec.decs.before = Space::EmptyLine;
            }
            decl.specs.push(spec);
        }
    }
    true
}

/// Index ranges of blank-line separated import groups.
fn group_ranges(specs: &[ImportSpec]) -> Vec<std::ops::Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (i, spec) in specs.iter().enumerate() {
        if i > 0 && spec.decs.before == Space::EmptyLine {
            groups.push(start..i);
            start = i;
        }
    }
    if start < specs.len() {
        groups.push(start..specs.len());
    }
    groups
}
