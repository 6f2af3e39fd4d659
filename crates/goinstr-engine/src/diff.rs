//! Unified diff of every rewritten file against its contents on disk.

use std::io::Write;
use std::path::Path;

use goinstr_syntax::print_file;
use log::debug;
use path_slash::PathExt;
use similar::TextDiff;

use crate::error::{Error, Result};
use crate::manager::{Manager, SourceFile};

/// Path of `file` relative to the application root, with forward slashes.
fn relative_name(root: &Path, file: &Path) -> String {
    let rel = pathdiff::diff_paths(file, root).unwrap_or_else(|| file.to_path_buf());
    rel.to_slash_lossy().into_owned()
}

/// The patch for one file, or `None` when rewriting left it unchanged.
/// Generated files are never patched.
pub fn file_patch(root: &Path, file: &SourceFile) -> Option<String> {
    if file.generated {
        return None;
    }
    let printed = print_file(&file.ast);
    if printed == file.baseline {
        return None;
    }
    let name = relative_name(root, &file.path);
    let diff = TextDiff::from_lines(file.original.as_str(), printed.as_str());
    Some(format!(
        "{}",
        diff.unified_diff()
            .context_radius(3)
            .header(&format!("a/{name}"), &format!("b/{name}"))
    ))
}

/// Append the patch of every changed file to `out`, packages in import path
/// order. Returns the number of files patched.
pub fn write_patches(mgr: &Manager, root: &Path, out: &mut dyn Write) -> Result<usize> {
    let mut packages: Vec<_> = mgr.packages().collect();
    packages.sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));
    let mut written = 0;
    for package in packages {
        for file in &package.files {
            let Some(patch) = file_patch(root, file) else {
                continue;
            };
            debug!("patching {}", file.path.display());
            out.write_all(patch.as_bytes()).map_err(Error::Write)?;
            written += 1;
        }
    }
    out.flush().map_err(Error::Write)?;
    Ok(written)
}
