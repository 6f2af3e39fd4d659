//! Fetching the modules newly imported packages belong to.

use std::path::Path;
use std::process::Command;

use goinstr_syntax::imports::is_std_path;
use log::info;

use crate::error::{Error, Result};

pub trait ModuleResolver {
    /// Make `import_path` available to the module containing `package_dir`.
    fn get(&self, package_dir: &Path, import_path: &str) -> Result<()>;
}

/// Runs `go get` in the package directory.
#[derive(Debug, Clone)]
pub struct GoGetResolver {
    pub go: String,
}

impl Default for GoGetResolver {
    fn default() -> Self {
        Self { go: "go".to_string() }
    }
}

impl ModuleResolver for GoGetResolver {
    fn get(&self, package_dir: &Path, import_path: &str) -> Result<()> {
        let command = format!("{} get {import_path}", self.go);
        info!("running `{command}` in {}", package_dir.display());
        let output = Command::new(&self.go)
            .arg("get")
            .arg(import_path)
            .current_dir(package_dir)
            .output()
            .map_err(|e| Error::ModuleResolver {
                command: command.clone(),
                detail: e.to_string(),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ModuleResolver {
                command,
                detail: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

/// Skips fetching entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

impl ModuleResolver for NoopResolver {
    fn get(&self, _package_dir: &Path, _import_path: &str) -> Result<()> {
        Ok(())
    }
}

/// Resolve each non-standard import, stopping at the first failure.
pub fn resolve_all<'a>(
    resolver: &dyn ModuleResolver,
    imports: impl IntoIterator<Item = (&'a Path, &'a str)>,
) -> Result<()> {
    for (dir, path) in imports {
        if is_std_path(path) {
            continue;
        }
        resolver.get(dir, path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<String>>);

    impl ModuleResolver for Recorder {
        fn get(&self, _package_dir: &Path, import_path: &str) -> Result<()> {
            self.0.borrow_mut().push(import_path.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_standard_library_is_skipped() {
        let recorder = Recorder::default();
        let dir = Path::new(".");
        resolve_all(
            &recorder,
            [
                (dir, "context"),
                (dir, "github.com/newrelic/go-agent/v3/newrelic"),
                (dir, "time"),
            ],
        )
        .unwrap();
        assert_eq!(
            recorder.0.into_inner(),
            vec!["github.com/newrelic/go-agent/v3/newrelic".to_string()]
        );
    }

    #[test]
    fn test_missing_tool_reports_command() {
        let resolver = GoGetResolver {
            go: "goinstr-no-such-go-binary".to_string(),
        };
        let err = resolver
            .get(Path::new("."), "github.com/newrelic/go-agent/v3/newrelic")
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("`goinstr-no-such-go-binary get github.com/newrelic/go-agent/v3/newrelic` failed: "));
    }
}
