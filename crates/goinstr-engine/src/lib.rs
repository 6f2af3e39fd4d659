//! Type-aware rewriting of Go applications to report to New Relic.
//!
//! [`instrument`] loads an application, finds the places a transaction can
//! start (the entry function, HTTP handlers, gRPC service methods), threads
//! the transaction through every application function reachable from them
//! and writes the result as a unified diff.

pub mod carrier;
pub mod codegen;
pub mod console;
pub mod consts;
pub mod detectors;
pub mod diff;
pub mod error;
pub mod facts;
pub mod fixup;
pub mod loader;
pub mod manager;
pub mod modresolver;
pub mod orchestrator;
pub mod restore;
pub mod state;
pub mod trace;

use std::io::Write;
use std::path::PathBuf;

pub use error::{Error, Result};
pub use modresolver::{GoGetResolver, ModuleResolver, NoopResolver};
pub use orchestrator::Report;

#[derive(Debug, Clone)]
pub struct InstrumentOptions {
    /// Root directory of the application, usually where `go.mod` lives.
    pub app_root: PathBuf,
    /// Name reported to New Relic; left to the environment when empty.
    pub app_name: String,
    /// Variable the agent application is bound to in `main`.
    pub agent_variable: String,
}

impl InstrumentOptions {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
            app_name: String::new(),
            agent_variable: consts::DEFAULT_AGENT_VARIABLE.to_string(),
        }
    }
}

/// Instrument the application and append its patch to `out`, resolving new
/// module dependencies with `resolver`.
pub fn instrument(
    options: &InstrumentOptions,
    resolver: &dyn ModuleResolver,
    out: &mut dyn Write,
) -> Result<Report> {
    orchestrator::run(options, resolver, out)
}
