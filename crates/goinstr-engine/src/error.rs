use std::path::PathBuf;

use itertools::Itertools;
use thiserror::Error;

use crate::facts::FactError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("application path {0} does not exist or is not a directory")]
    NotADirectory(PathBuf),

    #[error("no main function found in the application; cannot decide where to start tracing")]
    NoEntryPoint,

    #[error("fact discovery failed: {}", .0.iter().join("; "))]
    Facts(Vec<FactError>),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: goinstr_syntax::ParseError,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write patch: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to walk application sources: {0}")]
    Walk(#[from] ignore::Error),

    #[error("`{command}` failed: {detail}")]
    ModuleResolver { command: String, detail: String },

    #[error("{}", .0.iter().join("; "))]
    Combined(Vec<Error>),
}

impl Error {
    /// Fold several errors into one, keeping a single error as is.
    pub fn combine(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Combined(errors)),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_joins_messages() {
        let err = Error::combine(vec![
            Error::Facts(vec![FactError::EmptyName]),
            Error::NoEntryPoint,
        ])
        .unwrap();
        let msg = err.to_string();
        assert!(msg.starts_with("fact discovery failed: "));
        assert!(msg.ends_with("cannot decide where to start tracing"));
        assert!(Error::combine(Vec::new()).is_none());
    }
}
