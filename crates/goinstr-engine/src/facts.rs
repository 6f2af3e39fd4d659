//! Facts about application types discovered in the first pass.
//!
//! A fact classifies a fully qualified type name (`<import path>.<Type>`)
//! so the rewrite pass can recognise user types that implement framework
//! interfaces. Each name is classified at most once.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Fact {
    #[default]
    None,
    /// Implements a gRPC service; registered with a server.
    ServerHandlerType,
    /// Embeds a gRPC server stream.
    ServerStreamType,
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Fact::None => "None",
            Fact::ServerHandlerType => "ServerHandlerType",
            Fact::ServerStreamType => "ServerStreamType",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactError {
    #[error("cannot record fact None for {0}")]
    NoneFact(String),

    #[error("cannot record a fact for an empty type name")]
    EmptyName,

    #[error("{name} already has fact {existing}, cannot add {new}")]
    Duplicate {
        name: String,
        existing: Fact,
        new: Fact,
    },
}

#[derive(Debug, Default)]
pub struct Keeper {
    facts: HashMap<String, Fact>,
}

impl Keeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fact(&mut self, name: &str, fact: Fact) -> Result<(), FactError> {
        if name.is_empty() {
            return Err(FactError::EmptyName);
        }
        if fact == Fact::None {
            return Err(FactError::NoneFact(name.to_string()));
        }
        if let Some(existing) = self.facts.get(name) {
            return Err(FactError::Duplicate {
                name: name.to_string(),
                existing: *existing,
                new: fact,
            });
        }
        self.facts.insert(name.to_string(), fact);
        Ok(())
    }

    pub fn get_fact(&self, name: &str) -> Fact {
        self.facts.get(name).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut keeper = Keeper::new();
        keeper
            .add_fact("example.com/app.server", Fact::ServerHandlerType)
            .unwrap();
        assert_eq!(keeper.get_fact("example.com/app.server"), Fact::ServerHandlerType);
        assert_eq!(keeper.get_fact("example.com/app.other"), Fact::None);
    }

    #[test]
    fn test_rejects_invalid_facts() {
        let mut keeper = Keeper::new();
        assert_eq!(keeper.add_fact("", Fact::ServerStreamType), Err(FactError::EmptyName));
        assert_eq!(
            keeper.add_fact("a.B", Fact::None),
            Err(FactError::NoneFact("a.B".to_string()))
        );
        keeper.add_fact("a.B", Fact::ServerStreamType).unwrap();
        let err = keeper.add_fact("a.B", Fact::ServerHandlerType).unwrap_err();
        assert_eq!(
            err.to_string(),
            "a.B already has fact ServerStreamType, cannot add ServerHandlerType"
        );
        assert_eq!(keeper.len(), 1);
    }
}
