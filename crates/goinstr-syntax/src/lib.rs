//! Go syntax support for the instrumentation engine: a decorated syntax
//! tree, a tree-sitter based parser, a gofmt-style printer, statement
//! cursors and a best-effort type resolver.

pub mod ast;
pub mod imports;
pub mod parse;
pub mod printer;
pub mod stdlib;
pub mod types;
pub mod walk;

pub use parse::{ParseError, parse_file};
pub use printer::print_file;
pub use types::{Callee, PackageSource, Type, TypeInfo};
