//! `gglang` library crate.
//!
//! High-level layout:
//! - frontend: `lexer` + `parser` produce the AST (`ast`)
//! - `analyzer` runs the three semantic passes over a scoped `symbols` table
//! - `emitter` lowers the analyzed AST to a C translation unit for the
//!   gg_runtime ABI
//! - `compile` ties the pipeline together behind the driver boundary
pub mod analyzer;
pub mod ast;
pub mod compile;
pub mod config;
pub mod diagnostics;
pub mod emitter;
pub mod fixtures;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod symbols;
pub mod token;
