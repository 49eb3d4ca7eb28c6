// ABOUTME: Library module for pg-subset
// ABOUTME: Exports the extraction engine for use in the binary and tests

pub mod anonymize;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod db;
pub mod dialect;
pub mod emit;
pub mod error;
pub mod fetch;
pub mod ident;
pub mod schema;
pub mod seed;
pub mod sort;
pub mod traverse;
pub mod validate;
pub mod value;
