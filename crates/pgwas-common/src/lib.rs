//! PGWAS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the PGWAS import tools.
//!
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Logging**: tracing subscriber configuration for binaries
//! - **Tables**: a small delimited-text reader used by validators and parsers
//!
//! # Example
//!
//! ```no_run
//! use pgwas_common::table::{Delimiter, Table};
//!
//! fn count_lines(path: &str) -> pgwas_common::Result<usize> {
//!     let table = Table::read(path, Delimiter::Comma, true)?;
//!     Ok(table.row_count())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod table;

pub use error::{CommonError, Result};
