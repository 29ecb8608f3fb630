//! PGWAS Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Validates a GWAS dataset described by a JSON manifest and imports it into
//! the PGWAS PostgreSQL schema.
//!
//! # Layout
//!
//! - **Manifest and dataset**: [`manifest`], [`dataset`]
//! - **Validation**: [`validation`] checks every file before anything is written
//! - **Identity resolution**: [`resolver`] over an [`store::IdentityStore`]
//! - **Loading**: [`parsers`], [`loaders`] and the concurrent [`bulk`] variant loader
//! - **Orchestration**: [`pipeline::Importer`]
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use pgwas_ingest::config::{create_pool, DbConfig, ImportOptions};
//! use pgwas_ingest::store::PgStore;
//! use pgwas_ingest::validation::{config::load_context, ValidationSelection};
//! use pgwas_ingest::{Importer, Resolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = load_context(Path::new("./maize282/manifest.json"), None)?;
//!     let pool = create_pool(&DbConfig::from_env()?).await?;
//!     let resolver = Resolver::new(Arc::new(PgStore::new(pool)), ImportOptions::from_env()?);
//!
//!     let (_, summary) = Importer::new(resolver)
//!         .validate_and_run(&ctx, &ValidationSelection::all())
//!         .await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod bulk;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loaders;
pub mod manifest;
pub mod models;
pub mod parsers;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod store;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use bulk::{BulkLoadReport, BulkVariantLoader};
pub use dataset::{DatasetContext, FileKind};
pub use error::{ConfigurationError, IngestError, Result, SchemaError};
pub use manifest::Manifest;
pub use pipeline::{ImportSummary, Importer};
pub use resolver::Resolver;
