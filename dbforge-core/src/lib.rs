//! Core library for DBForge: DBF records in, SQL `INSERT` statements out.
//!
//! The crate is organised leaf-first:
//! - `source`: lazy DBF record source over the `dbase` crate
//! - `filter`: declarative, AND-combined record filters
//! - `sql`: INSERT statement and literal generation
//! - `pipeline`: streaming batch pipeline feeding preview and execution
//! - `executor`: `sqlx`-backed statement executors
//!
//! # Security Guarantees
//! - Credentials are held in zeroizing containers and never logged
//! - Connection URLs are redacted in every log line and error message
//!
//! # Example
//! ```rust
//! use dbforge_core::{
//!     BatchPipeline, Column, FieldType, FilterCondition, FilterSet, GenerationConfig,
//!     InsertGenerator, Record, Schema, SqlDialect,
//! };
//!
//! # async fn example() -> dbforge_core::Result<()> {
//! let schema = Schema::new(vec![Column::new("STATUS", FieldType::Character)]);
//! let filter = FilterSet::new(vec![FilterCondition::new("STATUS", Default::default(), "I")])
//!     .compile(&schema)?;
//! let generator = InsertGenerator::new("vales", schema.columns().to_vec(), SqlDialect::Postgres)?;
//!
//! let mut preview = Vec::<u8>::new();
//! let summary = BatchPipeline::new(GenerationConfig::new(100), filter, generator)
//!     .with_preview(&mut preview)
//!     .run(vec![Ok(Record::new().with("STATUS", "I"))])
//!     .await?;
//! assert_eq!(summary.records_matched, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod security;
pub mod source;
pub mod sql;

// Re-export commonly used types
pub use config::{AppConfig, ConnectionConfig};
pub use error::{DbForgeError, Result};
pub use executor::{StatementExecutor, create_executor};
pub use filter::{FilterCondition, FilterEvaluator, FilterSet, Operator};
pub use models::{Column, DatabaseType, FieldType, Lane, Record, Schema, Value};
pub use pipeline::{
    BatchPipeline, CancelFlag, GenerationConfig, PipelineState, PreviewExtension, RunSummary,
};
pub use source::DbfSource;
pub use sql::{InsertGenerator, InsertMode, SqlDialect};
