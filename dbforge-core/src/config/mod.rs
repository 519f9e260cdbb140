//! Configuration types.
//!
//! - `file`: the JSON application configuration (`AppConfig`)
//! - `connection`: executor pool settings (`ConnectionConfig`)

pub mod connection;
pub mod file;

pub use connection::{ConnectionConfig, detect_database_type};
pub use file::{AppConfig, FeaturesConfig, PathsConfig};
