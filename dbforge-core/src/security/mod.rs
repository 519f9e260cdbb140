//! Credential protection.
//!
//! - `credentials`: username/password container zeroed on drop
//! - `secure_config`: the secure database configuration file and URL
//!   building
//!
//! # Security Guarantees
//! - Credentials are stored in `Zeroizing` containers
//! - Passwords never appear in `Debug` output or error messages
//! - URLs are logged only through `redact_database_url`

mod credentials;
mod secure_config;

pub use credentials::Credentials;
pub use secure_config::SecureConfig;
