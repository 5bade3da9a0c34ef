//! larder-core: shared error and configuration types for the Larder
//! asset backend.

pub mod config;
pub mod errors;

pub use config::{LarderConfig, LarderConfigSnapshot};
pub use errors::{ErrorKind, LarderError};
