//! Shared utilities: status codes, identifiers, configuration and logging.
pub mod config;
pub mod error;
pub mod ids;
pub mod log;
pub(crate) mod sync;

pub use error::{ComResult, HResult};
pub use ids::Guid;
