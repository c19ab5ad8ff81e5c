pub mod archive;
pub mod error;
pub mod git;
pub mod models;
pub mod service;
pub mod sql;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use archive::QueryArchiver;
pub use error::AppError;
pub use models::{Principal, QueryInput, SandboxLimits, compute_hash};
pub use service::QueryService;
pub use sql::StatementKind;
pub use traits::{GitHost, HistoryStore, NullHistory, QueryEngine};
