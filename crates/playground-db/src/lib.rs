pub mod config;
pub mod database;
pub mod history_repository;
pub mod sandbox;
pub mod session_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use history_repository::HistoryRepository;
pub use sandbox::{SandboxConfig, SandboxManager};
pub use session_repository::SessionRepository;
