//! Core catalog logic for Songbook.
//! This crate is the single source of truth for song catalog invariants.
//!
//! Layers, bottom-up: `db` (pool and migrations), `repo` (transactional
//! SQLite access), `service` (request parsing and error taxonomy). `lyrics`
//! holds the pure verse paginator shared by the repository.

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod lyrics;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{CatalogConfig, ConfigError, DatabaseConfig, LoggingConfig};
pub use context::{Interrupted, OpContext};
pub use db::{open_pool, open_pool_in_memory, DbError, DbPool};
pub use logging::{default_log_level, init_logging, init_logging_from, logging_status};
pub use model::page::{PageError, PageRequest};
pub use model::song::{Song, SongFields, SongId, SongValidationError};
pub use repo::song_repo::{
    RepoError, RepoResult, SongLookup, SongRepository, SqliteSongRepository,
};
pub use service::catalog_service::{
    AddSongRequest, CatalogService, GetSongRequest, Pagination, UpdateSongRequest,
};
pub use service::error::{ErrorKind, ErrorResponse, ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
