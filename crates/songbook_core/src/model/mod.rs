//! Catalog domain model.
//!
//! # Responsibility
//! - Define the song record and the pagination window used by list APIs.
//!
//! # Invariants
//! - Every song is identified by a stable `SongId`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod page;
pub mod song;
