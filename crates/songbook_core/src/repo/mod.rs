//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the song catalog data access contract.
//! - Isolate SQLite statements (`queries`) from transaction handling
//!   (`song_repo`) and from service orchestration.
//!
//! # Invariants
//! - Repository writes enforce `SongFields::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod queries;
pub mod song_repo;
