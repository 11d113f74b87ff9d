//! Song domain model.
//!
//! # Responsibility
//! - Define the canonical catalog record and its mutable attribute set.
//! - Enforce record-level invariants before persistence.
//!
//! # Invariants
//! - `id` is generated once and never reused for another song.
//! - `name` and `group_name` are never empty.
//! - `(name, group_name)` is unique across the catalog (enforced by storage).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a catalog song.
pub type SongId = Uuid;

/// Record-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongValidationError {
    EmptyName,
    EmptyGroupName,
}

impl Display for SongValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "song name must not be empty"),
            Self::EmptyGroupName => write!(f, "group name must not be empty"),
        }
    }
}

impl Error for SongValidationError {}

/// Every attribute of a song except its identity.
///
/// Updates replace the whole set; there is no partial patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongFields {
    pub name: String,
    pub group_name: String,
    pub release_date: NaiveDate,
    /// Lyrics; verses are separated by blank lines.
    pub text: String,
    /// External link, stored as given.
    pub link: String,
}

impl SongFields {
    /// Checks the non-empty invariants on `name` and `group_name`.
    pub fn validate(&self) -> Result<(), SongValidationError> {
        if self.name.trim().is_empty() {
            return Err(SongValidationError::EmptyName);
        }
        if self.group_name.trim().is_empty() {
            return Err(SongValidationError::EmptyGroupName);
        }
        Ok(())
    }
}

/// Catalog record as stored and returned by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub name: String,
    pub group_name: String,
    pub release_date: NaiveDate,
    pub text: String,
    pub link: String,
}

impl Song {
    /// Creates a song with a freshly generated id.
    pub fn new(fields: SongFields) -> Self {
        Self::with_id(Uuid::new_v4(), fields)
    }

    /// Creates a song with a caller-provided id.
    pub fn with_id(id: SongId, fields: SongFields) -> Self {
        Self {
            id,
            name: fields.name,
            group_name: fields.group_name,
            release_date: fields.release_date,
            text: fields.text,
            link: fields.link,
        }
    }

    /// Copies the mutable attributes out of this record.
    pub fn fields(&self) -> SongFields {
        SongFields {
            name: self.name.clone(),
            group_name: self.group_name.clone(),
            release_date: self.release_date,
            text: self.text.clone(),
            link: self.link.clone(),
        }
    }
}
