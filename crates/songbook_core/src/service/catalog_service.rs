//! Catalog use-case service.
//!
//! # Responsibility
//! - Turn bound request data into typed repository calls.
//! - Map repository failures into the catalog error taxonomy and log them.
//!
//! # Invariants
//! - Release dates, ids and page parameters are parsed before the repository
//!   is called; a bad value never reaches a mutation.
//! - No retries: each failure is logged once and returned once.
//! - The service keeps no state between calls beyond its repository.

use crate::context::OpContext;
use crate::logging::sanitize_message;
use crate::model::page::{PageError, PageRequest};
use crate::model::song::{Song, SongFields, SongId};
use crate::repo::song_repo::SongRepository;
use crate::service::error::{ErrorKind, ServiceError, ServiceResult};
use chrono::NaiveDate;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use uuid::Uuid;

/// Input format of release dates, e.g. `16.07.2006`.
pub const RELEASE_DATE_FORMAT: &str = "%d.%m.%Y";

const MAX_LOGGED_ERROR_CHARS: usize = 240;

/// Body of an add-song request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSongRequest {
    pub name: String,
    pub group_name: String,
    /// `DD.MM.YYYY`.
    pub release_date: String,
    pub text: String,
    pub link: String,
}

/// Lookup by group and song name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSongRequest {
    pub group: String,
    pub song: String,
}

/// Raw page parameters, validated by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page_id: i64,
    pub page_size: i64,
}

/// Body of a full-replacement update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSongRequest {
    pub id: String,
    pub name: String,
    pub group_name: String,
    /// `DD.MM.YYYY`.
    pub release_date: String,
    pub text: String,
    pub link: String,
}

/// Catalog facade over a song repository.
pub struct CatalogService<R: SongRepository> {
    repo: R,
}

impl<R: SongRepository> CatalogService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Adds a song.
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed date or an empty name/group.
    /// - `Conflict` when the group already has a song with this name.
    pub fn add_song(&self, ctx: &OpContext, request: &AddSongRequest) -> ServiceResult<Song> {
        let result = song_fields(
            &request.name,
            &request.group_name,
            &request.release_date,
            &request.text,
            &request.link,
        )
        .and_then(|fields| Ok(self.repo.add_song(ctx, &fields)?));
        observe("song_add", result)
    }

    /// Looks up one song by exact group and song name.
    pub fn get_song(&self, ctx: &OpContext, request: &GetSongRequest) -> ServiceResult<Song> {
        let result = self
            .repo
            .get_song(ctx, &request.group, &request.song)
            .map_err(ServiceError::from);
        observe("song_get", result)
    }

    /// Lists one page of songs in insertion order.
    pub fn list_songs(&self, ctx: &OpContext, pagination: &Pagination) -> ServiceResult<Vec<Song>> {
        let result = page_request(pagination)
            .and_then(|page| Ok(self.repo.list_songs(ctx, &page)?));
        observe("song_list", result)
    }

    /// Returns one page of verses from a song's lyrics.
    pub fn get_song_lyrics(
        &self,
        ctx: &OpContext,
        id: &str,
        pagination: &Pagination,
    ) -> ServiceResult<Vec<String>> {
        let result = parse_song_id(id).and_then(|id| {
            let page = page_request(pagination)?;
            Ok(self.repo.get_song_lyrics(ctx, id, &page)?)
        });
        observe("song_lyrics", result)
    }

    /// Replaces every field of an existing song.
    ///
    /// The release date is parsed before the repository is touched, so a bad
    /// date leaves the stored song unchanged.
    pub fn update_song(&self, ctx: &OpContext, request: &UpdateSongRequest) -> ServiceResult<Song> {
        let result = parse_song_id(&request.id).and_then(|id| {
            let fields = song_fields(
                &request.name,
                &request.group_name,
                &request.release_date,
                &request.text,
                &request.link,
            )?;
            Ok(self.repo.update_song(ctx, id, &fields)?)
        });
        observe("song_update", result)
    }

    /// Deletes a song permanently.
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed id.
    /// - `NotFound` when no song has this id.
    pub fn delete_song(&self, ctx: &OpContext, id: &str) -> ServiceResult<()> {
        let result = parse_song_id(id).and_then(|id| Ok(self.repo.delete_song(ctx, id)?));
        observe("song_delete", result)
    }
}

/// Parses a `DD.MM.YYYY` release date.
pub fn parse_release_date(value: &str) -> ServiceResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), RELEASE_DATE_FORMAT).map_err(|err| {
        ServiceError::invalid_input(
            "release_date",
            format!("expected DD.MM.YYYY, got `{value}`: {err}"),
        )
    })
}

fn parse_song_id(value: &str) -> ServiceResult<SongId> {
    Uuid::parse_str(value.trim())
        .map_err(|err| ServiceError::invalid_input("id", format!("`{value}` is not a UUID: {err}")))
}

fn page_request(pagination: &Pagination) -> ServiceResult<PageRequest> {
    PageRequest::new(pagination.page_id, pagination.page_size).map_err(|err| {
        let field = match err {
            PageError::InvalidPage(_) => "page_id",
            PageError::InvalidPageSize(_) => "page_size",
        };
        ServiceError::invalid_input(field, err.to_string())
    })
}

fn song_fields(
    name: &str,
    group_name: &str,
    release_date: &str,
    text: &str,
    link: &str,
) -> ServiceResult<SongFields> {
    Ok(SongFields {
        name: name.to_string(),
        group_name: group_name.to_string(),
        release_date: parse_release_date(release_date)?,
        text: text.to_string(),
        link: link.to_string(),
    })
}

/// Logs a failed outcome once, with its kind and full cause chain.
fn observe<T>(op: &'static str, result: ServiceResult<T>) -> ServiceResult<T> {
    if let Err(err) = &result {
        let detail = sanitize_message(&error_chain(err), MAX_LOGGED_ERROR_CHARS);
        match err.kind() {
            ErrorKind::Internal => error!(
                "event={} module=catalog status=error error_kind=internal cancelled={} error={}",
                op,
                err.is_cancelled(),
                detail
            ),
            kind => warn!(
                "event={} module=catalog status=rejected error_kind={:?} signal=\"{}\" error={}",
                op,
                kind,
                kind.signal(),
                detail
            ),
        }
    }
    result
}

fn error_chain(err: &ServiceError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::{parse_release_date, parse_song_id, page_request, Pagination};
    use crate::service::error::ServiceError;
    use chrono::NaiveDate;

    #[test]
    fn parses_day_month_year_dates() {
        assert_eq!(
            parse_release_date("16.07.2006").unwrap(),
            NaiveDate::from_ymd_opt(2006, 7, 16).unwrap()
        );
    }

    #[test]
    fn rejects_other_date_layouts() {
        for value in ["2006-07-16", "31.02.2006", "16/07/2006", ""] {
            let err = parse_release_date(value).unwrap_err();
            assert!(
                matches!(err, ServiceError::InvalidInput { field: "release_date", .. }),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        let err = parse_song_id("not-a-uuid").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { field: "id", .. }));
    }

    #[test]
    fn names_the_bad_page_field() {
        let err = page_request(&Pagination {
            page_id: 1,
            page_size: 0,
        })
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { field: "page_size", .. }));

        let err = page_request(&Pagination {
            page_id: 0,
            page_size: 5,
        })
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { field: "page_id", .. }));
    }
}
