//! Statement-level access to the `songs` table.
//!
//! # Responsibility
//! - Hold the SQL for every catalog statement in one place.
//! - Run against whatever connection it is bound to, normally an open
//!   transaction owned by `SqliteSongRepository`.
//!
//! # Invariants
//! - Read paths reject invalid persisted rows instead of masking them.
//! - List order is insertion order (`seq ASC`) and stable across updates.

use crate::model::song::{Song, SongFields, SongId};
use crate::repo::song_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const SONG_SELECT_SQL: &str = "SELECT
    id,
    name,
    group_name,
    release_date,
    text,
    link
FROM songs";

/// Query executor bound to one connection or transaction.
pub struct SongQueries<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SongQueries<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Inserts one row. Fails with a SQLite constraint error on a duplicate
    /// `(name, group_name)`.
    pub fn insert_song(&self, song: &Song) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO songs (
                id,
                name,
                group_name,
                release_date,
                text,
                link
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                song.id.to_string(),
                song.name.as_str(),
                song.group_name.as_str(),
                song.release_date,
                song.text.as_str(),
                song.link.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, id: SongId) -> RepoResult<Option<Song>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{SONG_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_song_row(row)?)),
            None => Ok(None),
        }
    }

    /// Exact-match lookup on the unique `(group_name, name)` pair.
    pub fn find_by_title(&self, group_name: &str, name: &str) -> RepoResult<Option<Song>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SONG_SELECT_SQL} WHERE group_name = ?1 AND name = ?2;"
        ))?;
        let mut rows = stmt.query(params![group_name, name])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_song_row(row)?)),
            None => Ok(None),
        }
    }

    /// Returns up to `limit` rows after skipping `offset`, in insertion order.
    pub fn list_page(&self, limit: u32, offset: u64) -> RepoResult<Vec<Song>> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SONG_SELECT_SQL} ORDER BY seq ASC LIMIT ?1 OFFSET ?2;"
        ))?;
        let mut rows = stmt.query(params![i64::from(limit), offset])?;
        let mut songs = Vec::new();

        while let Some(row) = rows.next()? {
            songs.push(parse_song_row(row)?);
        }

        Ok(songs)
    }

    /// Replaces every mutable column. Returns the number of rows changed.
    pub fn update_song(&self, song: &Song) -> rusqlite::Result<usize> {
        self.conn.execute(
            "UPDATE songs
             SET
                name = ?1,
                group_name = ?2,
                release_date = ?3,
                text = ?4,
                link = ?5,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?6;",
            params![
                song.name.as_str(),
                song.group_name.as_str(),
                song.release_date,
                song.text.as_str(),
                song.link.as_str(),
                song.id.to_string(),
            ],
        )
    }

    /// Returns the number of rows removed.
    pub fn delete_song(&self, id: SongId) -> rusqlite::Result<usize> {
        self.conn
            .execute("DELETE FROM songs WHERE id = ?1;", [id.to_string()])
    }

    /// Loads only the lyric text of one song.
    pub fn find_text(&self, id: SongId) -> RepoResult<Option<String>> {
        let text = self
            .conn
            .query_row(
                "SELECT text FROM songs WHERE id = ?1;",
                [id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(text)
    }
}

fn parse_song_row(row: &Row<'_>) -> RepoResult<Song> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in songs.id"))
    })?;

    let fields = SongFields {
        name: row.get("name")?,
        group_name: row.get("group_name")?,
        release_date: row.get("release_date")?,
        text: row.get("text")?,
        link: row.get("link")?,
    };
    fields
        .validate()
        .map_err(|err| RepoError::InvalidData(format!("{err} (songs.id `{id}`)")))?;

    Ok(Song::with_id(id, fields))
}
