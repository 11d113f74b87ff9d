//! Song repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the catalog CRUD and lyric paging APIs over the `songs` table.
//! - Run every operation as one transaction on a pooled connection.
//!
//! # Invariants
//! - Write paths call `SongFields::validate()` before any SQL mutation.
//! - Commit happens only when the unit of work and the context are both
//!   clean; every other exit rolls back.
//! - A failed rollback is reported together with the error that caused it.
//! - A cancelled or expired context interrupts in-flight statements.

use crate::context::{Interrupted, OpContext};
use crate::db::{DbError, DbPool};
use crate::lyrics::paginate_verses;
use crate::model::page::PageRequest;
use crate::model::song::{Song, SongFields, SongId, SongValidationError};
use crate::repo::queries::SongQueries;
use log::{debug, error, warn};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// SQLite VM instructions between two cancellation checks.
const PROGRESS_CHECK_OPS: i32 = 1_000;

pub type RepoResult<T> = Result<T, RepoError>;

/// Key used for a lookup that found nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongLookup {
    Id(SongId),
    Title { group_name: String, name: String },
}

impl Display for SongLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Title { group_name, name } => {
                write!(f, "group `{group_name}` song `{name}`")
            }
        }
    }
}

/// Repository error for song persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(SongValidationError),
    Db(DbError),
    NotFound(SongLookup),
    /// `(name, group_name)` already belongs to a song.
    Conflict {
        name: String,
        group_name: String,
    },
    InvalidData(String),
    Cancelled(Interrupted),
    /// The transaction failed and rolling it back failed as well.
    Rollback {
        cause: Box<RepoError>,
        rollback: DbError,
    },
}

impl RepoError {
    /// Whether the operation stopped because its context was cancelled or
    /// expired.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled(_) => true,
            Self::Rollback { cause, .. } => cause.is_cancelled(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(lookup) => write!(f, "song not found: {lookup}"),
            Self::Conflict { name, group_name } => {
                write!(f, "song `{name}` by `{group_name}` already exists")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted song data: {message}"),
            Self::Cancelled(reason) => write!(f, "{reason}"),
            Self::Rollback { cause, rollback } => {
                write!(f, "tx err: {cause}, rollback err: {rollback}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Cancelled(reason) => Some(reason),
            Self::Rollback { cause, .. } => Some(cause.as_ref()),
            Self::NotFound(_) | Self::Conflict { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<SongValidationError> for RepoError {
    fn from(value: SongValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<Interrupted> for RepoError {
    fn from(value: Interrupted) -> Self {
        Self::Cancelled(value)
    }
}

/// Repository interface for the song catalog.
///
/// Every method is one atomic unit of work bounded by `ctx`.
pub trait SongRepository {
    /// Inserts a new song with a generated id.
    fn add_song(&self, ctx: &OpContext, fields: &SongFields) -> RepoResult<Song>;
    /// Exact match on group and song name.
    fn get_song(&self, ctx: &OpContext, group_name: &str, name: &str) -> RepoResult<Song>;
    /// One page of songs in insertion order; empty past the end.
    fn list_songs(&self, ctx: &OpContext, page: &PageRequest) -> RepoResult<Vec<Song>>;
    /// Replaces every mutable field of song `id`.
    fn update_song(&self, ctx: &OpContext, id: SongId, fields: &SongFields) -> RepoResult<Song>;
    fn delete_song(&self, ctx: &OpContext, id: SongId) -> RepoResult<()>;
    /// One page of verses from the lyrics of song `id`.
    fn get_song_lyrics(
        &self,
        ctx: &OpContext,
        id: SongId,
        page: &PageRequest,
    ) -> RepoResult<Vec<String>>;
}

#[derive(Debug, Clone, Copy)]
enum TxMode {
    Read,
    Write,
}

impl TxMode {
    fn behavior(self) -> TransactionBehavior {
        match self {
            Self::Read => TransactionBehavior::Deferred,
            Self::Write => TransactionBehavior::Immediate,
        }
    }
}

/// SQLite-backed song repository over a shared connection pool.
#[derive(Clone)]
pub struct SqliteSongRepository {
    pool: DbPool,
}

impl SqliteSongRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Runs `work` inside one transaction on a pooled connection.
    ///
    /// The context is checked before checkout, watched by a SQLite progress
    /// handler while `work` runs, and checked again before commit.
    fn exec_tx<T, F>(&self, ctx: &OpContext, op: &'static str, mode: TxMode, work: F) -> RepoResult<T>
    where
        F: FnOnce(&SongQueries<'_>) -> RepoResult<T>,
    {
        let started_at = Instant::now();
        let result = self
            .checkout_and_run(ctx, mode, work)
            .map_err(|err| attribute_interruption(err, ctx));

        match &result {
            Ok(_) => debug!(
                "event=song_tx module=repo status=ok op={} duration_ms={}",
                op,
                started_at.elapsed().as_millis()
            ),
            Err(err) if err.is_cancelled() => warn!(
                "event=song_tx module=repo status=cancelled op={} duration_ms={} reason={}",
                op,
                started_at.elapsed().as_millis(),
                err
            ),
            Err(err) => debug!(
                "event=song_tx module=repo status=rolled_back op={} duration_ms={} error={}",
                op,
                started_at.elapsed().as_millis(),
                err
            ),
        }

        result
    }

    fn checkout_and_run<T, F>(&self, ctx: &OpContext, mode: TxMode, work: F) -> RepoResult<T>
    where
        F: FnOnce(&SongQueries<'_>) -> RepoResult<T>,
    {
        ctx.check()?;
        let checkout = match ctx.remaining() {
            Some(remaining) => self.pool.get_timeout(remaining),
            None => self.pool.get(),
        };
        let mut conn = checkout.map_err(DbError::from)?;

        // Progress handlers do not run during busy waits, so the lock wait is
        // bounded by the deadline separately.
        let pool_busy_timeout = current_busy_timeout(&conn)?;
        conn.busy_timeout(busy_wait_for(ctx, pool_busy_timeout))?;

        let watcher = ctx.clone();
        conn.progress_handler(PROGRESS_CHECK_OPS, Some(move || watcher.is_done()));
        let result = run_in_tx(&mut conn, ctx, mode, work);
        conn.progress_handler(0, None::<fn() -> bool>);

        match conn.busy_timeout(pool_busy_timeout) {
            Ok(()) => result,
            Err(restore_err) => {
                error!(
                    "event=song_tx module=repo status=error error_code=busy_timeout_restore_failed error={}",
                    restore_err
                );
                result.and(Err(restore_err.into()))
            }
        }
    }
}

fn current_busy_timeout(conn: &Connection) -> RepoResult<Duration> {
    let millis = conn.query_row("PRAGMA busy_timeout;", [], |row| row.get::<_, u64>(0))?;
    Ok(Duration::from_millis(millis))
}

/// Lock wait allowed for one operation: the pool setting, capped by the time
/// left on `ctx`. Rounded up to the next millisecond so the wait never ends
/// before the deadline.
fn busy_wait_for(ctx: &OpContext, pool_busy_timeout: Duration) -> Duration {
    match ctx.remaining() {
        Some(remaining) if remaining < pool_busy_timeout => {
            let millis = remaining.as_millis().saturating_add(1);
            Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
        }
        _ => pool_busy_timeout,
    }
}

fn run_in_tx<T, F>(conn: &mut Connection, ctx: &OpContext, mode: TxMode, work: F) -> RepoResult<T>
where
    F: FnOnce(&SongQueries<'_>) -> RepoResult<T>,
{
    let tx = conn.transaction_with_behavior(mode.behavior())?;
    let outcome = work(&SongQueries::new(&tx)).and_then(|value| {
        ctx.check()?;
        Ok(value)
    });

    // COMMIT and ROLLBACK must not be interrupted.
    tx.progress_handler(0, None::<fn() -> bool>);

    match outcome {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => Err(rollback(tx, err)),
    }
}

fn rollback(tx: Transaction<'_>, cause: RepoError) -> RepoError {
    // SQLite already rolled back, e.g. after an interrupted write.
    if tx.is_autocommit() {
        return cause;
    }

    match tx.rollback() {
        Ok(()) => cause,
        Err(rollback_err) => {
            error!(
                "event=song_tx module=repo status=error error_code=rollback_failed cause={} error={}",
                cause, rollback_err
            );
            RepoError::Rollback {
                cause: Box::new(cause),
                rollback: DbError::Sqlite(rollback_err),
            }
        }
    }
}

/// Reports storage failures caused by the context as `Cancelled`.
fn attribute_interruption(err: RepoError, ctx: &OpContext) -> RepoError {
    let interrupted_by_ctx = match &err {
        RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(inner, _))) => matches!(
            inner.code,
            ErrorCode::OperationInterrupted | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ),
        RepoError::Db(DbError::Pool(_)) => true,
        _ => false,
    };

    match ctx.interrupted() {
        Some(reason) if interrupted_by_ctx => RepoError::Cancelled(reason),
        _ => err,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn map_write_error(err: rusqlite::Error, song: &Song) -> RepoError {
    if is_unique_violation(&err) {
        RepoError::Conflict {
            name: song.name.clone(),
            group_name: song.group_name.clone(),
        }
    } else {
        err.into()
    }
}

fn read_back(queries: &SongQueries<'_>, id: SongId) -> RepoResult<Song> {
    queries
        .find_by_id(id)?
        .ok_or_else(|| RepoError::InvalidData(format!("song {id} missing on read-back")))
}

impl SongRepository for SqliteSongRepository {
    fn add_song(&self, ctx: &OpContext, fields: &SongFields) -> RepoResult<Song> {
        fields.validate()?;
        let song = Song::new(fields.clone());

        self.exec_tx(ctx, "song_add", TxMode::Write, |queries| {
            queries
                .insert_song(&song)
                .map_err(|err| map_write_error(err, &song))?;
            read_back(queries, song.id)
        })
    }

    fn get_song(&self, ctx: &OpContext, group_name: &str, name: &str) -> RepoResult<Song> {
        self.exec_tx(ctx, "song_get", TxMode::Read, |queries| {
            queries
                .find_by_title(group_name, name)?
                .ok_or_else(|| {
                    RepoError::NotFound(SongLookup::Title {
                        group_name: group_name.to_string(),
                        name: name.to_string(),
                    })
                })
        })
    }

    fn list_songs(&self, ctx: &OpContext, page: &PageRequest) -> RepoResult<Vec<Song>> {
        self.exec_tx(ctx, "song_list", TxMode::Read, |queries| {
            queries.list_page(page.limit(), page.offset())
        })
    }

    fn update_song(&self, ctx: &OpContext, id: SongId, fields: &SongFields) -> RepoResult<Song> {
        fields.validate()?;
        let song = Song::with_id(id, fields.clone());

        self.exec_tx(ctx, "song_update", TxMode::Write, |queries| {
            let changed = queries
                .update_song(&song)
                .map_err(|err| map_write_error(err, &song))?;
            if changed == 0 {
                return Err(RepoError::NotFound(SongLookup::Id(id)));
            }
            read_back(queries, id)
        })
    }

    fn delete_song(&self, ctx: &OpContext, id: SongId) -> RepoResult<()> {
        self.exec_tx(ctx, "song_delete", TxMode::Write, |queries| {
            if queries.delete_song(id)? == 0 {
                return Err(RepoError::NotFound(SongLookup::Id(id)));
            }
            Ok(())
        })
    }

    fn get_song_lyrics(
        &self,
        ctx: &OpContext,
        id: SongId,
        page: &PageRequest,
    ) -> RepoResult<Vec<String>> {
        self.exec_tx(ctx, "song_lyrics", TxMode::Read, |queries| {
            let text = queries
                .find_text(id)?
                .ok_or(RepoError::NotFound(SongLookup::Id(id)))?;
            Ok(paginate_verses(&text, page))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        attribute_interruption, busy_wait_for, RepoError, SongLookup, SongRepository,
        SqliteSongRepository, TxMode,
    };
    use crate::context::{Interrupted, OpContext};
    use crate::db::{open_pool_in_memory, DbError};
    use crate::model::page::PageRequest;
    use crate::model::song::{Song, SongFields};
    use chrono::NaiveDate;
    use rusqlite::ffi;
    use std::time::{Duration, Instant};
    use uuid::Uuid;

    const ENDLESS_COUNT_SQL: &str = "WITH RECURSIVE counter(n) AS (
        SELECT 1 UNION ALL SELECT n + 1 FROM counter
    ) SELECT count(*) FROM counter;";

    fn song(name: &str) -> Song {
        Song::new(SongFields {
            name: name.to_string(),
            group_name: "Muse".to_string(),
            release_date: NaiveDate::from_ymd_opt(2003, 12, 1).unwrap(),
            text: String::new(),
            link: String::new(),
        })
    }

    fn count_songs(repo: &SqliteSongRepository) -> usize {
        repo.list_songs(&OpContext::background(), &PageRequest::new(1, 100).unwrap())
            .unwrap()
            .len()
    }

    fn interrupt_error() -> RepoError {
        RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_INTERRUPT),
            None,
        )))
    }

    #[test]
    fn interrupt_on_done_context_becomes_cancelled() {
        let ctx = OpContext::background();
        ctx.cancel();
        let err = attribute_interruption(interrupt_error(), &ctx);
        assert!(matches!(err, RepoError::Cancelled(Interrupted::Cancelled)));
    }

    #[test]
    fn interrupt_on_live_context_stays_storage_error() {
        let err = attribute_interruption(interrupt_error(), &OpContext::background());
        assert!(matches!(err, RepoError::Db(_)));
    }

    #[test]
    fn domain_errors_are_never_reattributed() {
        let ctx = OpContext::background();
        ctx.cancel();
        let id = Uuid::new_v4();
        let err = attribute_interruption(RepoError::NotFound(SongLookup::Id(id)), &ctx);
        assert!(matches!(err, RepoError::NotFound(SongLookup::Id(found)) if found == id));
    }

    #[test]
    fn rollback_error_reports_cancellation_of_its_cause() {
        let err = RepoError::Rollback {
            cause: Box::new(RepoError::Cancelled(Interrupted::DeadlineExceeded)),
            rollback: DbError::Sqlite(rusqlite::Error::InvalidQuery),
        };
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("deadline exceeded"));
    }

    #[test]
    fn cancel_during_work_rolls_back_the_write() {
        let repo = SqliteSongRepository::new(open_pool_in_memory().unwrap());
        let ctx = OpContext::background();

        let err = repo
            .exec_tx(&ctx, "test_insert", TxMode::Write, |queries| {
                queries.insert_song(&song("Hysteria"))?;
                ctx.cancel();
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, RepoError::Cancelled(Interrupted::Cancelled)));
        assert_eq!(count_songs(&repo), 0);
    }

    #[test]
    fn failed_work_rolls_back_earlier_statements() {
        let repo = SqliteSongRepository::new(open_pool_in_memory().unwrap());
        let ctx = OpContext::background();

        let err = repo
            .exec_tx(&ctx, "test_insert", TxMode::Write, |queries| {
                queries.insert_song(&song("Hysteria"))?;
                Err::<(), _>(RepoError::InvalidData("abort".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, RepoError::InvalidData(_)));
        assert_eq!(count_songs(&repo), 0);
    }

    #[test]
    fn clean_work_commits() {
        let repo = SqliteSongRepository::new(open_pool_in_memory().unwrap());
        let ctx = OpContext::background();

        repo.exec_tx(&ctx, "test_insert", TxMode::Write, |queries| {
            queries.insert_song(&song("Hysteria"))?;
            queries.insert_song(&song("Uprising"))?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count_songs(&repo), 2);
    }

    #[test]
    fn busy_on_done_context_becomes_cancelled() {
        let ctx = OpContext::background().child_with_deadline(Instant::now());
        for code in [ffi::SQLITE_BUSY, ffi::SQLITE_LOCKED] {
            let busy = RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
                ffi::Error::new(code),
                None,
            )));
            let err = attribute_interruption(busy, &ctx);
            assert!(matches!(err, RepoError::Cancelled(Interrupted::DeadlineExceeded)));
        }
    }

    #[test]
    fn busy_wait_is_capped_by_the_deadline() {
        let pool_setting = Duration::from_secs(5);
        assert_eq!(busy_wait_for(&OpContext::background(), pool_setting), pool_setting);

        let short = OpContext::with_timeout(Duration::from_millis(100));
        let wait = busy_wait_for(&short, pool_setting);
        assert!(wait <= Duration::from_millis(101));

        let long = OpContext::with_timeout(Duration::from_secs(60));
        assert_eq!(busy_wait_for(&long, pool_setting), pool_setting);
    }

    #[test]
    fn deadline_interrupts_a_running_statement_and_rolls_back() {
        let pool = open_pool_in_memory().unwrap();
        let repo = SqliteSongRepository::new(pool.clone());
        let ctx = OpContext::with_timeout(Duration::from_millis(100));

        let started_at = Instant::now();
        let err = repo
            .exec_tx(&ctx, "test_slow_query", TxMode::Write, |queries| {
                queries.insert_song(&song("Hysteria"))?;
                let count = queries
                    .connection()
                    .query_row(ENDLESS_COUNT_SQL, [], |row| row.get::<_, i64>(0))?;
                Ok(count)
            })
            .unwrap_err();

        assert!(matches!(err, RepoError::Cancelled(Interrupted::DeadlineExceeded)));
        assert!(started_at.elapsed() < Duration::from_secs(2));
        assert_eq!(count_songs(&repo), 0);

        // The handler is gone once the connection is back in the pool.
        let conn = pool.get().unwrap();
        let counted: i64 = conn
            .query_row(
                "WITH RECURSIVE counter(n) AS (
                    SELECT 1 UNION ALL SELECT n + 1 FROM counter WHERE n < 200000
                ) SELECT count(*) FROM counter;",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(counted, 200_000);
    }
}
