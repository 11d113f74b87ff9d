use chrono::NaiveDate;
use songbook_core::db::open_pool;
use songbook_core::db::open_pool_in_memory;
use songbook_core::{
    AddSongRequest, CatalogService, DatabaseConfig, Interrupted, OpContext, PageRequest,
    RepoError, SongFields, SongRepository, SqliteSongRepository,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn fields(name: &str) -> SongFields {
    SongFields {
        name: name.to_string(),
        group_name: "Muse".to_string(),
        release_date: NaiveDate::from_ymd_opt(2003, 12, 1).unwrap(),
        text: String::new(),
        link: String::new(),
    }
}

fn count(repo: &SqliteSongRepository) -> usize {
    repo.list_songs(&OpContext::background(), &PageRequest::new(1, 1_000).unwrap())
        .unwrap()
        .len()
}

fn file_repo(dir: &tempfile::TempDir, pool_size: u32) -> SqliteSongRepository {
    let config = DatabaseConfig {
        path: dir.path().join("songbook.sqlite3"),
        pool_size,
        ..DatabaseConfig::default()
    };
    SqliteSongRepository::new(open_pool(&config).unwrap())
}

#[test]
fn cancelled_context_fails_and_writes_nothing() {
    let repo = SqliteSongRepository::new(open_pool_in_memory().unwrap());
    let ctx = OpContext::background();
    ctx.cancel();

    let err = repo.add_song(&ctx, &fields("Hysteria")).unwrap_err();

    assert!(err.is_cancelled());
    assert!(matches!(err, RepoError::Cancelled(Interrupted::Cancelled)));
    assert_eq!(count(&repo), 0);
}

#[test]
fn expired_deadline_fails_reads_and_writes() {
    let repo = SqliteSongRepository::new(open_pool_in_memory().unwrap());
    let ctx = OpContext::background().child_with_deadline(Instant::now());

    let err = repo.add_song(&ctx, &fields("Hysteria")).unwrap_err();
    assert!(matches!(err, RepoError::Cancelled(Interrupted::DeadlineExceeded)));

    let err = repo.get_song(&ctx, "Muse", "Hysteria").unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(count(&repo), 0);
}

#[test]
fn deadline_bounds_the_wait_for_a_pooled_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("busy.sqlite3"),
        pool_size: 1,
        ..DatabaseConfig::default()
    };
    let pool = open_pool(&config).unwrap();
    let repo = SqliteSongRepository::new(pool.clone());
    let held = pool.get().unwrap();

    let started_at = Instant::now();
    let err = repo
        .add_song(
            &OpContext::with_timeout(Duration::from_millis(100)),
            &fields("Hysteria"),
        )
        .unwrap_err();

    assert!(matches!(err, RepoError::Cancelled(Interrupted::DeadlineExceeded)));
    assert!(started_at.elapsed() < config.connection_timeout());
    drop(held);
    assert_eq!(count(&repo), 0);
}

#[test]
fn deadline_bounds_the_wait_for_the_write_lock() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("locked.sqlite3"),
        pool_size: 2,
        ..DatabaseConfig::default()
    };
    let pool = open_pool(&config).unwrap();
    let repo = SqliteSongRepository::new(pool.clone());
    let writer = pool.get().unwrap();
    writer.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let started_at = Instant::now();
    let err = repo
        .add_song(
            &OpContext::with_timeout(Duration::from_millis(100)),
            &fields("Hysteria"),
        )
        .unwrap_err();

    assert!(matches!(err, RepoError::Cancelled(Interrupted::DeadlineExceeded)));
    assert!(started_at.elapsed() < Duration::from_secs(1));

    writer.execute_batch("ROLLBACK;").unwrap();
    drop(writer);
    assert_eq!(count(&repo), 0);
    repo.add_song(&OpContext::background(), &fields("Hysteria"))
        .unwrap();
}

#[test]
fn service_reports_cancellation_as_internal() {
    let service = CatalogService::new(SqliteSongRepository::new(open_pool_in_memory().unwrap()));
    let ctx = OpContext::background();
    ctx.cancel();

    let err = service
        .add_song(
            &ctx,
            &AddSongRequest {
                name: "Hysteria".to_string(),
                group_name: "Muse".to_string(),
                release_date: "01.12.2003".to_string(),
                text: String::new(),
                link: String::new(),
            },
        )
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.to_response().error, "internal error");
}

#[test]
fn concurrent_adds_of_distinct_songs_all_commit() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(file_repo(&dir, 4));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for index in 0..5 {
                    repo.add_song(
                        &OpContext::background(),
                        &fields(&format!("song-{worker}-{index}")),
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(count(&repo), 40);
}

#[test]
fn concurrent_adds_of_one_title_admit_exactly_one() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(file_repo(&dir, 4));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || repo.add_song(&OpContext::background(), &fields("Hysteria")))
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let committed = results.iter().filter(|result| result.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|result| matches!(result, Err(RepoError::Conflict { .. })))
        .count();
    assert_eq!(committed, 1);
    assert_eq!(conflicts, 5);
    assert_eq!(count(&repo), 1);
}
