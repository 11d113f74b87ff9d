use chrono::NaiveDate;
use songbook_core::db::open_pool_in_memory;
use songbook_core::lyrics::{join_verses, split_verses};
use songbook_core::{OpContext, PageRequest, SongFields, SongRepository, SqliteSongRepository};

const LYRICS: &str = "Verse one line A\nVerse one line B\n\nVerse two\n\n\nVerse three";

fn repo_with_song(text: &str) -> (SqliteSongRepository, uuid::Uuid) {
    let repo = SqliteSongRepository::new(open_pool_in_memory().unwrap());
    let song = repo
        .add_song(
            &OpContext::background(),
            &SongFields {
                name: "Three Verses".to_string(),
                group_name: "Fixture Band".to_string(),
                release_date: NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
                text: text.to_string(),
                link: String::new(),
            },
        )
        .unwrap();
    (repo, song.id)
}

fn lyrics_page(repo: &SqliteSongRepository, id: uuid::Uuid, page: i64, size: i64) -> Vec<String> {
    repo.get_song_lyrics(
        &OpContext::background(),
        id,
        &PageRequest::new(page, size).unwrap(),
    )
    .unwrap()
}

#[test]
fn stored_lyrics_page_through_verses() {
    let (repo, id) = repo_with_song(LYRICS);

    assert_eq!(
        lyrics_page(&repo, id, 1, 2),
        vec!["Verse one line A\nVerse one line B", "Verse two"]
    );
    assert_eq!(lyrics_page(&repo, id, 2, 2), vec!["Verse three"]);
}

#[test]
fn page_past_the_last_verse_is_empty() {
    let (repo, id) = repo_with_song(LYRICS);

    assert!(lyrics_page(&repo, id, 3, 2).is_empty());
    assert!(lyrics_page(&repo, id, 100, 1).is_empty());
}

#[test]
fn song_without_lyrics_has_no_verses() {
    let (repo, id) = repo_with_song("");

    assert!(lyrics_page(&repo, id, 1, 10).is_empty());
}

#[test]
fn all_pages_together_rebuild_the_lyrics() {
    let text = "\nintro\n\n\nverse a1\nverse a2\n  \nchorus\n\nverse b\n\noutro\n\n";
    let (repo, id) = repo_with_song(text);

    let mut collected = Vec::new();
    for page in 1.. {
        let verses = lyrics_page(&repo, id, page, 2);
        if verses.is_empty() {
            break;
        }
        collected.extend(verses);
    }

    assert_eq!(collected, split_verses(text));
    assert_eq!(split_verses(&join_verses(&collected)), split_verses(text));
}
