mod support;

use chrono::{Duration, Utc};
use common::Language;
use newsdigest::entry::{fingerprint, StoredEntry};
use newsdigest::store::{EntryStore, SqliteStore};
use support::memory_pool;

fn stored(title: &str, link: &str, rating: f64, age: Duration) -> StoredEntry {
    let now = Utc::now();
    StoredEntry {
        title: title.into(),
        link: link.into(),
        summary: format!("{} summary", title),
        source_name: "Hacker News".into(),
        language: Language::En,
        published_at: now - age,
        published_fallback: false,
        parsed_at: now,
        rating,
        fingerprint: fingerprint(title, link, &format!("{} summary", title)),
    }
}

#[tokio::test]
async fn duplicate_fingerprint_is_reported_not_raised() {
    let store = SqliteStore::new(memory_pool().await);
    let entry = stored("Rust 2.0", "https://example.com/rust", 7.5, Duration::hours(1));

    let first = store.insert_if_new(&entry).await.expect("first insert");
    let second = store.insert_if_new(&entry).await.expect("second insert");

    assert!(first.inserted);
    assert!(!second.inserted);
    assert_eq!(first.id, second.id);
    assert_eq!(store.count().await.expect("count"), 1);
}

#[tokio::test]
async fn duplicate_link_or_title_is_not_inserted() {
    let store = SqliteStore::new(memory_pool().await);
    let original = stored("Rust 2.0", "https://example.com/rust", 7.5, Duration::hours(1));
    assert!(store.insert_if_new(&original).await.expect("insert").inserted);

    // Same link, different title
    let relinked = stored("Rust 2.0 is out", "https://example.com/rust", 6.0, Duration::hours(1));
    let outcome = store.insert_if_new(&relinked).await.expect("insert");
    assert!(!outcome.inserted);

    // Same title, different link
    let retitled = stored("Rust 2.0", "https://mirror.example.com/rust", 6.0, Duration::hours(1));
    assert!(!store.insert_if_new(&retitled).await.expect("insert").inserted);

    assert_eq!(store.count().await.expect("count"), 1);
}

#[tokio::test]
async fn concurrent_inserts_of_same_entry_yield_one_winner() {
    let store = SqliteStore::new(memory_pool().await);
    let entry = stored("Only once", "https://example.com/once", 5.0, Duration::minutes(5));

    let (a, b) = tokio::join!(store.insert_if_new(&entry), store.insert_if_new(&entry));
    let (a, b) = (a.expect("insert a"), b.expect("insert b"));

    assert_eq!([a.inserted, b.inserted].iter().filter(|x| **x).count(), 1);
    assert_eq!(a.id, b.id);
    assert_eq!(store.count().await.expect("count"), 1);
}

#[tokio::test]
async fn top_by_rating_orders_by_rating_then_recency() {
    let store = SqliteStore::new(memory_pool().await);
    for e in [
        stored("Low", "https://example.com/low", 2.0, Duration::hours(1)),
        stored("High old", "https://example.com/high-old", 8.0, Duration::hours(5)),
        stored("High new", "https://example.com/high-new", 8.0, Duration::hours(2)),
        stored("Mid", "https://example.com/mid", 5.0, Duration::hours(1)),
    ] {
        store.insert_if_new(&e).await.expect("insert");
    }

    let top = store.top_by_rating(3).await.expect("top");
    let titles: Vec<_> = top.iter().map(|r| r.entry.title.as_str()).collect();
    assert_eq!(titles, vec!["High new", "High old", "Mid"]);
    assert_eq!(top[0].entry.language, Language::En);
}

#[tokio::test]
async fn time_window_excludes_older_entries() {
    let store = SqliteStore::new(memory_pool().await);
    store
        .insert_if_new(&stored("Fresh", "https://example.com/fresh", 3.0, Duration::hours(2)))
        .await
        .expect("insert");
    store
        .insert_if_new(&stored("Stale", "https://example.com/stale", 9.0, Duration::days(3)))
        .await
        .expect("insert");

    let window = store
        .by_time_window(Utc::now() - Duration::hours(24), 10)
        .await
        .expect("window");
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].entry.title, "Fresh");
}

#[tokio::test]
async fn stored_fields_survive_the_round_trip() {
    let store = SqliteStore::new(memory_pool().await);
    let mut entry = stored("Новости Rust", "https://habr.com/ru/news/1", 6.25, Duration::hours(3));
    entry.language = Language::Ru;
    entry.source_name = "Habr".into();
    entry.published_fallback = true;
    store.insert_if_new(&entry).await.expect("insert");

    let back = store.top_by_rating(1).await.expect("top").remove(0);
    assert_eq!(back.entry.title, entry.title);
    assert_eq!(back.entry.language, Language::Ru);
    assert_eq!(back.entry.source_name, "Habr");
    assert_eq!(back.entry.fingerprint, entry.fingerprint);
    assert_eq!(back.entry.rating, 6.25);
    assert!(back.entry.published_fallback);
    assert_eq!(back.entry.published_at.timestamp(), entry.published_at.timestamp());
}

#[tokio::test]
async fn purge_removes_everything() {
    let store = SqliteStore::new(memory_pool().await);
    for i in 0..3 {
        store
            .insert_if_new(&stored(&format!("Item {}", i), &format!("https://example.com/{}", i), 1.0, Duration::hours(1)))
            .await
            .expect("insert");
    }
    assert_eq!(store.count().await.expect("count"), 3);

    assert_eq!(store.purge().await.expect("purge"), 3);
    assert_eq!(store.count().await.expect("count"), 0);
    assert!(store.top_by_rating(10).await.expect("top").is_empty());
}
