//! Ledger durability and idempotency behavior.

use tempfile::TempDir;

use ripstream::{
    client::{MediaKind, Source},
    config::DatabaseConfig,
    db::Ledger,
};

fn db_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        downloads_enabled: true,
        failed_downloads_enabled: true,
        downloads_path: Some(dir.path().join("downloads.db")),
        failed_downloads_path: Some(dir.path().join("failed.db")),
        releases_path: Some(dir.path().join("releases.db")),
    }
}

#[tokio::test]
async fn downloads_are_namespaced_by_source() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(&db_config(&dir)).await.unwrap();

    ledger.mark_downloaded(Source::Deezer, "42").await.unwrap();

    assert!(ledger.downloaded(Source::Deezer, "42").await.unwrap());
    // The same integer id on another provider is a different track.
    assert!(!ledger.downloaded(Source::Qobuz, "42").await.unwrap());
    assert!(!ledger.downloaded(Source::Deezer, "43").await.unwrap());
}

#[tokio::test]
async fn marks_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(&db_config(&dir)).await.unwrap();

    for _ in 0..3 {
        ledger.mark_downloaded(Source::Tidal, "7").await.unwrap();
        ledger
            .mark_release_complete(Source::Tidal, MediaKind::Album, "a", 12)
            .await
            .unwrap();
    }

    assert!(ledger.downloaded(Source::Tidal, "7").await.unwrap());
    assert_eq!(
        ledger
            .release_complete(Source::Tidal, MediaKind::Album, "a")
            .await
            .unwrap(),
        Some(12)
    );
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = db_config(&dir);

    {
        let ledger = Ledger::open(&config).await.unwrap();
        ledger.mark_downloaded(Source::Qobuz, "1").await.unwrap();
        ledger
            .mark_failed(Source::Qobuz, MediaKind::Track, "2", Some("not streamable"))
            .await
            .unwrap();
        ledger
            .mark_release_complete(Source::Qobuz, MediaKind::Artist, "art", 4)
            .await
            .unwrap();
    }

    let ledger = Ledger::open(&config).await.unwrap();
    assert!(ledger.downloaded(Source::Qobuz, "1").await.unwrap());
    assert!(ledger
        .failed(Source::Qobuz, MediaKind::Track, "2")
        .await
        .unwrap());
    assert_eq!(
        ledger
            .release_complete(Source::Qobuz, MediaKind::Artist, "art")
            .await
            .unwrap(),
        Some(4)
    );
}

#[tokio::test]
async fn releases_distinguish_media_kinds() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open(&db_config(&dir)).await.unwrap();

    ledger
        .mark_release_complete(Source::Deezer, MediaKind::Album, "x", 10)
        .await
        .unwrap();

    assert!(ledger
        .release_complete(Source::Deezer, MediaKind::Artist, "x")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn dummy_ledger_records_nothing() {
    let ledger = Ledger::dummy();

    ledger.mark_downloaded(Source::Deezer, "1").await.unwrap();
    ledger
        .mark_failed(Source::Deezer, MediaKind::Track, "1", None)
        .await
        .unwrap();

    assert!(!ledger.downloaded(Source::Deezer, "1").await.unwrap());
    assert!(!ledger
        .failed(Source::Deezer, MediaKind::Track, "1")
        .await
        .unwrap());
}

#[tokio::test]
async fn disabled_tables_answer_false() {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        downloads_enabled: false,
        failed_downloads_enabled: false,
        downloads_path: Some(dir.path().join("downloads.db")),
        failed_downloads_path: Some(dir.path().join("failed.db")),
        releases_path: Some(dir.path().join("releases.db")),
    };

    let ledger = Ledger::open(&config).await.unwrap();
    ledger.mark_downloaded(Source::Deezer, "1").await.unwrap();
    assert!(!ledger.downloaded(Source::Deezer, "1").await.unwrap());
    // No database files should have been created.
    assert!(!dir.path().join("downloads.db").exists());
}
