//! End-to-end pipeline scenarios against a scripted provider.

mod common;

use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::{deezer_album, deezer_track, qobuz_album, qobuz_track, test_config, MockClient};
use ripstream::{
    client::{MediaKind, Source},
    db::Ledger,
    metadata::Quality,
    session::Session,
};

#[tokio::test]
async fn album_download_cold_ledger() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let mock = Arc::new(MockClient::new(Source::Qobuz));
    mock.put(
        MediaKind::Album,
        "100",
        qobuz_album(100, "Discovery", "Daft Punk", &[1, 2, 3]),
    );
    mock.put(MediaKind::Track, "1", qobuz_track(1, "One More Time", "Daft Punk", 1));
    mock.put(MediaKind::Track, "2", qobuz_track(2, "Aerodynamic", "Daft Punk", 2));
    mock.put(MediaKind::Track, "3", qobuz_track(3, "Digital Love", "Daft Punk", 3));

    let mut session = Session::new(config.clone(), CancellationToken::new())
        .await
        .unwrap();
    session.register_client(mock.clone());
    session
        .add_by_id(Source::Qobuz, MediaKind::Album, "100")
        .await
        .unwrap();
    session.process_pending().await;
    session.finish().await;

    // Three tagged files under {folder}/{albumartist} - {title} ({year}).
    let album_dir = config
        .downloads
        .folder
        .join("Daft Punk - Discovery (2001)");
    assert!(album_dir.is_dir(), "missing {}", album_dir.display());
    let files: Vec<_> = std::fs::read_dir(&album_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == "mp3")
        })
        .collect();
    assert_eq!(files.len(), 3);

    // Three downloaded rows and one release row.
    let ledger = Ledger::open(&config.database).await.unwrap();
    for id in ["1", "2", "3"] {
        assert!(ledger.downloaded(Source::Qobuz, id).await.unwrap());
    }
    assert_eq!(
        ledger
            .release_complete(Source::Qobuz, MediaKind::Album, "100")
            .await
            .unwrap(),
        Some(3)
    );
}

#[tokio::test]
async fn album_download_warm_ledger_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    // First run fills the ledger.
    let mock = Arc::new(MockClient::new(Source::Qobuz));
    mock.put(
        MediaKind::Album,
        "100",
        qobuz_album(100, "Vespertine", "Björk", &[1, 2]),
    );
    mock.put(MediaKind::Track, "1", qobuz_track(1, "Hidden Place", "Björk", 1));
    mock.put(MediaKind::Track, "2", qobuz_track(2, "Cocoon", "Björk", 2));

    let mut session = Session::new(config.clone(), CancellationToken::new())
        .await
        .unwrap();
    session.register_client(mock.clone());
    session
        .add_by_id(Source::Qobuz, MediaKind::Album, "100")
        .await
        .unwrap();
    session.process_pending().await;
    session.finish().await;
    assert_eq!(mock.download_call_count(), 2);

    // Second run over the same reference: no metadata fetch, no bytes.
    let mock2 = Arc::new(MockClient::new(Source::Qobuz));
    mock2.put(
        MediaKind::Album,
        "100",
        qobuz_album(100, "Vespertine", "Björk", &[1, 2]),
    );

    let mut session = Session::new(config.clone(), CancellationToken::new())
        .await
        .unwrap();
    session.register_client(mock2.clone());
    session
        .add_by_id(Source::Qobuz, MediaKind::Album, "100")
        .await
        .unwrap();
    session.process_pending().await;
    session.finish().await;

    assert_eq!(mock2.metadata_call_count(), 0);
    assert_eq!(mock2.download_call_count(), 0);
}

#[tokio::test]
async fn quality_refused_without_fallback_records_failure() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.qobuz.quality = Quality::HiRes;
    config.qobuz.lower_quality_if_not_available = false;

    // A 16-bit album advertises CD quality, below the hi-res request.
    let mock = Arc::new(MockClient::new(Source::Qobuz));
    mock.put(
        MediaKind::Album,
        "200",
        qobuz_album(200, "Homogenic", "Björk", &[9]),
    );
    mock.put(MediaKind::Track, "9", qobuz_track(9, "Jóga", "Björk", 1));

    let mut session = Session::new(config.clone(), CancellationToken::new())
        .await
        .unwrap();
    session.register_client(mock.clone());
    session
        .add_by_id(Source::Qobuz, MediaKind::Album, "200")
        .await
        .unwrap();
    session.process_pending().await;
    session.finish().await;

    assert_eq!(mock.download_call_count(), 0);

    let ledger = Ledger::open(&config.database).await.unwrap();
    assert!(!ledger.downloaded(Source::Qobuz, "9").await.unwrap());
    assert!(ledger
        .failed(Source::Qobuz, MediaKind::Track, "9")
        .await
        .unwrap());
}

#[tokio::test]
async fn quality_downgrade_with_fallback_downloads() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.qobuz.quality = Quality::HiRes;
    config.qobuz.lower_quality_if_not_available = true;

    let mock = Arc::new(MockClient::new(Source::Qobuz));
    mock.put(
        MediaKind::Album,
        "200",
        qobuz_album(200, "Homogenic", "Björk", &[9]),
    );
    mock.put(MediaKind::Track, "9", qobuz_track(9, "Jóga", "Björk", 1));

    let mut session = Session::new(config.clone(), CancellationToken::new())
        .await
        .unwrap();
    session.register_client(mock.clone());
    session
        .add_by_id(Source::Qobuz, MediaKind::Album, "200")
        .await
        .unwrap();
    session.process_pending().await;
    session.finish().await;

    assert_eq!(mock.download_call_count(), 1);

    let ledger = Ledger::open(&config.database).await.unwrap();
    assert!(ledger.downloaded(Source::Qobuz, "9").await.unwrap());
}

#[tokio::test]
async fn liked_tracks_in_album_mode_download_each_album_once() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.downloads.download_full_album_for_liked_tracks = true;

    // Two liked tracks share album 10; one belongs to album 20.
    let mock = Arc::new(MockClient::new(Source::Deezer));
    mock.put_favorites(
        ripstream::client::FavoritesKind::Tracks,
        "123",
        serde_json::json!({"items": [{"id": 1}, {"id": 2}, {"id": 3}]}),
    );
    mock.put(MediaKind::Track, "1", deezer_track(1, 10, "T1", "Artist"));
    mock.put(MediaKind::Track, "2", deezer_track(2, 10, "T2", "Artist"));
    mock.put(MediaKind::Track, "3", deezer_track(3, 20, "T3", "Artist"));
    mock.put(
        MediaKind::Album,
        "10",
        deezer_album(10, "First", "Artist", &[1, 2]),
    );
    mock.put(
        MediaKind::Album,
        "20",
        deezer_album(20, "Second", "Artist", &[3]),
    );

    let mut session = Session::new(config.clone(), CancellationToken::new())
        .await
        .unwrap();
    session.register_client(mock.clone());
    session
        .add("https://www.deezer.com/en/profile/123/tracks")
        .await
        .unwrap();
    session.process_pending().await;
    session.finish().await;

    let ledger = Ledger::open(&config.database).await.unwrap();
    for id in ["1", "2", "3"] {
        assert!(ledger.downloaded(Source::Deezer, id).await.unwrap());
    }
    // Both albums recorded complete; the favorites collection itself is
    // not recorded.
    assert_eq!(
        ledger
            .release_complete(Source::Deezer, MediaKind::Album, "10")
            .await
            .unwrap(),
        Some(2)
    );
    assert_eq!(
        ledger
            .release_complete(Source::Deezer, MediaKind::Album, "20")
            .await
            .unwrap(),
        Some(1)
    );
    assert_eq!(mock.download_call_count(), 3);
}

#[tokio::test]
async fn empty_album_is_skipped_without_ledger_writes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let mock = Arc::new(MockClient::new(Source::Qobuz));
    mock.put(
        MediaKind::Album,
        "300",
        qobuz_album(300, "Empty", "Nobody", &[]),
    );

    let mut session = Session::new(config.clone(), CancellationToken::new())
        .await
        .unwrap();
    session.register_client(mock.clone());
    session
        .add_by_id(Source::Qobuz, MediaKind::Album, "300")
        .await
        .unwrap();
    session.process_pending().await;
    session.finish().await;

    let ledger = Ledger::open(&config.database).await.unwrap();
    assert_eq!(
        ledger
            .release_complete(Source::Qobuz, MediaKind::Album, "300")
            .await
            .unwrap(),
        None
    );
    assert_eq!(mock.download_call_count(), 0);
}
