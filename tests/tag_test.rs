//! Tag writer round-trips on MP3 (the container readable without an
//! audio decoder).

use std::sync::Arc;

use id3::TagLike;
use tempfile::TempDir;

use ripstream::{
    client::Source,
    metadata::{AlbumMetadata, TrackMetadata},
    tag::tag_file,
};

fn track_meta() -> TrackMetadata {
    let album_resp = serde_json::json!({
        "id": 302127,
        "title": "Discovery",
        "nb_tracks": 14,
        "release_date": "2001-03-07",
        "artist": {"name": "Daft Punk", "id": 27},
        "genres": {"data": [{"name": "Electronic"}, {"name": "House"}]},
        "label": "Virgin",
        "upc": "724384960650",
        "tracks": [{"disk_number": 1}]
    });
    let album = Arc::new(AlbumMetadata::from_album_resp(&album_resp, Source::Deezer).unwrap());

    let track_resp = serde_json::json!({
        "id": 3135556,
        "title": "Harder, Better, Faster, Stronger",
        "isrc": "GBDUW0000059",
        "readable": true,
        "track_position": 4,
        "disk_number": 1,
        "explicit_lyrics": false,
        "bpm": 123,
        "qualities": ["MP3_128", "MP3_320", "FLAC"],
        "contributors": [{"name": "Daft Punk", "id": 27}]
    });
    TrackMetadata::from_resp(album, Source::Deezer, &track_resp).unwrap()
}

#[tokio::test]
async fn mp3_tags_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("04. Daft Punk - Harder.mp3");
    std::fs::write(&path, b"NOT-REALLY-MPEG-AUDIO-DATA").unwrap();

    tag_file(&path, &track_meta(), None).await.unwrap();

    let tag = id3::Tag::read_from_path(&path).unwrap();
    assert_eq!(tag.title(), Some("Harder, Better, Faster, Stronger"));
    assert_eq!(tag.artist(), Some("Daft Punk"));
    assert_eq!(tag.album(), Some("Discovery"));
    assert_eq!(tag.album_artist(), Some("Daft Punk"));

    // Track and disc numbers carry their totals.
    let trck = tag.get("TRCK").and_then(|f| f.content().text()).unwrap();
    assert_eq!(trck, "4/14");
    let tpos = tag.get("TPOS").and_then(|f| f.content().text()).unwrap();
    assert_eq!(tpos, "1/1");

    assert_eq!(
        tag.get("TSRC").and_then(|f| f.content().text()),
        Some("GBDUW0000059")
    );
    assert_eq!(
        tag.get("TPUB").and_then(|f| f.content().text()),
        Some("Virgin")
    );
    assert_eq!(
        tag.get("TCON").and_then(|f| f.content().text()),
        Some("Electronic, House")
    );
}

#[tokio::test]
async fn mp3_source_ids_are_custom_frames() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track.mp3");
    std::fs::write(&path, b"NOT-REALLY-MPEG-AUDIO-DATA").unwrap();

    tag_file(&path, &track_meta(), None).await.unwrap();

    let tag = id3::Tag::read_from_path(&path).unwrap();
    let custom: Vec<(String, String)> = tag
        .extended_texts()
        .map(|ext| (ext.description.clone(), ext.value.trim_end_matches('\0').to_string()))
        .collect();

    assert!(custom.contains(&("DEEZER_TRACK_ID".to_string(), "3135556".to_string())));
    assert!(custom.contains(&("DEEZER_ALBUM_ID".to_string(), "302127".to_string())));
    assert!(custom.contains(&("DEEZER_ARTIST_ID".to_string(), "27".to_string())));
    assert!(custom.contains(&("BARCODE".to_string(), "724384960650".to_string())));
}

#[tokio::test]
async fn cover_is_embedded_as_front_cover() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track.mp3");
    std::fs::write(&path, b"NOT-REALLY-MPEG-AUDIO-DATA").unwrap();

    let cover = dir.path().join("cover.jpg");
    std::fs::write(&cover, b"\xFF\xD8\xFF\xE0fakejpeg").unwrap();

    tag_file(&path, &track_meta(), Some(&cover)).await.unwrap();

    let tag = id3::Tag::read_from_path(&path).unwrap();
    let pictures: Vec<_> = tag.pictures().collect();
    assert_eq!(pictures.len(), 1);
    assert_eq!(pictures[0].mime_type, "image/jpeg");
    assert_eq!(
        pictures[0].picture_type,
        id3::frame::PictureType::CoverFront
    );
}

#[tokio::test]
async fn unknown_container_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track.ogg");
    std::fs::write(&path, b"OggS").unwrap();

    let result = tag_file(&path, &track_meta(), None).await;
    assert!(result.is_err());
}
