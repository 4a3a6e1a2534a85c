//! Container-specific tag writers.
//!
//! The tag step embeds the normalized metadata into the finished audio
//! file. Each container has its own encoder and key mapping:
//!
//! * **FLAC**: Vorbis comments, keys uppercased from the metadata field
//!   names, multi-valued artists/composers as native lists.
//! * **MP4**: iTunes atoms plus `----:com.apple.iTunes:*` freeform values.
//! * **MP3**: ID3v2.3 frames, custom values as `TXXX:NAME`.
//!
//! Provider identifiers are emitted as `{SOURCE}_{TRACK|ALBUM|ARTIST}_ID`
//! so a tagged file can always be traced back to its origin.
//!
//! Cover art is embedded as JPEG. FLAC metadata blocks cap at 16 MiB − 1;
//! larger covers fail the tag step, which is fatal for that track.

use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    metadata::TrackMetadata,
};

/// Maximum FLAC metadata block size: 16 MiB − 1.
pub const FLAC_MAX_BLOCKSIZE: u64 = 16_777_215;

/// Audio container, selected by file extension.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Container {
    Flac,
    Mp4,
    Mp3,
}

impl Container {
    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "flac" => Ok(Self::Flac),
            "m4a" | "mp4" => Ok(Self::Mp4),
            "mp3" => Ok(Self::Mp3),
            other => Err(Error::tagging(format!("invalid extension {other:?}"))),
        }
    }
}

/// Writes container-appropriate tags to `path`.
///
/// Runs on the blocking pool: the tagging crates do synchronous file I/O.
///
/// # Errors
///
/// Returns `ErrorKind::Tagging` when the container is unknown or the tag
/// write fails, and `ErrorKind::CoverTooLarge` when a FLAC cover exceeds
/// the metadata block limit.
pub async fn tag_file(
    path: &Path,
    meta: &TrackMetadata,
    cover_path: Option<&Path>,
) -> Result<()> {
    let container = Container::from_path(path)?;
    let path = path.to_path_buf();
    let meta = meta.clone();
    let cover_path = cover_path.map(Path::to_path_buf);

    tokio::task::spawn_blocking(move || match container {
        Container::Flac => tag_flac(&path, &meta, cover_path.as_deref()),
        Container::Mp4 => tag_mp4(&path, &meta, cover_path.as_deref()),
        Container::Mp3 => tag_mp3(&path, &meta, cover_path.as_deref()),
    })
    .await?
}

/// Uppercased source prefix for provider id tags, e.g. `DEEZER`.
fn source_prefix(meta: &TrackMetadata) -> Option<String> {
    meta.source_platform.map(|s| s.to_string().to_uppercase())
}

/// `(key suffix, value)` pairs for the three provider id tags.
fn source_id_pairs(meta: &TrackMetadata) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(id) = &meta.source_track_id {
        pairs.push(("TRACK_ID", id.clone()));
    }
    if let Some(id) = &meta.source_album_id {
        pairs.push(("ALBUM_ID", id.clone()));
    }
    if let Some(id) = &meta.source_artist_id {
        pairs.push(("ARTIST_ID", id.clone()));
    }
    pairs
}

fn read_cover(cover_path: &Path) -> Result<Vec<u8>> {
    std::fs::read(cover_path).map_err(|e| Error::tagging(format!("cover unreadable: {e}")))
}

fn tag_flac(path: &PathBuf, meta: &TrackMetadata, cover_path: Option<&Path>) -> Result<()> {
    let mut tag = metaflac::Tag::read_from_path(path)
        .map_err(|e| Error::tagging(format!("{}: {e}", path.display())))?;

    let album = &meta.album;
    {
        let comments = tag.vorbis_comments_mut();

        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                comments.set(key, vec![value]);
            }
        };

        set("TITLE", Some(meta.title.clone()));
        set("ALBUM", Some(album.title.clone()));
        set("ALBUMARTIST", Some(album.albumartist.clone()));
        set("YEAR", Some(album.year.clone()));
        set("COMMENT", album.comment.clone());
        set("DESCRIPTION", album.description.clone());
        set("GROUPING", album.grouping.clone());
        set("GENRE", (!album.genre.is_empty()).then(|| album.genres()));
        set("LYRICS", meta.lyrics.clone());
        set("COPYRIGHT", album.formatted_copyright());
        set("COMPILATION", album.compilation.clone());
        set("TRACKNUMBER", Some(format!("{:02}", meta.tracknumber)));
        set("DISCNUMBER", Some(format!("{:02}", meta.discnumber)));
        set("TRACKTOTAL", Some(format!("{:02}", album.tracktotal)));
        set("DISCTOTAL", Some(format!("{:02}", album.disctotal)));
        set("DATE", album.date.clone());
        set("ISRC", meta.isrc.clone());
        set("LABEL", album.info.label.clone());
        set("BPM", meta.bpm.map(|bpm| bpm.to_string()));
        set("BARCODE", album.barcode.clone());
        set("REPLAYGAIN_TRACK_GAIN", meta.replaygain_track_gain.clone());
        set("REPLAYGAIN_ALBUM_GAIN", album.replaygain_album_gain.clone());
        set("RELEASETYPE", album.releasetype.clone());
        set("TRACK_ARTIST_CREDIT", meta.track_artist_credit.clone());
        set("ALBUM_ARTIST_CREDIT", album.album_artist_credit.clone());
        set("ORIGINALDATE", album.originaldate.clone());
        set("MEDIA_TYPE", meta.media_type.clone());

        // Multi-valued fields are passed as native lists.
        comments.set("ARTIST", vec![meta.artist.clone()]);
        if !meta.artists.is_empty() {
            comments.set("ARTISTS", meta.artists.clone());
        }
        if let Some(composer) = &meta.composer {
            comments.set("COMPOSER", composer.clone());
        }
        if let Some(author) = &meta.author {
            comments.set("AUTHOR", author.clone());
        }

        if let Some(prefix) = source_prefix(meta) {
            for (suffix, value) in source_id_pairs(meta) {
                comments.set(format!("{prefix}_{suffix}"), vec![value]);
            }
        }
    }

    if let Some(cover_path) = cover_path {
        let size = std::fs::metadata(cover_path).map(|m| m.len()).unwrap_or(0);
        if size > FLAC_MAX_BLOCKSIZE {
            return Err(Error::cover_too_large(format!(
                "cover is {size} bytes, FLAC limit is {FLAC_MAX_BLOCKSIZE}"
            )));
        }
        let data = read_cover(cover_path)?;
        tag.remove_picture_type(metaflac::block::PictureType::CoverFront);
        tag.add_picture(
            "image/jpeg",
            metaflac::block::PictureType::CoverFront,
            data,
        );
    }

    tag.save()
        .map_err(|e| Error::tagging(format!("{}: {e}", path.display())))
}

fn tag_mp3(path: &PathBuf, meta: &TrackMetadata, cover_path: Option<&Path>) -> Result<()> {
    use id3::{frame, TagLike, Version};

    let mut tag = id3::Tag::read_from_path(path).unwrap_or_else(|_| id3::Tag::new());
    let album = &meta.album;

    tag.set_text("TIT2", &meta.title);
    tag.set_text("TPE1", &meta.artist);
    tag.set_text("TALB", &album.title);
    tag.set_text("TPE2", &album.albumartist);
    tag.set_text("TYER", &album.year);
    tag.set_text("TRCK", format!("{}/{}", meta.tracknumber, album.tracktotal));
    tag.set_text("TPOS", format!("{}/{}", meta.discnumber, album.disctotal));

    if let Some(composer) = &meta.composer {
        tag.set_text("TCOM", composer.join("; "));
    }
    if let Some(author) = &meta.author {
        tag.set_text("TEXT", author.join("; "));
    }
    if !album.genre.is_empty() {
        tag.set_text("TCON", album.genres());
    }
    if let Some(copyright) = album.formatted_copyright() {
        tag.set_text("TCOP", copyright);
    }
    if let Some(compilation) = &album.compilation {
        tag.set_text("TCMP", compilation);
    }
    if let Some(isrc) = &meta.isrc {
        tag.set_text("TSRC", isrc);
    }
    if let Some(label) = &album.info.label {
        tag.set_text("TPUB", label);
    }
    if let Some(bpm) = meta.bpm {
        tag.set_text("TBPM", bpm.to_string());
    }
    if let Some(description) = &album.description {
        tag.set_text("TIT1", description);
    }
    if let Some(originaldate) = &album.originaldate {
        tag.set_text("TDOR", originaldate);
    }
    if let Some(comment) = &album.comment {
        tag.add_frame(frame::Comment {
            lang: "eng".to_string(),
            description: String::new(),
            text: comment.clone(),
        });
    }
    if let Some(lyrics) = &meta.lyrics {
        if !lyrics.is_empty() {
            tag.add_frame(frame::Lyrics {
                lang: "eng".to_string(),
                description: String::new(),
                text: lyrics.clone(),
            });
        }
    }

    // Custom values go into TXXX frames.
    let mut txxx = |description: &str, value: Option<String>| {
        if let Some(value) = value {
            tag.add_frame(frame::ExtendedText {
                description: description.to_string(),
                value,
            });
        }
    };

    txxx(
        "ARTISTS",
        (!meta.artists.is_empty()).then(|| meta.artists.join(", ")),
    );
    txxx("BARCODE", album.barcode.clone());
    txxx("REPLAYGAIN_TRACK_GAIN", meta.replaygain_track_gain.clone());
    txxx("REPLAYGAIN_ALBUM_GAIN", album.replaygain_album_gain.clone());
    txxx("RELEASETYPE", album.releasetype.clone());
    txxx("TRACK_ARTIST_CREDIT", meta.track_artist_credit.clone());
    txxx("ALBUM_ARTIST_CREDIT", album.album_artist_credit.clone());
    txxx("MEDIA_TYPE", meta.media_type.clone());

    if let Some(prefix) = source_prefix(meta) {
        for (suffix, value) in source_id_pairs(meta) {
            txxx(&format!("{prefix}_{suffix}"), Some(value));
        }
    }

    if let Some(cover_path) = cover_path {
        let data = read_cover(cover_path)?;
        tag.add_frame(frame::Picture {
            mime_type: "image/jpeg".to_string(),
            picture_type: frame::PictureType::CoverFront,
            description: String::new(),
            data,
        });
    }

    tag.write_to_path(path, Version::Id3v23)
        .map_err(|e| Error::tagging(format!("{}: {e}", path.display())))
}

fn tag_mp4(path: &PathBuf, meta: &TrackMetadata, cover_path: Option<&Path>) -> Result<()> {
    use mp4ameta::{Data, FreeformIdent, Img};

    let mut tag = mp4ameta::Tag::read_from_path(path)
        .map_err(|e| Error::tagging(format!("{}: {e}", path.display())))?;
    let album = &meta.album;

    tag.set_title(&meta.title);
    tag.set_artist(&meta.artist);
    tag.set_album(&album.title);
    tag.set_album_artist(&album.albumartist);
    tag.set_year(&album.year);

    if let Some(composer) = &meta.composer {
        tag.remove_composers();
        for name in composer {
            tag.add_composer(name);
        }
    }
    if !album.genre.is_empty() {
        tag.set_genre(album.genres());
    }
    if let Some(comment) = &album.comment {
        tag.set_comment(comment);
    }
    if let Some(description) = &album.description {
        tag.set_description(description);
    }
    if let Some(lyrics) = &meta.lyrics {
        if !lyrics.is_empty() {
            tag.set_lyrics(lyrics);
        }
    }
    if let Some(copyright) = album.formatted_copyright() {
        tag.set_copyright(copyright);
    }
    if album.compilation.is_some() {
        tag.set_compilation();
    }
    if let Some(bpm) = meta.bpm {
        tag.set_bpm(bpm);
    }

    tag.set_track(meta.tracknumber as u16, album.tracktotal as u16);
    tag.set_disc(meta.discnumber as u16, album.disctotal as u16);

    // Values without a native atom become iTunes freeform entries,
    // UTF-8 encoded.
    let mut freeform = |name: &str, value: Option<String>| {
        if let Some(value) = value {
            tag.set_data(
                FreeformIdent::new("com.apple.iTunes", name),
                Data::Utf8(value),
            );
        }
    };

    freeform(
        "ARTISTS",
        (!meta.artists.is_empty()).then(|| meta.artists.join(", ")),
    );
    freeform("AUTHOR", meta.author.as_ref().map(|a| a.join("; ")));
    freeform("ISRC", meta.isrc.clone());
    freeform("LABEL", album.info.label.clone());
    freeform("BARCODE", album.barcode.clone());
    freeform("REPLAYGAIN_TRACK_GAIN", meta.replaygain_track_gain.clone());
    freeform("REPLAYGAIN_ALBUM_GAIN", album.replaygain_album_gain.clone());
    freeform("RELEASETYPE", album.releasetype.clone());
    freeform("TRACK_ARTIST_CREDIT", meta.track_artist_credit.clone());
    freeform("ALBUM_ARTIST_CREDIT", album.album_artist_credit.clone());
    freeform("ORIGINALDATE", album.originaldate.clone());
    freeform("MEDIA_TYPE", meta.media_type.clone());

    if let Some(prefix) = source_prefix(meta) {
        for (suffix, value) in source_id_pairs(meta) {
            freeform(&format!("{prefix}_{suffix}"), Some(value));
        }
    }

    if let Some(cover_path) = cover_path {
        let data = read_cover(cover_path)?;
        tag.set_artwork(Img::jpeg(data));
    }

    tag.write_to_path(path)
        .map_err(|e| Error::tagging(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_selected_by_extension() {
        assert_eq!(
            Container::from_path(Path::new("a/b.flac")).unwrap(),
            Container::Flac
        );
        assert_eq!(
            Container::from_path(Path::new("a/b.m4a")).unwrap(),
            Container::Mp4
        );
        assert_eq!(
            Container::from_path(Path::new("a/b.MP3")).unwrap(),
            Container::Mp3
        );
        assert!(Container::from_path(Path::new("a/b.ogg")).is_err());
    }
}
