//! Post-download conversion through an external engine.
//!
//! Conversion invokes `ffmpeg` on the finished (already tagged) file and
//! replaces it: the source is deleted and the caller continues with the
//! new path, since the extension usually changes.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::{
    config::ConversionConfig,
    error::{Error, Result},
};

/// Target codec names and their ffmpeg arguments.
fn codec_args(codec: &str) -> Result<(&'static str, Vec<&'static str>)> {
    match codec.to_lowercase().as_str() {
        "flac" => Ok(("flac", vec!["-c:a", "flac"])),
        "alac" => Ok(("m4a", vec!["-c:a", "alac"])),
        "mp3" => Ok(("mp3", vec!["-c:a", "libmp3lame", "-q:a", "0"])),
        "opus" => Ok(("opus", vec!["-c:a", "libopus", "-b:a", "256k"])),
        other => Err(Error::config(format!("unknown conversion codec {other:?}"))),
    }
}

/// Converts `path` per the conversion settings, deleting the source.
///
/// Returns the path of the converted file.
///
/// # Errors
///
/// Returns `ErrorKind::Config` for unknown codecs and `ErrorKind::Io`
/// when ffmpeg fails or cannot be spawned.
pub async fn convert_file(path: &Path, config: &ConversionConfig) -> Result<PathBuf> {
    let (extension, args) = codec_args(&config.codec)?;

    // Convert next to the source, then swap.
    let staging = path.with_extension(format!("converting.{extension}"));
    let target = path.with_extension(extension);

    let mut command = Command::new("ffmpeg");
    command.arg("-y").arg("-i").arg(path).args(&args);
    if let Some(rate) = config.sampling_rate {
        command.args(["-ar", &rate.to_string()]);
    }
    if let Some(depth) = config.bit_depth {
        let fmt = if depth > 16 { "s32" } else { "s16" };
        command.args(["-sample_fmt", fmt]);
    }
    command.arg(&staging);

    debug!("converting {} to {}", path.display(), target.display());
    let output = command
        .output()
        .await
        .map_err(|e| Error::io(format!("cannot run ffmpeg: {e}")))?;

    if !output.status.success() {
        let _ = tokio::fs::remove_file(&staging).await;
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::io(format!("ffmpeg failed: {}", stderr.trim())));
    }

    tokio::fs::remove_file(path).await?;
    tokio::fs::rename(&staging, &target).await?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codecs_map_to_extensions() {
        assert_eq!(codec_args("flac").unwrap().0, "flac");
        assert_eq!(codec_args("ALAC").unwrap().0, "m4a");
        assert_eq!(codec_args("mp3").unwrap().0, "mp3");
        assert!(codec_args("wav").is_err());
    }
}
