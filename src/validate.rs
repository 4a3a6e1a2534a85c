//! Audio file integrity validation.
//!
//! Validation shells out to external decoders:
//!
//! * FLAC files get a test decode with `flac -t`, falling back to
//!   `ffprobe` when the tool is missing.
//! * Everything else is probed with `ffprobe`, forcing a duration read so
//!   a truncated stream fails.
//!
//! Missing tools degrade to assumed-valid with a warning; a machine
//! without decoders should not block downloads.

use std::path::Path;

use tokio::process::Command;

/// Result of validating one file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationOutcome {
    /// Whether the file decoded cleanly.
    pub is_valid: bool,

    /// Which tool produced the verdict.
    pub method: &'static str,

    /// Decoder output for failed validations.
    pub detail: Option<String>,
}

impl ValidationOutcome {
    fn valid(method: &'static str) -> Self {
        Self {
            is_valid: true,
            method,
            detail: None,
        }
    }

    fn invalid(method: &'static str, detail: String) -> Self {
        Self {
            is_valid: false,
            method,
            detail: Some(detail),
        }
    }
}

/// Validates an audio file for corruption.
pub async fn validate_audio_file(path: &Path) -> ValidationOutcome {
    if !path.exists() {
        return ValidationOutcome::invalid("file_check", format!("not found: {}", path.display()));
    }

    let is_flac = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("flac"));

    if is_flac {
        match validate_with_flac_tool(path).await {
            Some(outcome) => return outcome,
            None => debug!("flac tool unavailable, falling back to ffprobe"),
        }
    }

    match validate_with_ffprobe(path).await {
        Some(outcome) => outcome,
        None => {
            warn!("no validation tools available for {}", path.display());
            ValidationOutcome::valid("none")
        }
    }
}

/// Test decode with `flac -t`. `None` when the tool cannot be spawned.
async fn validate_with_flac_tool(path: &Path) -> Option<ValidationOutcome> {
    let output = Command::new("flac")
        .arg("-t")
        .arg(path)
        .output()
        .await
        .ok()?;

    if output.status.success() {
        debug!("flac validation passed: {}", path.display());
        Some(ValidationOutcome::valid("flac_tool"))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Some(ValidationOutcome::invalid("flac_tool", stderr))
    }
}

/// Probe with `ffprobe`, reading the duration to force a full parse.
/// `None` when the tool cannot be spawned.
async fn validate_with_ffprobe(path: &Path) -> Option<ValidationOutcome> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
        .arg(path)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Some(ValidationOutcome::invalid("ffprobe", stderr));
    }

    let duration = String::from_utf8_lossy(&output.stdout).trim().to_string();
    match duration.parse::<f64>() {
        Ok(seconds) if seconds <= 0.0 => Some(ValidationOutcome::invalid(
            "ffprobe",
            "zero duration".to_string(),
        )),
        // Unparseable duration with a clean exit still counts as valid.
        _ => Some(ValidationOutcome::valid("ffprobe")),
    }
}
