//! Filename and path sanitization.
//!
//! Format strings from the configuration are interpolated with metadata
//! values, then cleaned so the result is safe on all supported filesystems.
//! An optional aggressive mode restricts names to `[A-Za-z0-9._ -]`.

use std::borrow::Cow;

/// Replaces `{key}` placeholders in a format string.
///
/// Unknown placeholders are left untouched so typos in a user's format
/// string surface in the resulting path instead of vanishing silently.
#[must_use]
pub fn interpolate(format: &str, values: &[(&str, String)]) -> String {
    let mut out = format.to_string();
    for (key, value) in values {
        let placeholder = format!("{{{key}}}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, value);
        }
    }
    out
}

/// Cleans a single path component of OS-unsafe characters.
///
/// With `restrict`, anything outside `[A-Za-z0-9._ -]` is dropped as well.
#[must_use]
pub fn clean_filename(name: &str, restrict: bool) -> String {
    let cleaned = sanitize_filename::sanitize_with_options(
        name,
        sanitize_filename::Options {
            replacement: "_",
            ..Default::default()
        },
    );

    let cleaned = if restrict {
        cleaned
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '.' | '_' | ' ' | '-'))
            .collect()
    } else {
        cleaned
    };

    collapse_spaces(&cleaned).trim().to_string()
}

/// Cleans a relative path, component by component, preserving separators.
#[must_use]
pub fn clean_filepath(path: &str, restrict: bool) -> String {
    path.split('/')
        .map(|component| clean_filename(component, restrict))
        .filter(|component| !component.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Truncates a filename stem to `limit` characters on a char boundary.
///
/// A limit of zero disables truncation.
#[must_use]
pub fn truncate_stem(stem: &str, limit: usize) -> Cow<'_, str> {
    if limit == 0 || stem.chars().count() <= limit {
        return Cow::Borrowed(stem);
    }
    Cow::Owned(stem.chars().take(limit).collect::<String>().trim().to_string())
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch == ' ' {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_known_keys() {
        let out = interpolate(
            "{tracknumber}. {artist} - {title}",
            &[
                ("tracknumber", "03".to_string()),
                ("artist", "Nina Simone".to_string()),
                ("title", "Sinnerman".to_string()),
            ],
        );
        assert_eq!(out, "03. Nina Simone - Sinnerman");
    }

    #[test]
    fn leaves_unknown_keys_visible() {
        let out = interpolate("{artist} - {typo}", &[("artist", "Can".to_string())]);
        assert_eq!(out, "Can - {typo}");
    }

    #[test]
    fn cleans_unsafe_characters() {
        assert_eq!(clean_filename("AC/DC: Live?", false), "AC_DC_ Live_");
    }

    #[test]
    fn restrict_mode_strips_non_ascii() {
        assert_eq!(
            clean_filename("Björk - Jóga <live>", true),
            "Bjrk - Jga _live_"
        );
    }

    #[test]
    fn filepath_keeps_separators() {
        assert_eq!(
            clean_filepath("Artist/Album (2020)/Disc 1", false),
            "Artist/Album (2020)/Disc 1"
        );
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_stem("héllo wörld", 5).as_ref(), "héllo");
        assert_eq!(truncate_stem("short", 0).as_ref(), "short");
        assert_eq!(truncate_stem("short", 100).as_ref(), "short");
    }
}
