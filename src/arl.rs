//! ARL validation and handling.
//!
//! Authentication Reference Links are the credential Deezer sessions are
//! built on. This module provides:
//! * Validation of token format (cookie-safe characters only)
//! * Automatic extraction from `deezer://autolog/...` callback URLs
//! * Debug redaction
//!
//! # Examples
//!
//! ```rust
//! use std::str::FromStr;
//! use ripstream::arl::Arl;
//!
//! // Parse and validate an ARL
//! let arl = Arl::from_str("valid_token")?;
//!
//! // Handles full callback URLs
//! let arl = Arl::from_str("deezer://autolog/valid_token")?;
//!
//! // Rejects invalid characters
//! assert!(Arl::from_str("invalid;token").is_err());
//! ```

use crate::error::{Error, Result};
use std::{fmt, ops::Deref, str::FromStr};
use veil::Redact;

/// Authentication Reference Link for Deezer services.
///
/// Provides validated storage of ARL tokens, ensuring they contain only
/// cookie-safe characters. ARLs grant full account access: they are
/// redacted in debug output and should never be logged.
#[derive(Clone, Redact, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[redact(all)]
pub struct Arl(String);

impl Arl {
    /// Creates a new validated ARL from a string.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Config` if the string contains characters that
    /// are not valid in a cookie value.
    pub fn new(arl: String) -> Result<Self> {
        arl.parse()
    }
}

/// Provides read-only access to the validated ARL string.
impl Deref for Arl {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Formats the ARL for string representation.
///
/// Only use where the raw token is actually needed (cookie headers);
/// debug output is redacted.
impl fmt::Display for Arl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses and validates an ARL from a string.
///
/// Extracts the token from callback URLs if present, then validates all
/// characters for cookie safety.
///
/// # Errors
///
/// Returns `ErrorKind::Config` if the string contains non-ASCII
/// characters, control characters, whitespace, or `"`, `,`, `;`, `\`.
impl FromStr for Arl {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut arl = s;

        // Foolproofing: in case a full callback URL is set.
        let parts: Vec<&str> = s.split('/').collect();
        if let Some(last_part) = parts.last() {
            arl = last_part;
        }

        // An `arl` must hold a valid cookie value.
        for chr in arl.chars() {
            if !chr.is_ascii()
                || chr.is_ascii_control()
                || chr.is_ascii_whitespace()
                || ['\"', ',', ';', '\\'].contains(&chr)
            {
                return Err(Error::config("arl contains invalid characters"));
            }
        }

        Ok(Self(arl.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_token() {
        let arl: Arl = "abc123DEF".parse().unwrap();
        assert_eq!(&*arl, "abc123DEF");
    }

    #[test]
    fn extracts_token_from_callback_url() {
        let arl: Arl = "deezer://autolog/abc123".parse().unwrap();
        assert_eq!(&*arl, "abc123");
    }

    #[test]
    fn rejects_cookie_unsafe_characters() {
        assert!("has space".parse::<Arl>().is_err());
        assert!("semi;colon".parse::<Arl>().is_err());
        assert!("日本語".parse::<Arl>().is_err());
    }

    #[test]
    fn debug_output_is_redacted() {
        let arl: Arl = "topsecret".parse().unwrap();
        assert!(!format!("{arl:?}").contains("topsecret"));
    }
}
