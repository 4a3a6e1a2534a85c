//! Uniform metadata model and provider-specific mappers.
//!
//! Provider payloads arrive as loosely-typed JSON and leave this module as
//! [`AlbumMetadata`] and [`TrackMetadata`], the shared model every later
//! pipeline stage (quality selection, tagging, path formatting, enrichment)
//! operates on.
//!
//! Mapping is a pure function of the payload: mappers never perform I/O and
//! fail with `ErrorKind::Parse` when a payload cannot be interpreted.

pub mod album;
pub mod covers;
pub mod search;
pub mod track;

pub(crate) mod util;

pub use album::{AlbumInfo, AlbumMetadata};
pub use covers::Covers;
pub use search::SearchResults;
pub use track::{TrackInfo, TrackMetadata};

use std::fmt;

use serde_repr::Deserialize_repr;

/// Quality tier, ordered by increasing fidelity.
///
/// The ordinal values match what providers and the configuration use:
/// 0 = lossy low, 1 = lossy high, 2 = CD lossless, 3 = hi-res.
#[derive(
    Clone, Copy, Debug, Default, Deserialize_repr, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[repr(u8)]
pub enum Quality {
    /// Lossy, low bitrate (MP3 128 or similar)
    Low = 0,

    /// Lossy, high bitrate (MP3 320 / AAC)
    High = 1,

    /// CD quality lossless (16-bit FLAC)
    #[default]
    Lossless = 2,

    /// High resolution lossless (24-bit FLAC)
    HiRes = 3,
}

impl Quality {
    /// The tier one step below, if any.
    #[must_use]
    pub fn lower(self) -> Option<Self> {
        match self {
            Self::Low => None,
            Self::High => Some(Self::Low),
            Self::Lossless => Some(Self::High),
            Self::HiRes => Some(Self::Lossless),
        }
    }

    /// Ordinal value as used in configuration and provider APIs.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Quality {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> crate::error::Result<Self> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::High),
            2 => Ok(Self::Lossless),
            3 => Ok(Self::HiRes),
            _ => Err(crate::error::Error::config(format!(
                "quality must be 0..=3, got {value}"
            ))),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "lossy low"),
            Self::High => write!(f, "lossy high"),
            Self::Lossless => write!(f, "CD lossless"),
            Self::HiRes => write!(f, "hi-res"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_ordering_follows_fidelity() {
        assert!(Quality::Low < Quality::High);
        assert!(Quality::High < Quality::Lossless);
        assert!(Quality::Lossless < Quality::HiRes);
    }

    #[test]
    fn quality_lower_chain_terminates() {
        assert_eq!(Quality::HiRes.lower(), Some(Quality::Lossless));
        assert_eq!(Quality::Low.lower(), None);
    }
}
