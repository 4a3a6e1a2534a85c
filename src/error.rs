//! Error handling for ripstream.
//!
//! Provides a unified error type that pairs a domain-level category with the
//! underlying error details. Categories drive control flow at the task
//! boundary:
//!
//! * `MissingCredentials` and `Auth` are fatal and terminate the process.
//! * `Transport` errors are retryable by the download queue.
//! * `NotStreamable`, `QualityUnavailable`, `Tagging` and `CoverTooLarge`
//!   are terminal for the item and recorded in the ledger.
//! * `Parse` is terminal for the item but *not* recorded as a failure,
//!   because it indicates a malformed payload rather than an unavailable
//!   stream.
//!
//! # Example
//!
//! ```rust
//! use ripstream::error::{Error, ErrorKind, Result};
//!
//! fn choose_quality(available: u8, requested: u8) -> Result<u8> {
//!     if available < requested {
//!         return Err(Error::quality_unavailable("no fallback allowed"));
//!     }
//!     Ok(requested)
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Main error type combining an error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether this error should be retried by the download queue.
    ///
    /// Only transport-level failures are considered transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport | ErrorKind::Io)
    }

    /// Whether this error terminates the whole session rather than a
    /// single item.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::MissingCredentials | ErrorKind::Auth | ErrorKind::Config
        )
    }
}

/// Standard result type for ripstream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for the download pipeline.
///
/// These are *kinds*, not types: the same underlying error may surface under
/// different kinds depending on where in the pipeline it occurred.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// No credentials configured for the provider
    #[error("Missing credentials")]
    MissingCredentials,

    /// Credentials rejected by the provider
    #[error("Authentication failed")]
    Auth,

    /// The item exists but cannot be streamed (region, subscription, takedown)
    #[error("Not available for streaming")]
    NotStreamable,

    /// Network-level failure, retryable
    #[error("Transport error")]
    Transport,

    /// Provider payload could not be interpreted
    #[error("Malformed response")]
    Parse,

    /// Downloaded audio failed integrity validation
    #[error("Audio validation failed")]
    Validation,

    /// Container tags could not be written
    #[error("Tagging failed")]
    Tagging,

    /// Requested quality unavailable and downgrade not allowed
    #[error("Requested quality unavailable")]
    QualityUnavailable,

    /// Cover art exceeds the container's size limit
    #[error("Cover art too large")]
    CoverTooLarge,

    /// Local filesystem error
    #[error("I/O error")]
    Io,

    /// Input string matched no known provider URL or ID form
    #[error("Unparseable URL")]
    InvalidUrl,

    /// Operation interrupted by shutdown
    #[error("Operation was cancelled")]
    Cancelled,

    /// Invalid or inconsistent configuration
    #[error("Invalid configuration")]
    Config,

    /// Operation not supported by this provider
    #[error("Not supported")]
    Unsupported,
}

macro_rules! constructor {
    ($(#[$meta:meta])* $name:ident, $kind:ident) => {
        $(#[$meta])*
        pub fn $name<E>(error: E) -> Self
        where
            E: Into<Box<dyn std::error::Error + Send + Sync>>,
        {
            Self {
                kind: ErrorKind::$kind,
                error: error.into(),
            }
        }
    };
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    constructor!(
        /// Creates an error for providers without configured credentials.
        missing_credentials,
        MissingCredentials
    );

    constructor!(
        /// Creates an error for rejected logins and expired sessions.
        auth,
        Auth
    );

    constructor!(
        /// Creates an error for items the provider refuses to stream.
        not_streamable,
        NotStreamable
    );

    constructor!(
        /// Creates an error for network-level failures. Retryable.
        transport,
        Transport
    );

    constructor!(
        /// Creates an error for provider payloads that cannot be interpreted.
        parse,
        Parse
    );

    constructor!(
        /// Creates an error for files that failed audio validation.
        validation,
        Validation
    );

    constructor!(
        /// Creates an error for tag-write failures.
        tagging,
        Tagging
    );

    constructor!(
        /// Creates an error for unavailable quality tiers without fallback.
        quality_unavailable,
        QualityUnavailable
    );

    constructor!(
        /// Creates an error for cover art exceeding container limits.
        cover_too_large,
        CoverTooLarge
    );

    constructor!(
        /// Creates an error for local filesystem failures.
        io,
        Io
    );

    constructor!(
        /// Creates an error for input that matches no URL rule.
        invalid_url,
        InvalidUrl
    );

    constructor!(
        /// Creates an error for operations interrupted by shutdown.
        cancelled,
        Cancelled
    );

    constructor!(
        /// Creates an error for invalid configuration.
        config,
        Config
    );

    constructor!(
        /// Creates an error for operations a provider does not support.
        unsupported,
        Unsupported
    );
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for Error {
    /// Formats the error for display, showing both kind and details.
    ///
    /// Format: "{kind}: {details}"
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io(err)
    }
}

impl From<reqwest::Error> for Error {
    /// Converts HTTP client errors into appropriate error kinds.
    ///
    /// Decode errors indicate a malformed payload; everything else is a
    /// transport-level failure that the retry loop may recover from.
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::parse(err);
        }

        if err.is_builder() {
            return Self::config(err);
        }

        Self::transport(err)
    }
}

impl From<serde_json::Error> for Error {
    /// Converts JSON errors to `Parse`.
    fn from(err: serde_json::Error) -> Self {
        Self::parse(err)
    }
}

impl From<sqlx::Error> for Error {
    /// Converts database errors to `Io`: the ledger is local state.
    fn from(err: sqlx::Error) -> Self {
        Self::io(err)
    }
}

impl From<toml::de::Error> for Error {
    /// Converts TOML errors to `Config`.
    fn from(err: toml::de::Error) -> Self {
        Self::config(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts URL parsing errors to `InvalidUrl`.
    fn from(err: url::ParseError) -> Self {
        Self::invalid_url(err)
    }
}

impl From<std::num::ParseIntError> for Error {
    /// Converts integer parsing errors to `Parse`.
    fn from(err: std::num::ParseIntError) -> Self {
        Self::parse(err)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    /// Converts timeout errors to `Transport` so they are retried.
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::cancelled(err)
        } else {
            Self::new(ErrorKind::Io, err)
        }
    }
}
