//! Multi-provider music download orchestrator.
//!
//! **ripstream** turns a user reference - a URL, a provider id, or a
//! search query - into tagged audio files on disk, idempotently across
//! runs. It provides:
//!
//! # Core Features
//!
//! * **Discovery**: URLs, ids, profile favorites and Last.fm playlists
//!   resolve into tracks, albums, artists, labels and playlists
//! * **Orchestration**: a bounded worker pool with per-provider rate
//!   limits, a global transfer semaphore, retries and graceful shutdown
//! * **Metadata**: provider payloads normalized into one model, enriched
//!   from RateYourMusic, and embedded as FLAC/MP4/MP3 tags
//! * **Idempotency**: a durable ledger of downloaded tracks, failed items
//!   and completed releases
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! * **Discovery**
//!   - [`parse_url`]: Classifies input references
//!   - [`media`]: The Pending/Media resolution pipeline
//!   - [`session`]: Session lifecycle and orchestration
//!
//! * **Transfer**
//!   - [`queue`]: Download queue and worker pool
//!   - [`client`]: Provider capability and byte transports
//!   - [`decrypt`]: Stripe decryption for protected content
//!
//! * **Metadata**
//!   - [`metadata`]: Uniform model and provider mappers
//!   - [`rym`]: Enrichment service
//!   - [`tag`]: Container-specific tag writers
//!
//! * **Persistence**
//!   - [`db`]: The idempotency ledger
//!   - [`filepath`]: Path formatting and sanitization
//!
//! * **Utilities**
//!   - [`config`]: Application settings
//!   - [`error`]: Error types and handling
//!   - [`http`]: Rate-limited provider HTTP clients
//!   - [`progress`]: Terminal progress rendering
//!   - [`validate`]: Audio integrity validation
//!   - [`convert`]: External conversion engine hook
//!
//! # Concurrency
//!
//! The library uses async/await on the Tokio runtime. Four limiters
//! compose, outermost first: per-provider token buckets, per-provider
//! concurrency semaphores, the global byte-transfer semaphore, and the
//! enrichment semaphore. See [`queue`] and [`http`] for the details.
//!
//! # Error Handling
//!
//! Errors are handled through the types in the [`error`] module, with
//! most functions returning [`Result`](error::Result). Per-item errors
//! stop at the task boundary; only configuration and authentication
//! errors end the process.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![doc(test(attr(ignore)))]

#[macro_use]
extern crate log;

pub mod arl;
pub mod client;
pub mod config;
pub mod convert;
pub mod db;
pub mod decrypt;
pub mod error;
pub mod filepath;
pub mod http;
pub mod media;
pub mod metadata;
pub mod parse_url;
pub mod progress;
pub mod queue;
pub mod rym;
pub mod session;
pub mod tag;
pub mod validate;
