//! # esmetrics
//!
//! Polls an Elasticsearch node's cluster health and forwards it to
//! Graphite/Carbon as plaintext metrics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   oneshot   ┌─────────────┐   oneshot   ┌────────────┐
//! │ HealthSource │────────────▶│ LineEncoder │────────────▶│MetricWriter│
//! │  (HTTP GET)  │  document   │ (plaintext) │   payload   │   (TCP)    │
//! └──────────────┘             └─────────────┘             └────────────┘
//!        ▲                                                        │
//!        └──────────────────── PollLoop (sleep) ◀─────────────────┘
//! ```
//!
//! - **[`fetcher`]**: [`HealthFetcher`] issues `GET /_cluster/health` and
//!   classifies failures as [`FetchError`]
//! - **[`encoder`]**: [`LineEncoder`] turns a document into
//!   `<namespace>.<field> <value> <timestamp>` lines, remapping categorical
//!   fields to numbers
//! - **[`sink`]**: [`MetricSink`] writes a payload over a fresh TCP connection
//! - **[`poller`]**: [`PollLoop`] runs the three stages once per interval and
//!   logs every failure without stopping
//! - **[`config`]**: [`Settings`] layered from flags, environment and file
//!
//! ## Usage
//!
//! ```bash
//! esmetrics --eh es.local --gh carbon.local --poll 30s
//! ```
//!
//! ### As a library
//!
//! ```
//! use std::time::{Duration, UNIX_EPOCH};
//! use serde_json::json;
//!
//! let doc = json!({"status": "red", "timed_out": true});
//! let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
//! let payload = esmetrics::encode(&doc, "es", now);
//!
//! assert_eq!(payload, "es.status 2 1700000000\nes.timed_out 1 1700000000\n");
//! ```

pub mod config;
pub mod duration;
pub mod encoder;
pub mod error;
pub mod fetcher;
pub mod poller;
pub mod sink;

/// An untyped cluster health document as decoded from the endpoint.
pub type HealthDocument = serde_json::Value;

pub use crate::config::{Overrides, Settings};
pub use encoder::{encode, LineEncoder, MetricLine};
pub use error::{ConfigError, FetchError, SendError, Severity};
pub use fetcher::{HealthFetcher, HealthSource};
pub use poller::{PollHandle, PollLoop, TickOutcome};
pub use sink::{MetricSink, MetricWriter};
