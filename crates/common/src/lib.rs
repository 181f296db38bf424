//! Shared utilities, configuration, and error handling for Reelcast
//!
//! This crate provides common functionality used across the Reelcast
//! application:
//! - Configuration management following 12-factor principles
//! - Error types with a single HTTP mapping at the edge
//! - Request-id propagation (`RequestContext`)
//! - UTC time-window bucket keys for quota accounting
//! - Opaque pagination cursors
//! - In-process metrics counters

pub mod config;
pub mod context;
pub mod cursor;
pub mod error;
pub mod extractors;
pub mod metrics;
pub mod timewin;

pub use config::{Config, Environment};
pub use context::{request_id_middleware, RequestContext, REQUEST_ID_HEADER};
pub use cursor::PageCursor;
pub use error::{Error, Result};
pub use extractors::ValidatedJson;
pub use metrics::{Lifecycle, Metrics, MetricsSnapshot, RejectionKind};
