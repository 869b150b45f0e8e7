//! Telemetry metric name constants.
//!
//! Centralised metric names for gateway operations. Hosts install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `sanad_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation`: gateway operation (e.g. "query", "structured", "translate")
//! - `status`: outcome: "ok" or "error"
//! - `direction`: cache path: "read" or "write"

/// Total gateway operations.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "sanad_requests_total";

/// Gateway operation duration in seconds, cache hits included.
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "sanad_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "sanad_retries_total";

/// Total credential rotations triggered by transient failures.
pub const CREDENTIAL_ROTATIONS_TOTAL: &str = "sanad_credential_rotations_total";

/// Total cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "sanad_cache_hits_total";

/// Total cache misses, including fail-open reads.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "sanad_cache_misses_total";

/// Total cache store failures swallowed by the gateway.
///
/// Labels: `direction` ("read" | "write").
pub const CACHE_ERRORS_TOTAL: &str = "sanad_cache_errors_total";

/// Total model outputs that only parsed after the trailing-comma repair.
pub const PARSE_REPAIRS_TOTAL: &str = "sanad_parse_repairs_total";
