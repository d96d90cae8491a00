//! Metric name and label definitions.
//!
//! Every metric the client records is named here so dashboards and the code
//! agree on one spelling.

/// Outbound message dispatch
pub mod dispatch {
    /// Total `send` calls, labelled by outcome
    pub const SENDS_TOTAL: &str = "wabridge_dispatch_sends_total";
    /// Total HTTP attempts made while sending
    pub const ATTEMPTS_TOTAL: &str = "wabridge_dispatch_attempts_total";
    /// Retries scheduled after a transient failure
    pub const RETRIES_TOTAL: &str = "wabridge_dispatch_retries_total";
    /// Sends that ended with a failure, labelled by error type
    pub const FAILURES_TOTAL: &str = "wabridge_dispatch_failures_total";
    /// Wall-clock duration of a whole `send`, retries included
    pub const DURATION_SECONDS: &str = "wabridge_dispatch_duration_seconds";
}

/// OAuth2 access token lifecycle
pub mod token {
    /// Token endpoint calls
    pub const REFRESH_TOTAL: &str = "wabridge_token_refresh_total";
    /// Token endpoint calls that failed
    pub const REFRESH_FAILURES_TOTAL: &str = "wabridge_token_refresh_failures_total";
    /// Token requests served from the cache
    pub const CACHE_HITS_TOTAL: &str = "wabridge_token_cache_hits_total";
    /// Tokens dropped after a provider 401
    pub const INVALIDATIONS_TOTAL: &str = "wabridge_token_invalidations_total";
}

/// Outbound token bucket
pub mod rate_limiter {
    /// Acquire calls that obtained a token
    pub const ACQUIRED_TOTAL: &str = "wabridge_rate_limiter_acquired_total";
    /// Acquire calls that gave up before a token was available
    pub const DENIED_TOTAL: &str = "wabridge_rate_limiter_denied_total";
    /// Time spent waiting for a token, in seconds
    pub const WAIT_SECONDS: &str = "wabridge_rate_limiter_wait_seconds";
}

/// Sending channel resolution
pub mod channel {
    /// Provider bot listings performed
    pub const RESOLUTIONS_TOTAL: &str = "wabridge_channel_resolutions_total";
    /// Listings that produced no usable channel
    pub const RESOLUTION_FAILURES_TOTAL: &str = "wabridge_channel_resolution_failures_total";
}

/// Common label keys
pub mod labels {
    pub const OUTCOME: &str = "outcome";
    pub const STATUS: &str = "status";
    pub const ERROR_TYPE: &str = "error_type";
    pub const MESSAGE_TYPE: &str = "message_type";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Dispatch duration buckets (in seconds)
    /// Covers 10ms to 2 minutes, long enough for a full backoff sequence
    pub static DISPATCH_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
        ]
    });

    /// Rate limiter wait buckets (in seconds)
    pub static RATE_LIMIT_WAIT: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![0.0, 0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    });
}
