//! # System Constants
//!
//! Queue namespace suffixes, reserved record keys and operational defaults.

/// Suffixes appended to a queue's base name to form its regions
pub mod regions {
    /// Claimed-but-unacknowledged payloads
    pub const PROCESSING_SUFFIX: &str = ":processing";
    /// Dead-letter list
    pub const FAILED_SUFFIX: &str = ":failed";
    /// Delayed deliveries, scored by due time in epoch seconds
    pub const SCHEDULED_SUFFIX: &str = ":scheduled";
}

/// Keys of the persisted event record
pub mod record {
    pub const NAME: &str = "name";
    pub const DATA: &str = "data";
    pub const METADATA: &str = "metadata";
    pub const ERROR: &str = "error";
    pub const CREATED_AT: &str = "created_at";
    pub const FAILED_AT: &str = "failed_at";
    pub const JOB_ID: &str = "job_id";
}

/// Metadata keys owned by the relay itself
pub mod metadata {
    /// Number of delivery retries already performed
    pub const RETRIES: &str = "retries";
}

/// Operational defaults
pub mod defaults {
    pub const QUEUE_NAME: &str = "events";
    pub const BATCH_SIZE: usize = 10;
    pub const POP_TIMEOUT_MS: u64 = 1_000;
    pub const NUM_WORKERS: usize = 1;
    pub const POLL_INTERVAL_MS: u64 = 1_000;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 5_000;
    pub const CONNECTION_URL: &str = "redis://127.0.0.1:6379/0";
    pub const CONNECTION_MAX_RETRIES: u32 = 5;
    pub const CONNECTION_RETRY_DELAY_MS: u64 = 1_000;
    pub const HEALTH_CHECK_INTERVAL_MS: u64 = 30_000;
    pub const BACKOFF_BASE_DELAY_MS: u64 = 1_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const BACKOFF_MAX_DELAY_MS: u64 = 300_000;
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;
    pub const BACKOFF_MAX_ATTEMPTS: u32 = 3;
    pub const PUBSUB_CHANNEL_CAPACITY: usize = 1_000;
}

/// Names of the four regions of a queue with base name `name`
pub fn region_names(name: &str) -> (String, String, String, String) {
    (
        name.to_string(),
        format!("{name}{}", regions::PROCESSING_SUFFIX),
        format!("{name}{}", regions::FAILED_SUFFIX),
        format!("{name}{}", regions::SCHEDULED_SUFFIX),
    )
}
