//! Built-in defaults used when no tier sets a field.

pub mod http {
    use std::time::Duration;

    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY: Duration = Duration::ZERO;
    pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
    pub const RETRY_JITTER_FACTOR: f64 = 0.1;
    /// Chunk size used when streaming a request body for upload progress.
    pub const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;
}

pub mod polling {
    use std::time::Duration;

    pub const INTERVAL: Duration = Duration::from_secs(5);
}

pub mod cache {
    use std::time::Duration;

    pub const REVALIDATE_AFTER: Duration = Duration::from_secs(10);
}

pub mod messages {
    pub const NETWORK_ERROR: &str = "Network error";
    pub const TIMEOUT: &str = "Request timed out";
    pub const CANCELED: &str = "Request canceled";
}
