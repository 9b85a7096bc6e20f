//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// HTTP/Network constants
pub mod network {
    /// Default generative-service request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Database connection acquisition timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;
}

/// Gemini API constants
pub mod gemini {
    /// Default model used for agent schema generation
    pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

    /// Public Generative Language API endpoint
    pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

    /// Environment variable holding the API key
    pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

    /// Upper bound on output tokens for one schema generation
    pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 8192;
}

/// Schema cache and generator constants
pub mod schema {
    /// Agent schema time-to-live (seconds); 0 disables reuse
    pub const DEFAULT_CACHE_SECS: u64 = 300;

    /// Additional generation attempts after the first failure
    pub const DEFAULT_RETRY_COUNT: u32 = 1;

    /// Fixed delay between generation attempts (milliseconds)
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

    /// Number of validation issues quoted in `last_error`
    pub const MAX_REPORTED_ISSUES: usize = 3;
}

/// Query planning and execution constants
pub mod query {
    /// Hard row cap applied to every executed statement
    pub const DEFAULT_MAX_RESULT_ROWS: usize = 50;

    /// Largest configurable row cap
    pub const MAX_RESULT_ROWS_CEILING: usize = 1000;

    /// Minimum planner score for a template to be selected
    pub const DEFAULT_MIN_CONFIDENCE: u32 = 3;

    /// Statement timeout for one read-only query (seconds)
    pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 15;

    /// Default search radius when a coordinate is given without one (km)
    pub const DEFAULT_RADIUS_KM: f64 = 1.0;

    /// Maximum characters of a store error surfaced to the user
    pub const MAX_ERROR_CHARS: usize = 200;
}

/// Display constants
pub mod display {
    /// Title used when no display spec applies
    pub const GENERIC_TITLE: &str = "Query Results";
}
