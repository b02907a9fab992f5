//! Scheduler and async-lifecycle configuration
//!
//! This module holds the typed configuration for the two tunable parts of
//! the core: the stream scheduler and the async request manager.
//!
//! ## Usage
//!
//! ```rust
//! use gumdrop_core::{SchedulerConfig, AsyncConfig};
//!
//! // Stock defaults
//! let sched = SchedulerConfig::default();
//! assert_eq!(sched.per_stream_cap_bytes, 16384);
//!
//! // Tuned for a bandwidth-heavy deployment
//! let sched = SchedulerConfig::high_throughput();
//!
//! // Fine-grained control
//! let sched = SchedulerConfig::builder()
//!     .per_stream_cap_bytes(8192)
//!     .starvation_threshold_rounds(16)
//!     .build();
//!
//! let asynch = AsyncConfig::builder().default_timeout_ms(10_000).build();
//! assert_eq!(asynch.default_timeout_ms, 10_000);
//! ```

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum bytes a stream may send per scheduling turn
    /// Default: 16384 (16KB) - prevents head-of-line blocking
    pub per_stream_cap_bytes: usize,

    /// Per-turn cap for streams whose effective share exceeds one half
    /// Default: 65536 (64KB) - lets a dominant stream amortize frame overhead
    pub big_stream_cap_bytes: usize,

    /// Rounds a schedulable stream may go unselected before its deficit
    /// credit is topped up by a full quantum
    /// Default: 32
    pub starvation_threshold_rounds: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            per_stream_cap_bytes: 16384,
            big_stream_cap_bytes: 65536,
            starvation_threshold_rounds: 32,
        }
    }
}

impl SchedulerConfig {
    /// Create a new builder
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    /// High-throughput configuration for bandwidth-intensive workloads
    pub fn high_throughput() -> Self {
        Self {
            per_stream_cap_bytes: 32768,
            big_stream_cap_bytes: 131072,
            starvation_threshold_rounds: 64,
        }
    }

    /// Low-latency configuration for request/response workloads
    pub fn low_latency() -> Self {
        Self {
            per_stream_cap_bytes: 8192,
            big_stream_cap_bytes: 32768,
            starvation_threshold_rounds: 16,
        }
    }
}

/// Builder for SchedulerConfig
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Set the per-turn byte cap for ordinary streams
    pub fn per_stream_cap_bytes(mut self, cap: usize) -> Self {
        self.config.per_stream_cap_bytes = cap.max(1);
        self
    }

    /// Set the per-turn byte cap for dominant streams
    pub fn big_stream_cap_bytes(mut self, cap: usize) -> Self {
        self.config.big_stream_cap_bytes = cap.max(1);
        self
    }

    /// Set the anti-starvation round threshold
    pub fn starvation_threshold_rounds(mut self, rounds: u32) -> Self {
        self.config.starvation_threshold_rounds = rounds.max(1);
        self
    }

    /// Build the configuration
    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

/// Async request manager configuration
#[derive(Debug, Clone)]
pub struct AsyncConfig {
    /// Timeout applied to requests entering async mode without an explicit
    /// timeout, in milliseconds
    /// Default: 30000; 0 disables the default timeout
    pub default_timeout_ms: u64,

    /// Worker threads for the shared scheduled executor
    /// Default: 2
    pub executor_threads: usize,
}

impl Default for AsyncConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            executor_threads: 2,
        }
    }
}

impl AsyncConfig {
    /// Create a new builder
    pub fn builder() -> AsyncConfigBuilder {
        AsyncConfigBuilder::default()
    }
}

/// Builder for AsyncConfig
#[derive(Debug, Clone, Default)]
pub struct AsyncConfigBuilder {
    config: AsyncConfig,
}

impl AsyncConfigBuilder {
    /// Set the default async timeout in milliseconds (0 disables)
    pub fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.config.default_timeout_ms = ms;
        self
    }

    /// Set the executor thread count
    pub fn executor_threads(mut self, threads: usize) -> Self {
        self.config.executor_threads = threads.max(1);
        self
    }

    /// Build the configuration
    pub fn build(self) -> AsyncConfig {
        self.config
    }
}
