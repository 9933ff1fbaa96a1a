//! Admission control: sliding-window rate limits, backoff and the priority queue

pub mod backoff;
pub mod queue;
pub mod window;

pub use backoff::BackoffConfig;
pub use queue::{AdmissionQueue, Priority, QueueStats};
pub use window::{RateDimension, RateLimitStatus, RateWindowConfig, RequestHistory};
