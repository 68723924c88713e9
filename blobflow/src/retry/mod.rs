//! Retry engines.
//!
//! This module provides:
//! - RetryPolicy, a generic attempt loop driven by an ordered list of
//!   RetryStrategy values
//! - ExponentialRetryStrategy and ThrottlingRetryStrategy
//! - StorageRetryPolicy, a self-contained loop with primary/secondary failover

mod decision;
mod engine;
mod exponential;
mod storage;
mod throttling;


pub use decision::{RetryDecision, RetryInformation, RetryStrategy};
pub use engine::{
    default_retry_policy, exponential_retry_policy, retry_policy, system_error_retry_policy,
    throttling_retry_policy, RetryOptions, RetryPolicy,
};
pub use exponential::{
    calculate_retry_delay, is_exponential_retry_response, is_system_error, ExponentialRetryStrategy,
    ExponentialRetryStrategyOptions, SYSTEM_ERROR_CODES,
};
pub use storage::{
    is_network_error, StorageRetryOptions, StorageRetryPolicy, StorageRetryPolicyType,
    RETRIABLE_NETWORK_ERRORS, TIMEOUT_QUERY_PARAMETER,
};
pub use throttling::{
    is_throttling_retry_response, retry_after, retry_after_at, ThrottlingRetryStrategy,
    RETRY_AFTER_HEADER, RETRY_AFTER_MS_HEADER, X_MS_RETRY_AFTER_MS_HEADER,
};
