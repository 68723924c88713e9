//! # Blobflow
//!
//! The request-dispatch core of a cloud storage SDK.
//!
//! Blobflow provides:
//!
//! - **Phased policy pipeline**: middleware registers into phases, declares
//!   ordering constraints against other policies, and is composed into a
//!   single onion around the transport
//! - **Pluggable retry engine**: a generic attempt loop driven by ordered
//!   strategies (exponential backoff, server throttling hints)
//! - **Dual-endpoint retry**: read failover between a primary and a
//!   read-only secondary host
//! - **Cooperative cancellation**: one token observed by the transport, the
//!   retry delay and the retry loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blobflow::prelude::*;
//!
//! let pipeline = create_storage_pipeline(
//!     &StorageClientOptions::default().with_retry_options(
//!         StorageRetryOptions::new().with_secondary_host("account-secondary.blob.core.windows.net"),
//!     ),
//! )?;
//!
//! let request = PipelineRequest::parse(HttpMethod::Get, "https://account.blob.core.windows.net/c/b")?;
//! let response = pipeline.send_request(&client, request).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod errors;
pub mod events;
pub mod http;
pub mod pipeline;
pub mod policies;
pub mod retry;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{delay, CancellationToken};
    pub use crate::errors::{PipelineError, PolicyOrderingError, RestError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::http::{HttpClient, HttpHeaders, HttpMethod, PipelineRequest, PipelineResponse};
    pub use crate::pipeline::{
        create_pipeline_from_options, create_storage_pipeline, BearerTokenOptions, Next, Pipeline,
        PipelineOptions, PipelinePhase, PipelinePolicy, PolicyOptions, RemovePolicyOptions,
        StorageClientOptions,
    };
    pub use crate::policies::{AccessToken, TokenCredential};
    pub use crate::retry::{
        default_retry_policy, retry_policy, ExponentialRetryStrategy, ExponentialRetryStrategyOptions,
        RetryDecision, RetryInformation, RetryOptions, RetryPolicy, RetryStrategy, StorageRetryOptions,
        StorageRetryPolicy, StorageRetryPolicyType, ThrottlingRetryStrategy,
    };
}
