//! Standard pipeline policies.
//!
//! This module provides:
//! - RequestIdPolicy and UserAgentPolicy for request stamping
//! - RedirectPolicy for following 3xx responses
//! - LogPolicy for redacted request/response logging
//! - BearerTokenPolicy for token authentication

mod bearer_token;
mod log;
mod redirect;
mod request_id;
mod user_agent;

pub use bearer_token::{AccessToken, BearerTokenPolicy, TokenCredential, REFRESH_WINDOW_SECONDS};
pub use log::{LogOptions, LogPolicy, Sanitizer, REDACTED};
pub use redirect::{RedirectOptions, RedirectPolicy};
pub use request_id::{RequestIdPolicy, CLIENT_REQUEST_ID_HEADER};
pub use user_agent::{user_agent_value, UserAgentOptions, UserAgentPolicy, USER_AGENT_HEADER};
