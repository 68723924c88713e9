//! HTTP value types and the transport contract.
//!
//! The dispatch core never talks to the network itself. It builds
//! [`PipelineRequest`] values, hands them through the policy chain and finally
//! to an [`HttpClient`].

mod client;
mod headers;
mod method;
mod request;
mod response;

#[cfg(feature = "reqwest")]
mod reqwest_client;

pub use client::HttpClient;
#[cfg(test)]
pub use client::MockHttpClient;
pub use headers::HttpHeaders;
pub use method::{HttpMethod, InvalidMethodError};
pub use request::PipelineRequest;
pub use response::PipelineResponse;

#[cfg(feature = "reqwest")]
pub use reqwest_client::ReqwestHttpClient;
