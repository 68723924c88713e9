//! Follows HTTP redirects.

use crate::errors::PipelineError;
use crate::http::{HttpMethod, PipelineRequest, PipelineResponse};
use crate::pipeline::{Next, PipelinePolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Options for [`RedirectPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectOptions {
    /// Maximum number of hops to follow.
    #[serde(default = "default_max_redirects")]
    pub max_retries: u32,
}

fn default_max_redirects() -> u32 {
    20
}

impl Default for RedirectOptions {
    fn default() -> Self {
        Self {
            max_retries: default_max_redirects(),
        }
    }
}

/// Follows 3xx responses that carry a `Location` header.
///
/// 300 and 307 are always followed. 301, 302 and 308 are followed for GET and
/// HEAD. A 303 to a POST is re-sent as a bodiless GET. `Authorization` is
/// removed before every hop.
#[derive(Debug, Clone, Default)]
pub struct RedirectPolicy {
    options: RedirectOptions,
}

impl RedirectPolicy {
    /// Creates the policy.
    #[must_use]
    pub fn new(options: RedirectOptions) -> Self {
        Self { options }
    }
}

fn should_follow(status: u16, method: HttpMethod) -> bool {
    let safe = matches!(method, HttpMethod::Get | HttpMethod::Head);
    match status {
        300 | 307 => true,
        301 | 302 | 308 => safe,
        303 => method == HttpMethod::Post,
        _ => false,
    }
}

#[async_trait]
impl PipelinePolicy for RedirectPolicy {
    fn name(&self) -> &str {
        "redirectPolicy"
    }

    async fn send_request(
        &self,
        request: PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, PipelineError> {
        let mut response = next.run(request).await?;
        let mut hops = 0;

        while hops < self.options.max_retries && should_follow(response.status, response.request.method) {
            let Some(location) = response.headers.get("location") else {
                break;
            };
            let Ok(target) = response.request.url.join(location) else {
                debug!(location, "Ignoring unparsable redirect location");
                break;
            };

            let mut request = response.request;
            debug!(status = response.status, from = %request.url, to = %target, "Following redirect");
            request.url = target;
            if response.status == 303 {
                request.method = HttpMethod::Get;
                request.headers.remove("Content-Length");
                request.body = None;
            }
            request.headers.remove("Authorization");

            response = next.run(request).await?;
            hops += 1;
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedHttpClient;
    use std::sync::Arc;

    fn run_policy(policy: RedirectPolicy) -> Vec<Arc<dyn PipelinePolicy>> {
        vec![Arc::new(policy)]
    }

    #[test]
    fn test_follow_rules() {
        assert!(should_follow(300, HttpMethod::Put));
        assert!(should_follow(307, HttpMethod::Post));
        assert!(should_follow(301, HttpMethod::Head));
        assert!(!should_follow(302, HttpMethod::Post));
        assert!(should_follow(308, HttpMethod::Get));
        assert!(should_follow(303, HttpMethod::Post));
        assert!(!should_follow(303, HttpMethod::Get));
        assert!(!should_follow(304, HttpMethod::Get));
    }

    #[tokio::test]
    async fn test_follows_relative_location_and_strips_authorization() {
        let client = ScriptedHttpClient::new();
        client.push_response(302, &[("Location", "/moved/blob")]).push_status(200);
        let policies = run_policy(RedirectPolicy::default());
        let request = PipelineRequest::parse(HttpMethod::Get, "https://example.com/c/blob")
            .unwrap()
            .with_header("Authorization", "Bearer secret");

        let response = Next::new(&client, &policies).run(request).await.unwrap();

        assert_eq!(response.status, 200);
        let sent = client.requests();
        assert_eq!(sent[1].url.as_str(), "https://example.com/moved/blob");
        assert!(sent[0].headers.contains("authorization"));
        assert!(!sent[1].headers.contains("authorization"));
    }

    #[tokio::test]
    async fn test_303_turns_post_into_get() {
        let client = ScriptedHttpClient::new();
        client.push_response(303, &[("location", "https://other.example.com/done")]);
        let policies = run_policy(RedirectPolicy::default());
        let request = PipelineRequest::parse(HttpMethod::Post, "https://example.com/submit")
            .unwrap()
            .with_header("Content-Length", "4")
            .with_body("data");

        Next::new(&client, &policies).run(request).await.unwrap();

        let second = &client.requests()[1];
        assert_eq!(second.method, HttpMethod::Get);
        assert!(second.body.is_none());
        assert!(!second.headers.contains("content-length"));
    }

    #[tokio::test]
    async fn test_stops_at_max_retries() {
        let client = ScriptedHttpClient::new();
        for _ in 0..5 {
            client.push_response(307, &[("Location", "/loop")]);
        }
        let policies = run_policy(RedirectPolicy::new(RedirectOptions { max_retries: 2 }));
        let request = PipelineRequest::parse(HttpMethod::Get, "https://example.com/").unwrap();

        let response = Next::new(&client, &policies).run(request).await.unwrap();

        assert_eq!(response.status, 307);
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn test_post_not_redirected_on_301() {
        let client = ScriptedHttpClient::new();
        client.push_response(301, &[("Location", "/elsewhere")]);
        let policies = run_policy(RedirectPolicy::default());
        let request = PipelineRequest::parse(HttpMethod::Post, "https://example.com/").unwrap();

        let response = Next::new(&client, &policies).run(request).await.unwrap();
        assert_eq!(response.status, 301);
        assert_eq!(client.request_count(), 1);
    }
}
