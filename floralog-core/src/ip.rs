//! Best-effort submitter IP lookup.
//!
//! A single GET to an external echo service. Any failure (transport,
//! timeout, malformed body) yields `None` with a warning; ingestion never
//! blocks on it.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::Result;

const DEFAULT_ENDPOINT: &str = "https://api.ipify.org?format=json";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

pub struct IpLookup {
    client: Client,
    endpoint: String,
}

impl IpLookup {
    pub fn new() -> Result<Self> {
        let endpoint =
            std::env::var("FLORALOG_IP_LOOKUP_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self::with_endpoint(endpoint)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// The client's external IP, or `None` when the lookup fails.
    #[instrument(level = "debug", skip(self), fields(endpoint = %self.endpoint))]
    pub async fn current_ip(&self) -> Option<String> {
        let response = match self.client.get(&self.endpoint).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "IP lookup failed, proceeding without");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "IP lookup returned non-success");
            return None;
        }

        match response.json::<IpResponse>().await {
            Ok(body) => {
                debug!(ip = %body.ip, "resolved submitter IP");
                Some(body.ip)
            }
            Err(e) => {
                warn!(error = %e, "malformed IP lookup response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape_parses() {
        let body: IpResponse = serde_json::from_str(r#"{"ip":"203.0.113.7"}"#).expect("parse");
        assert_eq!(body.ip, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_none() {
        // Reserved TEST-NET address, nothing listens there.
        let lookup = IpLookup::with_endpoint("http://192.0.2.1:1/ip").expect("client");
        assert!(lookup.current_ip().await.is_none());
    }
}
