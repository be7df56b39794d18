//! # Routinator Validity Client
//!
//! Asks a Routinator instance whether an origin AS may announce a prefix:
//! `GET <scheme>://<host>/<path>?asn=<ASN>&prefix=<CIDR>`.
//!
//! Construction probes the endpoint once. A Routinator that is still running
//! its first validation pass answers every query as if no ROA existed, which
//! would classify every route as valid, so such an instance is refused.
//!
//! Lookups never fail: transport errors, non-2xx answers and unexpected bodies
//! all become [`Verdict::Unknown`] and are logged here.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ingestion::OriginValidator;
use crate::protocol::validity::{ValidatedMessage, Verdict, WARMING_UP_BODY};
use crate::retrieve::ky_http::{ApiClient, ClientOptions};

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("invalid validator endpoint: {0:#}")]
    InvalidEndpoint(#[from] anyhow::Error),
    #[error("validator at {0} is still running its initial validation")]
    WarmingUp(String),
    #[error("validator at {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },
}

/// Where the validity endpoint lives, as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorEndpoint {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

impl Default for ValidatorEndpoint {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "127.0.0.1:8323".to_string(),
            path: "validity".to_string(),
        }
    }
}

impl ValidatorEndpoint {
    pub fn to_url(&self) -> String {
        format!("{}://{}/{}", self.scheme, self.host, self.path.trim_start_matches('/'))
    }
}

pub struct RoutinatorValidator {
    client: ApiClient,
}

impl RoutinatorValidator {
    /// Builds the client and checks that the endpoint is ready.
    pub async fn connect(endpoint: &ValidatorEndpoint, options: &ClientOptions) -> Result<Self, ValidatorError> {
        let client = ApiClient::new(&endpoint.to_url(), options)?;
        let validator = Self { client };
        validator.check_url().await?;
        log::info!("Using RPKI validator at {}", validator.client.base_url());
        Ok(validator)
    }

    async fn check_url(&self) -> Result<(), ValidatorError> {
        let url = self.client.base_url().to_string();
        let response = self
            .client
            .get_text(&[("asn", ""), ("prefix", "")])
            .await
            .map_err(|e| ValidatorError::Unreachable { url: url.clone(), reason: format!("{:#}", e) })?;

        let body = response.data.or(response.error_body).unwrap_or_default();
        if body.trim() == WARMING_UP_BODY {
            log::error!("Validator at {} is not ready yet, it may still be initialising", url);
            return Err(ValidatorError::WarmingUp(url));
        }
        Ok(())
    }
}

impl OriginValidator for RoutinatorValidator {
    fn validate(&self, origin_asn: &str, prefix: &str) -> impl Future<Output = Verdict> + Send {
        async move {
            let query = [("asn", origin_asn), ("prefix", prefix)];
            match self.client.get_json::<ValidatedMessage>(&query).await {
                Ok(response) if response.success => {
                    let verdict = response.data.map_or(Verdict::Unknown, |message| message.verdict());
                    if verdict == Verdict::Unknown {
                        log::warn!("No validity state for AS{} {}", origin_asn, prefix);
                    }
                    verdict
                }
                Ok(response) => {
                    log::warn!(
                        "Validator answered {} for AS{} {}: {}",
                        response.status,
                        origin_asn,
                        prefix,
                        response.error_body.unwrap_or_default().trim()
                    );
                    Verdict::Unknown
                }
                Err(e) => {
                    log::error!("Validation of AS{} {} failed: {:#}", origin_asn, prefix, e);
                    Verdict::Unknown
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serves one canned response per connection, in order, and returns the
    /// request lines it saw.
    fn serve(responses: Vec<(u16, &'static str)>) -> (ValidatorEndpoint, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();
        let endpoint = ValidatorEndpoint {
            scheme: "http".into(),
            host: format!("127.0.0.1:{}", port),
            path: "/validity".into(),
        };

        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let request = String::from_utf8_lossy(&request);
                seen.push(request.lines().next().unwrap_or_default().to_string());

                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
            seen
        });

        (endpoint, handle)
    }

    #[tokio::test]
    async fn test_verdicts_from_mocked_oracle() {
        let (endpoint, server) = serve(vec![
            (200, r#"{"validated_route":{"route":{},"validity":{"state":"not-found"}}}"#),
            (200, r#"{"validated_route":{"validity":{"state":"invalid","reason":"as"}}}"#),
            (200, r#"{"validated_route":{"validity":{"state":"valid"}}}"#),
            (200, r#"{"validated_route":{"validity":{"state":"not-found"}}}"#),
            (500, "internal error"),
            (200, "<html>not json</html>"),
            (200, r#"{"unexpected":true}"#),
        ]);

        let validator = RoutinatorValidator::connect(&endpoint, &ClientOptions::default()).await.unwrap();
        assert_eq!(validator.validate("12345", "91.203.20.0/24").await, Verdict::Invalid);
        assert_eq!(validator.validate("8393", "91.203.20.0/24").await, Verdict::Valid);
        assert_eq!(validator.validate("50131", "45.43.29.0/24").await, Verdict::Valid);
        assert_eq!(validator.validate("64496", "10.0.0.0/24").await, Verdict::Unknown);
        assert_eq!(validator.validate("64496", "10.0.0.0/24").await, Verdict::Unknown);
        assert_eq!(validator.validate("64496", "10.0.0.0/24").await, Verdict::Unknown);

        let seen = server.join().unwrap();
        assert_eq!(seen.len(), 7);
        assert!(seen[0].starts_with("GET /validity?asn=&prefix= "), "probe was {}", seen[0]);
        assert!(seen[1].contains("asn=12345"), "request was {}", seen[1]);
        assert!(seen[1].contains("prefix=91.203.20.0%2F24"), "request was {}", seen[1]);
    }

    #[tokio::test]
    async fn test_warming_up_oracle_is_refused() {
        let (endpoint, server) = serve(vec![(503, WARMING_UP_BODY)]);
        let result = RoutinatorValidator::connect(&endpoint, &ClientOptions::default()).await;
        assert!(matches!(result, Err(ValidatorError::WarmingUp(_))));
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_oracle_is_refused() {
        // Grab a free port, then close it again.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let endpoint = ValidatorEndpoint { host: format!("127.0.0.1:{}", port), ..Default::default() };
        let result = RoutinatorValidator::connect(&endpoint, &ClientOptions::default()).await;
        assert!(matches!(result, Err(ValidatorError::Unreachable { .. })));
    }

    #[test]
    fn test_endpoint_url() {
        let endpoint = ValidatorEndpoint {
            scheme: "https".into(),
            host: "rpki.example.net".into(),
            path: "/api/v1/validity".into(),
        };
        assert_eq!(endpoint.to_url(), "https://rpki.example.net/api/v1/validity");
        assert_eq!(ValidatorEndpoint::default().to_url(), "http://127.0.0.1:8323/validity");
    }
}
