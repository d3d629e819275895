use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::BureauConfig;

/// Remote provider of borrower credit data, keyed by the digits-only CPF.
pub trait BureauClient: Send + Sync {
    /// Raw credit score; negative or fractional values are passed through for the policy
    /// threshold to judge.
    fn score(&self, cpf: &str) -> Result<i64, BureauError>;
    /// Fraction of monthly income already committed to other debt, in `[0, 1]`.
    fn commitment(&self, cpf: &str) -> Result<f64, BureauError>;
}

/// Failure reaching or reading the bureau.
#[derive(Debug, thiserror::Error)]
pub enum BureauError {
    #[error("bureau unreachable: {0}")]
    Transport(String),
    #[error("bureau returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("bureau response could not be decoded: {0}")]
    Decode(String),
    #[error("bureau response has no usable '{0}' field")]
    MissingField(&'static str),
}

#[derive(Debug, Serialize)]
struct BureauRequest<'a> {
    cpf: &'a str,
}

/// Blocking HTTPS client for the score and commitment endpoints.
pub struct HttpBureauClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpBureauClient {
    pub fn new(config: &BureauConfig) -> Result<Self, BureauError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|err| BureauError::Transport(format!("invalid api key header: {err}")))?;
            headers.insert("x-api-key", value);
        }

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| BureauError::Transport(err.to_string()))?;

        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, field: &'static str, cpf: &str) -> Result<Value, BureauError> {
        let url = format!("{}{}", self.base_url, field);
        debug!(%url, "requesting bureau {field}");

        let response = self
            .client
            .post(&url)
            .json(&BureauRequest { cpf })
            .send()
            .map_err(|err| BureauError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BureauError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .map_err(|err| BureauError::Decode(err.to_string()))?;
        debug!(%payload, "bureau {field} response");

        payload
            .get(field)
            .cloned()
            .ok_or(BureauError::MissingField(field))
    }
}

impl BureauClient for HttpBureauClient {
    fn score(&self, cpf: &str) -> Result<i64, BureauError> {
        let score = self.request("score", cpf)?;
        score
            .as_i64()
            .or_else(|| {
                score
                    .as_f64()
                    .filter(|raw| raw.is_finite())
                    .map(|raw| raw.floor() as i64)
            })
            .ok_or(BureauError::MissingField("score"))
    }

    fn commitment(&self, cpf: &str) -> Result<f64, BureauError> {
        self.request("commitment", cpf)?
            .as_f64()
            .filter(|ratio| (0.0..=1.0).contains(ratio))
            .ok_or(BureauError::MissingField("commitment"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> BureauConfig {
        BureauConfig {
            base_url: server.uri(),
            api_key: Some("test-key".to_string()),
            timeout: Duration::from_secs(2),
        }
    }

    // The blocking client owns its own runtime, so it is driven from the blocking pool.
    async fn call<T, F>(config: BureauConfig, f: F) -> Result<T, BureauError>
    where
        T: Send + 'static,
        F: FnOnce(&HttpBureauClient) -> Result<T, BureauError> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let client = HttpBureauClient::new(&config)?;
            f(&client)
        })
        .await
        .expect("blocking task joins")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn score_posts_cpf_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/score"))
            .and(header("x-api-key", "test-key"))
            .and(body_json(serde_json::json!({ "cpf": "07724426067" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "score": 800 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let score = call(config_for(&server), |client| client.score("07724426067"))
            .await
            .expect("score fetched");
        assert_eq!(score, 800);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commitment_returns_ratio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/commitment"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "commitment": 0.8 })),
            )
            .mount(&server)
            .await;

        let ratio = call(config_for(&server), |client| client.commitment("07724426067"))
            .await
            .expect("commitment fetched");
        assert_eq!(ratio, 0.8);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/score"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = call(config_for(&server), |client| client.score("07724426067"))
            .await
            .unwrap_err();
        match err {
            BureauError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_field_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/score"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "rating": "A" })),
            )
            .mount(&server)
            .await;

        let err = call(config_for(&server), |client| client.score("07724426067"))
            .await
            .unwrap_err();
        assert!(matches!(err, BureauError::MissingField("score")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn negative_and_fractional_scores_are_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/score"))
            .and(body_json(serde_json::json!({ "cpf": "00000000001" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "score": -20 })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/score"))
            .and(body_json(serde_json::json!({ "cpf": "00000000002" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "score": 650.7 })),
            )
            .mount(&server)
            .await;

        let scores = call(config_for(&server), |client| {
            Ok((client.score("00000000001")?, client.score("00000000002")?))
        })
        .await
        .expect("scores fetched");
        assert_eq!(scores, (-20, 650));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = BureauConfig {
            base_url: "https://bureau.example".to_string(),
            ..BureauConfig::default()
        };
        let client = HttpBureauClient::new(&config).expect("client builds");
        assert_eq!(client.base_url(), "https://bureau.example/");
    }
}
