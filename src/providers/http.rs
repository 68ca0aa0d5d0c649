use std::time::Duration;

use reqwest::Response;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

use super::ProviderError;

/// Longest vendor body kept in an error message.
const MAX_ERROR_BODY: usize = 2048;

/// Shared HTTP plumbing for vendor calls.
///
/// `client` sends writes exactly once: a create call that times out may
/// already have succeeded on the vendor side. `reads` wraps the same pool with
/// retry on transient failures and is only used for idempotent GETs.
#[derive(Clone)]
pub struct VendorHttp {
    client: reqwest::Client,
    reads: ClientWithMiddleware,
}

impl VendorHttp {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(16)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let reads = ClientBuilder::new(client.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client, reads })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn reads(&self) -> &ClientWithMiddleware {
        &self.reads
    }

    /// Send a single-shot request and classify the outcome.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ProviderError> {
        let resp = request.send().await.map_err(classify_transport)?;
        check_status(resp).await
    }

    /// Send an idempotent request through the retrying client.
    pub async fn send_read(
        &self,
        request: reqwest_middleware::RequestBuilder,
    ) -> Result<Response, ProviderError> {
        let resp = request.send().await.map_err(|e| match e {
            reqwest_middleware::Error::Reqwest(inner) => classify_transport(inner),
            reqwest_middleware::Error::Middleware(inner) => {
                ProviderError::Transient(inner.to_string())
            }
        })?;
        check_status(resp).await
    }
}

fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Transient(format!("request timed out: {}", err))
    } else if err.is_connect() {
        ProviderError::Transient(format!("connection failed: {}", err))
    } else {
        ProviderError::Transient(err.to_string())
    }
}

/// 2xx passes through; 401 is `Unauthorized`; other 4xx keep the vendor body;
/// 5xx is transient.
pub async fn check_status(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ProviderError::Unauthorized);
    }

    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    if status.is_server_error() {
        Err(ProviderError::Transient(format!(
            "vendor returned {}: {}",
            status.as_u16(),
            body
        )))
    } else {
        Err(ProviderError::Vendor {
            status: status.as_u16(),
            body,
        })
    }
}

pub async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, ProviderError> {
    resp.json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> VendorHttp {
        VendorHttp::new(Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/unauthorized"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rejected"))
            .respond_with(ResponseTemplate::new(422).set_body_string("{\"message\":\"bad topic\"}"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let http = http();
        let call = |p: &str| http.send(http.client().post(format!("{}{}", server.uri(), p)));

        assert!(matches!(call("/unauthorized").await, Err(ProviderError::Unauthorized)));
        match call("/rejected").await {
            Err(ProviderError::Vendor { status, body }) => {
                assert_eq!(status, 422);
                assert!(body.contains("bad topic"));
            }
            other => panic!("expected vendor error, got {:?}", other.map(|r| r.status())),
        }
        assert!(matches!(call("/down").await, Err(ProviderError::Transient(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let http = http();
        let err = http
            .send(http.client().post(format!("{}/slow", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transient(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let http = http();
        let err = http
            .send(http.client().post("http://127.0.0.1:1/nothing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transient(_)));
    }
}
