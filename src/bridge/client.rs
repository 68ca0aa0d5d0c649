use std::time::Duration;

use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::Value;

/// Who a tool session acts for. Captured once per session and passed to
/// every call; never stored globally.
#[derive(Clone, PartialEq, Eq)]
pub enum ToolAuth {
    /// User JWT, forwarded as `Authorization: Bearer`.
    Bearer(String),
    /// Trusted service call, forwarded as `X-Organization-ID`.
    OrganizationId(String),
}

impl std::fmt::Debug for ToolAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolAuth::Bearer(_) => f.write_str("Bearer(***)"),
            ToolAuth::OrganizationId(org) => write!(f, "OrganizationId({})", org),
        }
    }
}

impl ToolAuth {
    /// A raw session token: JWTs contain dots, organization ids do not.
    pub fn from_token(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else if raw.contains('.') {
            Some(ToolAuth::Bearer(raw.to_string()))
        } else {
            Some(ToolAuth::OrganizationId(raw.to_string()))
        }
    }

    /// Bearer header first, then `X-Organization-ID`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if let Some(token) = bearer {
            return Some(ToolAuth::Bearer(token.to_string()));
        }
        headers
            .get("x-organization-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|org| ToolAuth::OrganizationId(org.to_string()))
    }

    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            ToolAuth::Bearer(token) => request.bearer_auth(token),
            ToolAuth::OrganizationId(org) => request.header("X-Organization-ID", org),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    #[error("integrations API timed out: {0}")]
    Timeout(String),
    #[error("integrations API unreachable: {0}")]
    Connect(String),
    #[error("integrations API call failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for DownstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownstreamError::Timeout(err.to_string())
        } else if err.is_connect() {
            DownstreamError::Connect(err.to_string())
        } else {
            DownstreamError::Other(err.to_string())
        }
    }
}

/// Status plus body of a downstream call. Non-JSON bodies become `Null`.
#[derive(Debug, Clone)]
pub struct Downstream {
    pub status: u16,
    pub body: Value,
}

impl Downstream {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `error.message` from an API error body, if present.
    pub fn error_message(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
    }
}

/// HTTP client for the integrations API the tools are built on.
#[derive(Clone)]
pub struct IntegrationsClient {
    http: reqwest::Client,
    base_url: String,
}

impl IntegrationsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn get(&self, auth: &ToolAuth, path: &str) -> Result<Downstream, DownstreamError> {
        let request = auth.apply(self.http.get(format!("{}{}", self.base_url, path)));
        Self::finish(request).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        auth: &ToolAuth,
        path: &str,
        body: &B,
    ) -> Result<Downstream, DownstreamError> {
        let request = auth.apply(
            self.http
                .post(format!("{}{}", self.base_url, path))
                .json(body),
        );
        Self::finish(request).await
    }

    async fn finish(request: reqwest::RequestBuilder) -> Result<Downstream, DownstreamError> {
        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(Downstream { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_shape_selects_header() {
        assert_eq!(
            ToolAuth::from_token("eyJhbGciOi.eyJzdWIi.sig"),
            Some(ToolAuth::Bearer("eyJhbGciOi.eyJzdWIi.sig".into()))
        );
        assert_eq!(
            ToolAuth::from_token("6f1c2d3e-0000-4000-8000-1234567890ab"),
            Some(ToolAuth::OrganizationId(
                "6f1c2d3e-0000-4000-8000-1234567890ab".into()
            ))
        );
        assert_eq!(ToolAuth::from_token("  "), None);
    }

    #[test]
    fn test_headers_prefer_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-organization-id", HeaderValue::from_static("org-1"));
        assert_eq!(
            ToolAuth::from_headers(&headers),
            Some(ToolAuth::OrganizationId("org-1".into()))
        );

        headers.insert("authorization", HeaderValue::from_static("Bearer a.b.c"));
        assert_eq!(
            ToolAuth::from_headers(&headers),
            Some(ToolAuth::Bearer("a.b.c".into()))
        );
        assert_eq!(format!("{:?}", ToolAuth::Bearer("a.b.c".into())), "Bearer(***)");
    }
}
