//! HTTP registry client.

use std::time::{Duration, SystemTime};

use graphref_types::GraphRef;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::{content_hash, FetchError, RegistryClient, SchemaSnapshot};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA_QUERY: &str = "\
query SchemaForVariant($graphId: ID!, $variant: String!) {
  variant(graphId: $graphId, tag: $variant) {
    schema { document hash }
    minPollIntervalSecs
  }
}";

/// Registry client speaking the registry's GraphQL HTTP API.
///
/// One `fetch_schema` call is one POST; retries and caching live in the
/// resolver, not here.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
    /// Built once so fetches share the connection pool.
    client: reqwest::Client,
}

impl HttpRegistryClient {
    /// Create a client for the registry at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            client,
        }
    }

    /// Add a header sent with every request (e.g. `authorization`).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self, graph_ref: &GraphRef) -> Result<SchemaSnapshot, FetchError> {
        let body = json!({
            "query": SCHEMA_QUERY,
            "variables": {
                "graphId": graph_ref.graph_id(),
                "variant": graph_ref.variant(),
            },
        });

        let mut request = self.client.post(&self.url).json(&body).timeout(self.timeout);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                FetchError::Network(e.to_string())
            } else {
                FetchError::Network(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if let Some(error) = classify_status(status.as_u16(), graph_ref) {
            return Err(error);
        }

        let payload: ResponsePayload = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        let snapshot = parse_payload(payload, graph_ref, SystemTime::now())?;
        debug!(
            graph_ref = %graph_ref,
            hash = %snapshot.hash(),
            "fetched schema snapshot"
        );
        Ok(snapshot)
    }
}

impl RegistryClient for HttpRegistryClient {
    fn fetch_schema(
        &self,
        graph_ref: &GraphRef,
    ) -> impl std::future::Future<Output = Result<SchemaSnapshot, FetchError>> + Send {
        self.fetch(graph_ref)
    }
}

/// Map a non-success HTTP status to a fetch error. `None` means success.
fn classify_status(status: u16, graph_ref: &GraphRef) -> Option<FetchError> {
    match status {
        200..=299 => None,
        401 | 403 => Some(FetchError::Unauthorized),
        404 => Some(FetchError::NotFound {
            graph_ref: graph_ref.to_string(),
        }),
        status => Some(FetchError::Server {
            status,
            message: format!("unexpected status {status}"),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    variant: Option<VariantData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantData {
    schema: SchemaDocument,
    min_poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    document: String,
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
    #[serde(default)]
    extensions: ErrorExtensions,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorExtensions {
    code: Option<String>,
}

/// Interpret a decoded response body.
///
/// GraphQL-level errors are classified by their `extensions.code`, matching
/// the registry's error vocabulary.
fn parse_payload(
    payload: ResponsePayload,
    graph_ref: &GraphRef,
    fetched_at: SystemTime,
) -> Result<SchemaSnapshot, FetchError> {
    if let Some(error) = payload.errors.first() {
        return Err(match error.extensions.code.as_deref() {
            Some("AUTHENTICATION_FAILED" | "ACCESS_DENIED") => FetchError::Unauthorized,
            Some("UNKNOWN_REF") => FetchError::NotFound {
                graph_ref: graph_ref.to_string(),
            },
            Some("RETRY_LATER") => FetchError::Server {
                status: 503,
                message: error.message.clone(),
            },
            _ => FetchError::Malformed(error.message.clone()),
        });
    }

    let variant = payload
        .data
        .and_then(|data| data.variant)
        .ok_or_else(|| FetchError::NotFound {
            graph_ref: graph_ref.to_string(),
        })?;

    let hash = variant
        .schema
        .hash
        .unwrap_or_else(|| content_hash(&variant.schema.document));
    let mut snapshot =
        SchemaSnapshot::new(graph_ref.clone(), variant.schema.document, hash, fetched_at);
    if let Some(secs) = variant.min_poll_interval_secs {
        snapshot = snapshot.with_min_poll_interval(Duration::from_secs(secs));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_ref() -> GraphRef {
        "my-service@current".parse().unwrap()
    }

    fn decode(body: &str) -> ResponsePayload {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_builder_headers_and_timeout() {
        let client = HttpRegistryClient::new("https://registry.example/api")
            .with_header("authorization", "Bearer token")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(client.url(), "https://registry.example/api");
        assert_eq!(client.headers.len(), 1);
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200, &graph_ref()), None);
        assert_eq!(classify_status(401, &graph_ref()), Some(FetchError::Unauthorized));
        assert_eq!(classify_status(403, &graph_ref()), Some(FetchError::Unauthorized));
        assert!(matches!(
            classify_status(404, &graph_ref()),
            Some(FetchError::NotFound { .. })
        ));
        assert!(matches!(
            classify_status(500, &graph_ref()),
            Some(FetchError::Server { status: 500, .. })
        ));
    }

    #[test]
    fn test_parse_successful_payload() {
        let payload = decode(
            r#"{"data":{"variant":{"schema":{"document":"type Query { a: Int }","hash":"abc123"},"minPollIntervalSecs":60}}}"#,
        );
        let snapshot = parse_payload(payload, &graph_ref(), SystemTime::now()).unwrap();
        assert_eq!(snapshot.hash().as_ref(), "abc123");
        assert_eq!(snapshot.min_poll_interval(), Some(Duration::from_secs(60)));
        assert!(snapshot.schema().types.contains_key("Query"));
    }

    #[test]
    fn test_parse_payload_hashes_when_missing() {
        let payload = decode(
            r#"{"data":{"variant":{"schema":{"document":"type Query { a: Int }"}}}}"#,
        );
        let snapshot = parse_payload(payload, &graph_ref(), SystemTime::now()).unwrap();
        assert_eq!(
            snapshot.hash().as_ref(),
            content_hash("type Query { a: Int }")
        );
    }

    #[test]
    fn test_parse_unknown_ref_error() {
        let payload = decode(
            r#"{"data":null,"errors":[{"message":"no such variant","extensions":{"code":"UNKNOWN_REF"}}]}"#,
        );
        let err = parse_payload(payload, &graph_ref(), SystemTime::now()).unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn test_parse_auth_error() {
        let payload = decode(
            r#"{"data":null,"errors":[{"message":"bad key","extensions":{"code":"AUTHENTICATION_FAILED"}}]}"#,
        );
        let err = parse_payload(payload, &graph_ref(), SystemTime::now()).unwrap_err();
        assert_eq!(err, FetchError::Unauthorized);
    }

    #[test]
    fn test_parse_retry_later_is_retryable() {
        let payload = decode(
            r#"{"data":null,"errors":[{"message":"busy","extensions":{"code":"RETRY_LATER"}}]}"#,
        );
        let err = parse_payload(payload, &graph_ref(), SystemTime::now()).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_missing_variant_is_not_found() {
        let payload = decode(r#"{"data":{"variant":null}}"#);
        let err = parse_payload(payload, &graph_ref(), SystemTime::now()).unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }
}
