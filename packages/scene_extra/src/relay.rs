//! Development relay for cross-origin asset and API requests.
//!
//! In the browser the viewer cannot fetch from arbitrary origins during
//! local development. [`proxy_url`] folds the origin of an absolute URL into a
//! `/proxy/fetch/host=<origin>/` path on the dev server, and the relay server
//! (feature `dev-relay`) reads the origin back out and forwards the request.

use std::sync::OnceLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use thiserror::Error;

/// Origin used when a relayed path carries no readable host.
pub const DEFAULT_FALLBACK: &str = "http://localhost:8000";

const PROXY_PREFIX: &str = "/proxy/fetch/host=";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Unsupported url: {0}")]
    UnsupportedUrl(String),

    #[error("Upstream request to {url} failed: {message}")]
    Upstream { url: String, message: String },

    #[error("Relay task failed: {0}")]
    Task(String),

    #[error("Relay server error: {0}")]
    Io(#[from] std::io::Error),
}

fn origin_with_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?://.+?)/").expect("origin regex is valid"))
}

fn bare_origin() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?://.+)").expect("origin regex is valid"))
}

fn proxy_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/proxy/fetch/host=(.+?)/").expect("proxy path regex is valid"))
}

/// Bytes `encodeURIComponent` leaves alone: alphanumerics and `-_.!~*'()`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode `text` the way browsers' `encodeURIComponent` does.
pub fn encode_component(text: &str) -> String {
    utf8_percent_encode(text, COMPONENT).to_string()
}

/// Reverse of [`encode_component`]. Malformed escapes are kept as written;
/// `None` if the decoded bytes are not UTF-8.
pub fn decode_component(text: &str) -> Option<String> {
    percent_decode_str(text)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Rewrite `url` so the dev server relays it.
///
/// Absolute URLs have their origin moved into the path; root-relative URLs
/// are returned unchanged. Anything else is rejected.
pub fn proxy_url(url: &str) -> Result<String, RelayError> {
    for regex in [origin_with_path(), bare_origin()] {
        if let Some(caps) = regex.captures(url) {
            let prefix = format!("{}{}/", PROXY_PREFIX, encode_component(&caps[1]));
            return Ok(regex.replace(url, prefix.as_str()).into_owned());
        }
    }
    if url.starts_with('/') {
        return Ok(url.to_string());
    }
    Err(RelayError::UnsupportedUrl(url.to_string()))
}

/// Origin encoded in a relayed path, if it is present and non-empty.
pub fn read_host_name(path: &str) -> Option<String> {
    let caps = proxy_path().captures(path)?;
    let host = decode_component(&caps[1])?;
    (!host.is_empty()).then_some(host)
}

/// Strip the relay prefix, leaving the upstream path.
pub fn rewrite_path(path: &str) -> String {
    proxy_path().replace(path, "/").into_owned()
}

#[cfg(feature = "dev-relay")]
pub use server::serve;

#[cfg(feature = "dev-relay")]
mod server {
    use std::sync::Arc;

    use axum::body::{Body, Bytes};
    use axum::extract::State;
    use axum::http::{HeaderMap, Method, StatusCode, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::routing::any;
    use axum::Router;
    use tower_http::cors::{Any, CorsLayer};

    use super::{read_host_name, rewrite_path, RelayError};

    const HOP_HEADERS: [&str; 4] = ["host", "connection", "transfer-encoding", "content-length"];

    struct RelayState {
        agent: ureq::Agent,
        fallback: String,
    }

    impl IntoResponse for RelayError {
        fn into_response(self) -> Response {
            let status = match &self {
                RelayError::UnsupportedUrl(_) => StatusCode::BAD_REQUEST,
                RelayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
                RelayError::Task(_) | RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, self.to_string()).into_response()
        }
    }

    struct Upstream {
        status: u16,
        headers: Vec<(String, Vec<u8>)>,
        body: Vec<u8>,
    }

    /// Listen on `port` and relay `/proxy/fetch/...` requests.
    pub async fn serve(port: u16, fallback: String) -> Result<(), RelayError> {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        let state = Arc::new(RelayState {
            agent: ureq::Agent::new_with_config(config),
            fallback,
        });

        let app = Router::new()
            .route("/proxy/fetch/{*rest}", any(relay))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state);

        let addr = format!("127.0.0.1:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        log::info!("Relay listening on http://{}", addr);
        axum::serve(listener, app).await?;
        Ok(())
    }

    async fn relay(
        State(state): State<Arc<RelayState>>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, RelayError> {
        let path = uri.path();
        let (origin, upstream_path) = match read_host_name(path) {
            Some(host) => (host, rewrite_path(path)),
            None => (
                state.fallback.clone(),
                path.trim_start_matches("/proxy/fetch").to_string(),
            ),
        };
        let mut url = format!("{}{}", origin.trim_end_matches('/'), upstream_path);
        if let Some(query) = uri.query() {
            url.push('?');
            url.push_str(query);
        }
        log::debug!("{} {} -> {}", method, path, url);

        let forwarded: Vec<(String, Vec<u8>)> = headers
            .iter()
            .filter(|(name, _)| !HOP_HEADERS.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        let upstream = tokio::task::spawn_blocking(move || {
            forward(&state.agent, method.as_str(), &url, forwarded, body.to_vec())
        })
        .await
        .map_err(|e| RelayError::Task(e.to_string()))??;

        let mut response = Response::builder().status(upstream.status);
        for (name, value) in &upstream.headers {
            if !HOP_HEADERS.contains(&name.as_str()) {
                response = response.header(name.as_str(), value.as_slice());
            }
        }
        response
            .body(Body::from(upstream.body))
            .map_err(|e| RelayError::Task(e.to_string()))
    }

    fn forward(
        agent: &ureq::Agent,
        method: &str,
        url: &str,
        headers: Vec<(String, Vec<u8>)>,
        body: Vec<u8>,
    ) -> Result<Upstream, RelayError> {
        let upstream_error = |message: String| RelayError::Upstream {
            url: url.to_string(),
            message,
        };

        let mut request = ureq::http::Request::builder().method(method).uri(url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_slice());
        }
        let request = request.body(body).map_err(|e| upstream_error(e.to_string()))?;

        let response = agent.run(request).map_err(|e| upstream_error(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();
        let body = response
            .into_body()
            .read_to_vec()
            .map_err(|e| upstream_error(e.to_string()))?;

        Ok(Upstream {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url_with_path() {
        let url = proxy_url("https://example.com/api/data?x=1").unwrap();
        assert_eq!(url, "/proxy/fetch/host=https%3A%2F%2Fexample.com/api/data?x=1");
    }

    #[test]
    fn test_bare_origin() {
        let url = proxy_url("http://localhost:9000").unwrap();
        assert_eq!(url, "/proxy/fetch/host=http%3A%2F%2Flocalhost%3A9000/");
    }

    #[test]
    fn test_relative_and_unsupported() {
        assert_eq!(proxy_url("/assets/model.glb").unwrap(), "/assets/model.glb");
        assert!(matches!(
            proxy_url("assets/model.glb"),
            Err(RelayError::UnsupportedUrl(_))
        ));
    }

    #[test]
    fn test_server_side_parsing() {
        let path = proxy_url("https://example.com/a/b").unwrap();
        assert_eq!(read_host_name(&path).as_deref(), Some("https://example.com"));
        assert_eq!(rewrite_path(&path), "/a/b");
        assert!(read_host_name("/proxy/fetch/other").is_none());
        assert!(read_host_name("/proxy/fetch/host=%FF/a").is_none());
    }

    #[test]
    fn test_component_encoding() {
        assert_eq!(encode_component("a b/é"), "a%20b%2F%C3%A9");
        assert_eq!(decode_component("a%20b%2F%C3%A9").as_deref(), Some("a b/é"));
        assert_eq!(encode_component("it's (ok)!"), "it's%20(ok)!");
        assert_eq!(decode_component("%4").as_deref(), Some("%4"));
        assert!(decode_component("%FF").is_none());
    }
}
