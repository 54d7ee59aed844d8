use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, Response, Url};
use serde_json::Value;
use tracing::{debug, warn};

use super::Transport;
use super::error::TransportError;

const JSON: &str = "application/json";

/// reqwest-backed [`Transport`].
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: Url, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder().user_agent(Self::user_agent());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("fequery/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Join raw segments onto the base path, percent-encoding each one.
    pub fn url(&self, path: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| TransportError::url(format!("`{}` cannot be a base", self.base)))?;
            segments.pop_if_empty();
            segments.extend(path);
        }
        Ok(url)
    }

    async fn handle(resp: Response) -> Result<Value, TransportError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(TransportError::status(status.as_u16(), text));
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| TransportError::decode(err.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &[&str],
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let url = self.url(path)?;
        debug!(%method, url = %url, has_body = body.is_some(), "Sending API request");

        let mut req = self
            .client
            .request(method.clone(), url.clone())
            .header(ACCEPT, HeaderValue::from_static(JSON))
            .header(CONTENT_TYPE, HeaderValue::from_static(JSON));
        if let Some(b) = body {
            req = req.json(&b);
        }

        let result = match req.send().await {
            Ok(resp) => Self::handle(resp).await,
            Err(err) => Err(TransportError::network(err.to_string())),
        };

        if let Err(err) = &result {
            warn!(
                %method,
                url = %url,
                status = err.status_code(),
                error = %err,
                "API request failed"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;
    use serde_json::json;

    use super::*;

    fn transport(server: &MockServer, suffix: &str) -> HttpTransport {
        let base = Url::parse(&format!("{}{suffix}", server.base_url())).expect("base url");
        HttpTransport::new(base, Some(Duration::from_secs(5))).expect("transport")
    }

    #[test]
    fn url_encodes_segments_below_base_path() {
        let base = Url::parse("http://localhost:8080/portal/api").expect("base url");
        let transport = HttpTransport::new(base, None).expect("transport");
        let url = transport.url(&["example", "Jane Doe/2"]).expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/portal/api/example/Jane%20Doe%2F2"
        );
    }

    #[test]
    fn url_tolerates_trailing_slash_on_base() {
        let base = Url::parse("http://localhost:3010/").expect("base url");
        let transport = HttpTransport::new(base, None).expect("transport");
        let url = transport.url(&["example"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:3010/example");
    }

    #[tokio::test]
    async fn sends_json_and_decodes_response() -> Result<(), TransportError> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/api/example")
                    .header("content-type", "application/json")
                    .json_body(json!({"name": "X", "age": 5}));
                then.status(201)
                    .header("content-type", "application/json")
                    .body(r#"{"ok":true}"#);
            })
            .await;

        let value = transport(&server, "/api")
            .request(Method::POST, &["example"], Some(json!({"name": "X", "age": 5})))
            .await?;
        assert_eq!(value, json!({"ok": true}));
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn empty_body_decodes_as_null() -> Result<(), TransportError> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("DELETE").path("/api/example/John");
                then.status(204);
            })
            .await;

        let value = transport(&server, "/api")
            .request(Method::DELETE, &["example", "John"], None)
            .await?;
        assert_eq!(value, Value::Null);
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_carries_code_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/api/example");
                then.status(409).body("duplicate name");
            })
            .await;

        let err = transport(&server, "/api")
            .request(Method::POST, &["example"], Some(json!({"name": "X", "age": 5})))
            .await
            .expect_err("conflict");
        assert_eq!(err, TransportError::status(409, "duplicate name"));
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/api/example");
                then.status(200).body("not json");
            })
            .await;

        let err = transport(&server, "/api")
            .request(Method::GET, &["example"], None)
            .await
            .expect_err("decode");
        assert!(matches!(err, TransportError::Decode { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let base = Url::parse("http://127.0.0.1:9/api").expect("base url");
        let transport =
            HttpTransport::new(base, Some(Duration::from_secs(2))).expect("transport");
        let err = transport
            .request(Method::GET, &["example"], None)
            .await
            .expect_err("network");
        assert!(matches!(err, TransportError::Network { .. }));
        assert_eq!(err.status_code(), None);
    }
}
