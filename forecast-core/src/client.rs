//! Bounded HTTP client: one GET, one deadline, structured failures.

use std::{future::Future, time::Duration};

use reqwest::{Client, header::USER_AGENT};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{FetchError, HttpError};
use crate::validate::Shape;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status reported by [`HttpClient::ping`] when no response was received.
pub const PING_FAILED: u16 = 0;

#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    http: Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    /// GET `url` and return the body as untyped JSON.
    ///
    /// `header`, when non-empty, is sent as `User-Agent`. The deadline covers
    /// the whole exchange including reading the body; when it elapses the
    /// request is dropped and a 408 [`HttpError`] is returned.
    #[instrument(skip(self, header), level = "debug")]
    pub async fn get_json(
        &self,
        url: &str,
        header: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        with_deadline(url, timeout, self.exchange(url, header)).await
    }

    /// GET `url` and check the body against `T`'s shape.
    pub async fn get_validated<T: Shape>(
        &self,
        url: &str,
        header: Option<&str>,
        timeout: Duration,
    ) -> Result<T, FetchError> {
        let raw = self.get_json(url, header, timeout).await?;
        Ok(T::from_value(&raw)?)
    }

    /// Status code of a plain GET to `url`, or [`PING_FAILED`] when the
    /// request could not complete.
    pub async fn ping(&self, url: &str, timeout: Duration) -> u16 {
        match tokio::time::timeout(timeout, self.http.get(url).send()).await {
            Ok(Ok(res)) => res.status().as_u16(),
            Ok(Err(err)) => {
                debug!(url, error = %err, "ping failed");
                PING_FAILED
            }
            Err(_) => {
                debug!(url, timeout_ms = timeout.as_millis() as u64, "ping timed out");
                PING_FAILED
            }
        }
    }

    async fn exchange(&self, url: &str, header: Option<&str>) -> Result<Value, FetchError> {
        let mut req = self.http.get(url);
        if let Some(agent) = header.filter(|h| !h.is_empty()) {
            req = req.header(USER_AGENT, agent);
        }

        let res = req.send().await?;
        let status = res.status();

        if !status.is_success() {
            let status = status.as_u16();
            let err = match res.bytes().await {
                Ok(body) => error_from_body(status, &body, url),
                Err(err) => {
                    debug!(url, error = %err, "could not read error body");
                    HttpError::new(status, format!("HTTP Error: {status}")).with_url(url)
                }
            };
            return Err(err.into());
        }

        let body = res.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Run `exchange` under a single deadline. The timer belongs to the returned
/// future and is gone once it resolves, whichever way it resolves.
async fn with_deadline<F>(url: &str, timeout: Duration, exchange: F) -> Result<Value, FetchError>
where
    F: Future<Output = Result<Value, FetchError>>,
{
    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_elapsed) => Err(timeout_error(url, timeout).into()),
    }
}

fn timeout_error(url: &str, timeout: Duration) -> HttpError {
    HttpError::new(408, "Request timeout")
        .with_title("Request Timeout")
        .with_detail(format!("Request to {url} timed out after {}ms", timeout.as_millis()))
        .with_url(url)
}

/// Build an [`HttpError`] from a non-success response body.
fn error_from_body(status: u16, body: &[u8], url: &str) -> HttpError {
    let Ok(parsed) = serde_json::from_slice::<Value>(body) else {
        return HttpError::new(status, format!("HTTP Error: {status}")).with_url(url);
    };

    let Some(fields) = ErrorBody::from_value(&parsed) else {
        return HttpError::new(status, format!("HTTP {status}: Unknown error format"))
            .with_detail("Unknown error")
            .with_url(url);
    };

    if let Some(title) = fields.title.filter(|t| !t.is_empty()) {
        let detail = fields.detail.clone().unwrap_or_default();
        let mut err = HttpError::new(status, format!("{title}: {detail}")).with_title(title).with_url(url);
        if let Some(detail) = fields.detail {
            err = err.with_detail(detail);
        }
        if let Some(id) = fields.correlation_id {
            err = err.with_correlation_id(id);
        }
        return err;
    }

    let detail = [fields.detail, fields.message]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown error".to_string());

    HttpError::new(status, format!("HTTP {status}: {detail}")).with_detail(detail).with_url(url)
}

/// Problem-details style error body. Every field is optional but must be a
/// string when present.
#[derive(Debug, Default, PartialEq, Eq)]
struct ErrorBody {
    title: Option<String>,
    detail: Option<String>,
    message: Option<String>,
    correlation_id: Option<String>,
}

impl ErrorBody {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let field = |key: &str| -> Option<Option<String>> {
            match obj.get(key) {
                None => Some(None),
                Some(Value::String(s)) => Some(Some(s.clone())),
                Some(_) => None,
            }
        };

        Some(Self {
            title: field("title")?,
            detail: field("detail")?,
            message: field("message")?,
            correlation_id: field("correlationId")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::validate::{self, Checker};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    #[derive(Debug, PartialEq)]
    struct Thing {
        id: f64,
        name: String,
    }

    impl Shape for Thing {
        fn from_value(value: &Value) -> Result<Self, ValidationError> {
            let mut c = Checker::new();
            let out = validate::object(&mut c, value).and_then(|obj| {
                let id = c.field(obj, "id", validate::number);
                let name = c.field(obj, "name", validate::string);
                Some(Thing { id: id?, name: name? })
            });
            c.finish(out)
        }
    }

    async fn server_returning(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    async fn fetch_error(template: ResponseTemplate) -> HttpError {
        let server = server_returning(template).await;
        let url = format!("{}/thing", server.uri());

        match HttpClient::new().get_json(&url, None, DEFAULT_TIMEOUT).await {
            Err(FetchError::Http(err)) => {
                assert_eq!(err.url.as_deref(), Some(url.as_str()));
                err
            }
            other => panic!("expected HttpError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_validated_returns_typed_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .and(header("User-Agent", "Test-Agent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "name": "Test" })))
            .expect(1)
            .mount(&server)
            .await;

        let thing: Thing = HttpClient::new()
            .get_validated(&format!("{}/thing", server.uri()), Some("Test-Agent"), DEFAULT_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(thing, Thing { id: 1.0, name: "Test".into() });
    }

    #[tokio::test]
    async fn empty_header_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .respond_with(|req: &Request| {
                let agent = req.headers.get("user-agent").map(|v| v.to_str().unwrap_or("").to_string());
                ResponseTemplate::new(200).set_body_json(json!({ "agent": agent }))
            })
            .mount(&server)
            .await;

        let body = HttpClient::new()
            .get_json(&format!("{}/thing", server.uri()), Some(""), DEFAULT_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(body, json!({ "agent": null }));
    }

    #[tokio::test]
    async fn shape_mismatch_is_a_validation_error() {
        let server =
            server_returning(ResponseTemplate::new(200).set_body_json(json!({ "id": "x", "name": 5 }))).await;

        let err = HttpClient::new()
            .get_validated::<Thing>(&format!("{}/thing", server.uri()), None, DEFAULT_TIMEOUT)
            .await
            .unwrap_err();

        let err = match err {
            FetchError::Validation(err) => err,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(
            err.messages(),
            vec!["id is Expected number, received string", "name is Expected string, received number"]
        );
    }

    #[tokio::test]
    async fn error_body_with_title_keeps_problem_details() {
        let err = fetch_error(ResponseTemplate::new(404).set_body_json(json!({
            "title": "Data Unavailable For Requested Point",
            "detail": "Unable to provide data for requested point 0,0",
            "correlationId": "abc123"
        })))
        .await;

        assert_eq!(err.status, 404);
        assert_eq!(
            err.message,
            "Data Unavailable For Requested Point: Unable to provide data for requested point 0,0"
        );
        assert_eq!(err.title.as_deref(), Some("Data Unavailable For Requested Point"));
        assert_eq!(err.correlation_id.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn error_body_without_title_prefers_detail_then_message() {
        let err = fetch_error(ResponseTemplate::new(400).set_body_json(json!({ "message": "bad point" }))).await;
        assert_eq!(err.message, "HTTP 400: bad point");
        assert_eq!(err.detail.as_deref(), Some("bad point"));
        assert_eq!(err.title, None);

        let err = fetch_error(ResponseTemplate::new(502).set_body_json(json!({}))).await;
        assert_eq!(err.message, "HTTP 502: Unknown error");
    }

    #[tokio::test]
    async fn error_body_with_unexpected_shape() {
        let err = fetch_error(ResponseTemplate::new(404).set_body_json(json!({ "title": 42 }))).await;

        assert_eq!(err.status, 404);
        assert_eq!(err.message, "HTTP 404: Unknown error format");
        assert_eq!(err.detail.as_deref(), Some("Unknown error"));
    }

    #[tokio::test]
    async fn error_body_that_is_not_json() {
        let err = fetch_error(ResponseTemplate::new(500).set_body_string("<html>oops</html>")).await;

        assert_eq!(err.status, 500);
        assert_eq!(err.message, "HTTP Error: 500");
        assert_eq!(err.detail, None);
    }

    #[tokio::test]
    async fn slow_response_times_out_with_408() {
        let server = server_returning(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": 1, "name": "late" }))
                .set_delay(Duration::from_secs(5)),
        )
        .await;
        let url = format!("{}/thing", server.uri());

        let started = Instant::now();
        let err = HttpClient::new().get_json(&url, None, Duration::from_millis(100)).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(4));
        let err = match err {
            FetchError::Http(err) => err,
            other => panic!("expected timeout, got {other:?}"),
        };
        assert!(err.is_timeout());
        assert_eq!(err.message, "Request timeout");
        assert_eq!(err.title.as_deref(), Some("Request Timeout"));
        assert_eq!(err.detail, Some(format!("Request to {url} timed out after 100ms")));
    }

    /// Sets its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_does_not_hold_a_fast_exchange() {
        let started = tokio::time::Instant::now();

        let out = with_deadline("http://upstream/thing", Duration::from_secs(10), async {
            Ok(json!({ "id": 1 }))
        })
        .await
        .unwrap();

        assert_eq!(out, json!({ "id": 1 }));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_drops_the_exchange() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let exchange = async move {
            let _flag = flag;
            std::future::pending::<Result<Value, FetchError>>().await
        };

        let started = tokio::time::Instant::now();
        let err = with_deadline("http://upstream/thing", Duration::from_millis(250), exchange)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(250) && elapsed < Duration::from_millis(300), "{elapsed:?}");
        assert!(dropped.load(Ordering::SeqCst));
        match err {
            FetchError::Http(err) => {
                assert!(err.is_timeout());
                assert_eq!(err.detail.as_deref(), Some("Request to http://upstream/thing timed out after 250ms"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    /// Serve one response head plus the start of a body, then hang up before
    /// the advertised length is reached.
    async fn truncated_response(head: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(head.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/thing")
    }

    #[tokio::test]
    async fn unreadable_error_body_falls_back_to_status() {
        let url = truncated_response(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"title\":",
        )
        .await;

        let err = HttpClient::new().get_json(&url, None, DEFAULT_TIMEOUT).await.unwrap_err();

        match err {
            FetchError::Http(err) => {
                assert_eq!(err.status, 503);
                assert_eq!(err.message, "HTTP Error: 503");
                assert_eq!(err.url.as_deref(), Some(url.as_str()));
            }
            other => panic!("expected HttpError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_failure_is_passed_through() {
        // Nothing listens on the discard port.
        let err = HttpClient::new()
            .get_json("http://127.0.0.1:9/thing", None, DEFAULT_TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn non_json_success_body_is_a_decode_error() {
        let server = server_returning(ResponseTemplate::new(200).set_body_string("not json")).await;

        let err = HttpClient::new()
            .get_json(&format!("{}/thing", server.uri()), None, DEFAULT_TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn ping_reports_status_or_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        assert_eq!(client.ping(&server.uri(), DEFAULT_TIMEOUT).await, 200);
        assert_eq!(client.ping(&format!("{}/missing", server.uri()), DEFAULT_TIMEOUT).await, 404);
        assert_eq!(client.ping("http://127.0.0.1:9/", DEFAULT_TIMEOUT).await, PING_FAILED);
    }

    #[test]
    fn error_body_fields_must_be_strings() {
        assert_eq!(
            ErrorBody::from_value(&json!({ "detail": "d", "correlationId": "c" })),
            Some(ErrorBody {
                detail: Some("d".into()),
                correlation_id: Some("c".into()),
                ..ErrorBody::default()
            })
        );
        assert_eq!(ErrorBody::from_value(&json!({ "message": null })), None);
        assert_eq!(ErrorBody::from_value(&json!(["title"])), None);
    }
}
