//! Drive a [`Router`] in-process and assert on the response.
//!
//! ```rust,ignore
//! let body: serde_json::Value = testing::get(app, "/api/plans")
//!     .execute()
//!     .await
//!     .assert_ok()
//!     .json()
//!     .await;
//! ```

use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
};
use serde::{Serialize, de::DeserializeOwned};
use tower::ServiceExt;

pub struct Scenario {
    app: Router,
    method: Method,
    uri: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Body,
}

impl Scenario {
    pub fn new(app: Router, method: Method, uri: &str) -> Self {
        Self {
            app,
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
            body: Body::empty(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((
            HeaderName::from_bytes(key.as_bytes()).expect("invalid header name"),
            HeaderValue::from_str(value).expect("invalid header value"),
        ));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    pub fn query(mut self, params: &[(&str, &str)]) -> Self {
        let encoded: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        let separator = if self.uri.contains('?') { '&' } else { '?' };
        self.uri = format!("{}{}{}", self.uri, separator, encoded.join("&"));
        self
    }

    pub fn json<T: Serialize>(self, body: &T) -> Self {
        let bytes = serde_json::to_vec(body).expect("failed to serialize request body");
        self.raw_body(bytes).header("content-type", "application/json")
    }

    /// Send `bytes` untouched, e.g. a webhook payload whose signature covers
    /// the exact body.
    pub fn raw_body(mut self, bytes: impl Into<Body>) -> Self {
        self.body = bytes.into();
        self
    }

    pub async fn execute(self) -> ScenarioAssert {
        let mut builder = Request::builder().method(self.method).uri(&self.uri);
        for (key, value) in self.headers {
            builder = builder.header(key, value);
        }
        let request = builder.body(self.body).expect("failed to build request");
        let response = self.app.oneshot(request).await.expect("router is infallible");
        ScenarioAssert { response }
    }
}

pub struct ScenarioAssert {
    response: axum::response::Response,
}

impl ScenarioAssert {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.response.status(),
            expected,
            "expected status {}, got {}",
            expected,
            self.response.status()
        );
        self
    }

    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn assert_created(self) -> Self {
        self.assert_status(StatusCode::CREATED)
    }

    pub fn assert_header(self, key: &str, expected: &str) -> Self {
        let value = self
            .response
            .headers()
            .get(key)
            .unwrap_or_else(|| panic!("header '{}' not found", key))
            .to_str()
            .expect("header is not ascii");
        assert_eq!(value, expected, "header '{}' mismatch", key);
        self
    }

    pub fn header(&self, key: &str) -> Option<String> {
        self.response
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn assert_json(self) -> Self {
        let content_type = self
            .header(header::CONTENT_TYPE.as_str())
            .unwrap_or_default();
        assert!(
            content_type.contains("application/json"),
            "expected JSON content type, got '{}'",
            content_type
        );
        self
    }

    pub async fn bytes(self) -> Vec<u8> {
        axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body")
            .to_vec()
    }

    pub async fn json<T: DeserializeOwned>(self) -> T {
        let bytes = self.bytes().await;
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            panic!(
                "response is not the expected JSON ({}): {}",
                e,
                String::from_utf8_lossy(&bytes)
            )
        })
    }

    /// Dot-separated lookup such as `results.0.image.url`.
    pub async fn json_path(self, path: &str) -> serde_json::Value {
        let body: serde_json::Value = self.json().await;
        path.split('.')
            .try_fold(&body, |current, part| match part.parse::<usize>() {
                Ok(index) => current.get(index),
                Err(_) => current.get(part),
            })
            .cloned()
            .unwrap_or_else(|| panic!("path '{}' not found in {}", path, body))
    }
}

pub fn get(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::GET, uri)
}

pub fn post(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::POST, uri)
}
