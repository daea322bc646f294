//! Outgoing HTTP response type, the [`Reply`] a chain produces, and the
//! [`IntoReply`] conversion trait.
//!
//! A handler either builds a finished [`Response`] (a redirect, a file) or
//! returns a plain value. Plain values travel up the chain as
//! [`Reply::Value`] and are wrapped in the success envelope by whoever
//! finalizes them: the envelope middleware, the timing middleware, or the
//! dispatcher.

use std::path::Path;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue, LOCATION};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types this service actually sends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Css,          // text/css
    Html,         // text/html; charset=utf-8
    Icon,         // image/x-icon
    JavaScript,   // text/javascript
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Png,          // image/png
    Svg,          // image/svg+xml
    Text,         // text/plain; charset=utf-8
    WebManifest,  // application/manifest+json
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css",
            Self::Html        => "text/html; charset=utf-8",
            Self::Icon        => "image/x-icon",
            Self::JavaScript  => "text/javascript",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Png         => "image/png",
            Self::Svg         => "image/svg+xml",
            Self::Text        => "text/plain; charset=utf-8",
            Self::WebManifest => "application/manifest+json",
        }
    }

    /// Guesses from a file extension, falling back to `OctetStream`.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "css"                => Self::Css,
            "html" | "htm"       => Self::Html,
            "ico"                => Self::Icon,
            "js" | "mjs"         => Self::JavaScript,
            "json"               => Self::Json,
            "png"                => Self::Png,
            "svg"                => Self::Svg,
            "txt"                => Self::Text,
            "webmanifest"        => Self::WebManifest,
            _                    => Self::OctetStream,
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use pushgate::{ContentType, Response};
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::redirect(StatusCode::PERMANENT_REDIRECT, "/index.html");
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .bytes(ContentType::Html, b"<p>ok</p>".to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK` — `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().bytes(ContentType::Json, body)
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self::builder().status(code).no_body()
    }

    /// A redirect to `location` with the given 3xx status.
    pub fn redirect(code: StatusCode, location: &str) -> Self {
        Self::builder().status(code).header(LOCATION.as_str(), location).no_body()
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Converts into the `http` type hyper writes to the wire.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method — you always know what you're sending.
/// Header names or values that are not valid HTTP are dropped.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) =
            (HeaderName::try_from(name), HeaderValue::try_from(value))
        {
            self.headers.append(name, value);
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.bytes(ContentType::Json, body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        let body: String = body.into();
        self.bytes(ContentType::Text, body)
    }

    /// Terminate with a typed body.
    pub fn bytes(mut self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Response { body: body.into(), headers: self.headers, status: self.status }
    }

    /// Terminate with no body (e.g. `204 No Content`, redirects).
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// What a chain link hands back to the link above it.
#[derive(Debug)]
pub enum Reply {
    /// Already a finished response; nobody re-wraps it.
    Response(Response),
    /// A plain value still waiting for the success envelope.
    Value(Value),
}

impl Reply {
    /// Finalizes into a response, wrapping plain values as
    /// `{"success": true, "data": …}` with `200 OK`.
    pub fn into_response(self) -> Result<Response, Error> {
        match self {
            Self::Response(res) => Ok(res),
            Self::Value(data) => envelope_response(
                StatusCode::OK,
                &json!({ "success": true, "data": data }),
            ),
        }
    }
}

/// `{"success": false, "info": {"code": …, "message": …}}` with `status`.
pub(crate) fn failure_response(status: StatusCode, message: &str) -> Result<Response, Error> {
    envelope_response(
        status,
        &json!({
            "success": false,
            "info": { "code": status.as_u16(), "message": message },
        }),
    )
}

fn envelope_response(status: StatusCode, body: &Value) -> Result<Response, Error> {
    let bytes = serde_json::to_vec(body)?;
    Ok(Response::builder().status(status).json(bytes))
}

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Conversion of a handler's success value into a [`Reply`].
///
/// Implemented for finished responses, JSON values, strings, and anything
/// serializable behind [`Json`].
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, Error>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, Error> { Ok(self) }
}

impl IntoReply for Response {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Response(self)) }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Value(self)) }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Value(Value::String(self))) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, Error> { Ok(Reply::Value(Value::from(self))) }
}

/// Any `Serialize` type as a plain reply value.
pub struct Json<T>(pub T);

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Value(serde_json::to_value(self.0)?))
    }
}
