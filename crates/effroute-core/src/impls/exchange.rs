//! Exchange - axum の request/response を TransportContext として扱う実装
//!
//! # 実装詳細
//! - request 側: query, path params, headers, cookies, body（読み取り専用）
//! - response 側: status（未設定なら 404）, body, headers, cookies
//! - `ContextHandle` は `Arc<Mutex<Exchange>>`。handler と synthesizer が共有する

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::Json;
use axum::body::Body;
use axum::extract::{FromRequestParts, Path, Request};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::{Value, json};

use crate::domain::{CookieSpec, Headers};
use crate::ports::{DEFAULT_STATUS, TransportContext};

/// Request bodies larger than this are rejected with 413.
pub const BODY_LIMIT: usize = 1024 * 1024;

/// Which request parsers run before dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Parsing {
    pub cookies: bool,
    pub body: bool,
}

impl Default for Parsing {
    fn default() -> Self {
        Self {
            cookies: true,
            body: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Exchange {
    query: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
    request_headers: Headers,
    request_cookies: BTreeMap<String, String>,
    request_body: Value,

    status: u16,
    status_written: bool,
    body: Option<Value>,
    headers: Headers,
    cookies: Vec<CookieSpec>,
}

impl Default for Exchange {
    fn default() -> Self {
        Self {
            query: BTreeMap::new(),
            params: BTreeMap::new(),
            request_headers: Headers::new(),
            request_cookies: BTreeMap::new(),
            request_body: Value::Null,
            status: DEFAULT_STATUS,
            status_written: false,
            body: None,
            headers: Headers::new(),
            cookies: Vec::new(),
        }
    }
}

impl Exchange {
    pub fn builder() -> ExchangeBuilder {
        ExchangeBuilder::default()
    }

    /// Read an axum request into an exchange.
    ///
    /// Rejections (oversized or malformed body) come back as ready responses.
    pub async fn from_request(req: Request, parsing: Parsing) -> Result<Self, Response> {
        let (mut parts, body) = req.into_parts();

        let query: BTreeMap<String, String> = parts
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();

        let params = Path::<BTreeMap<String, String>>::from_request_parts(&mut parts, &())
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();

        let request_headers = collect_headers(&parts.headers);

        let request_cookies = if parsing.cookies {
            parse_cookies(&parts.headers)
        } else {
            BTreeMap::new()
        };

        let request_body = if parsing.body {
            let bytes = read_body(body, BODY_LIMIT).await?;
            let content_type = parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            parse_body(content_type, &bytes)?
        } else {
            Value::Null
        };

        Ok(Self {
            query,
            params,
            request_headers,
            request_cookies,
            request_body,
            ..Self::default()
        })
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn cookies(&self) -> &[CookieSpec] {
        &self.cookies
    }
}

impl TransportContext for Exchange {
    fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    fn request_headers(&self) -> &Headers {
        &self.request_headers
    }

    fn request_cookies(&self) -> &BTreeMap<String, String> {
        &self.request_cookies
    }

    fn request_body(&self) -> &Value {
        &self.request_body
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn set_status(&mut self, status: u16) {
        self.status = status;
        self.status_written = true;
    }

    fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Setting a body without an explicit status implies 200.
    fn set_body(&mut self, body: Value) {
        if !self.status_written {
            self.status = 200;
        }
        self.body = Some(body);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
    }

    fn set_cookie(&mut self, cookie: CookieSpec) {
        self.cookies.push(cookie);
    }
}

impl IntoResponse for Exchange {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or_else(|_| {
            tracing::warn!(status = self.status, "invalid response status, rendering 500");
            StatusCode::INTERNAL_SERVER_ERROR
        });
        let mut response = match self.body {
            None if status == StatusCode::NOT_FOUND => (status, "Not Found").into_response(),
            None => status.into_response(),
            Some(Value::String(text)) => (status, text).into_response(),
            Some(body) => (status, Json(body)).into_response(),
        };

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        for cookie in &self.cookies {
            let rendered = cookie
                .to_header_value()
                .map_err(|e| e.to_string())
                .and_then(|v| HeaderValue::from_str(&v).map_err(|e| e.to_string()));
            match rendered {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(reason) => {
                    tracing::warn!(cookie = cookie.name(), %reason, "dropping invalid cookie")
                }
            }
        }
        response
    }
}

/// Shared handle to the live exchange of one request.
#[derive(Debug, Clone)]
pub struct ContextHandle {
    inner: Arc<Mutex<Exchange>>,
}

impl ContextHandle {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            inner: Arc::new(Mutex::new(exchange)),
        }
    }

    /// Run `f` with the exchange locked. Do not hold across an `.await`.
    pub fn with<R>(&self, f: impl FnOnce(&mut Exchange) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn status(&self) -> u16 {
        self.with(|ex| ex.status())
    }

    pub fn set_status(&self, status: u16) {
        self.with(|ex| ex.set_status(status));
    }

    pub fn body(&self) -> Option<Value> {
        self.with(|ex| ex.body().cloned())
    }

    pub fn set_body(&self, body: Value) {
        self.with(|ex| ex.set_body(body));
    }

    pub fn set_header(&self, name: &str, value: &str) {
        self.with(|ex| ex.set_header(name, value));
    }

    pub fn set_cookie(&self, cookie: CookieSpec) {
        self.with(|ex| ex.set_cookie(cookie));
    }

    /// Move the exchange out, leaving a fresh one behind.
    pub fn take(&self) -> Exchange {
        self.with(std::mem::take)
    }
}

#[derive(Debug, Default)]
pub struct ExchangeBuilder {
    exchange: Exchange,
}

impl ExchangeBuilder {
    pub fn query<K: Into<String>, V: Into<String>>(
        mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.exchange
            .query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn params<K: Into<String>, V: Into<String>>(
        mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.exchange
            .params
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn cookies<K: Into<String>, V: Into<String>>(
        mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.exchange
            .request_cookies
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.exchange
            .request_headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.exchange.request_body = body;
        self
    }

    pub fn build(self) -> Exchange {
        self.exchange
    }
}

/// Collect the body, 413 once it passes `limit`, 400 if the stream fails.
async fn read_body(body: Body, limit: usize) -> Result<Vec<u8>, Response> {
    let mut stream = body.into_data_stream();
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            reject(StatusCode::BAD_REQUEST, &format!("failed to read request body: {e}"))
        })?;
        if bytes.len() + chunk.len() > limit {
            return Err(reject(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn collect_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let Ok(value) = value.to_str() else { continue };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}

fn parse_cookies(map: &HeaderMap) -> BTreeMap<String, String> {
    map.get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let value = value.trim().trim_matches('"');
            Some((name.trim().to_string(), value.to_string()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

fn parse_body(content_type: &str, bytes: &[u8]) -> Result<Value, Response> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "application/json" || mime.ends_with("+json") {
        return serde_json::from_slice(bytes)
            .map_err(|e| reject(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {e}")));
    }
    if mime == "application/x-www-form-urlencoded" {
        let form: BTreeMap<String, String> = serde_urlencoded::from_bytes(bytes)
            .map_err(|e| reject(StatusCode::BAD_REQUEST, &format!("invalid form body: {e}")))?;
        return Ok(json!(form));
    }
    Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
