//! Logical Response - handler が返す宣言的なレスポンス
//!
//! Handler は transport context を直接触る代わりに、
//! body / status / headers / cookies の組を返すことができる。
//! 実際の書き込みは synth モジュールが行う。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub type Headers = BTreeMap<String, String>;

/// Cookie options (`path`, `domain`, `maxAge`, `expires`, `httpOnly`, `secure`, `sameSite`).
pub type CookieOptions = Map<String, Value>;

/// `(name, value, options)` in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieSpec(pub String, pub String, pub CookieOptions);

impl CookieSpec {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> &str {
        &self.1
    }

    pub fn options(&self) -> &CookieOptions {
        &self.2
    }

    /// Render as a `Set-Cookie` header value.
    ///
    /// `path` defaults to `/` and `httpOnly` to true. `maxAge` is in
    /// milliseconds. A name, value or attribute that would break out of its
    /// slot in the header (`;`, `,`, whitespace, controls) is rejected.
    pub fn to_header_value(&self) -> Result<String, InvalidCookie> {
        let opts = &self.2;
        if self.0.is_empty() || !self.0.chars().all(is_token_char) {
            return Err(InvalidCookie::new("name", &self.0));
        }
        if !self.1.chars().all(is_cookie_octet) {
            return Err(InvalidCookie::new("value", &self.1));
        }
        let mut out = format!("{}={}", self.0, self.1);

        let attr = |key: &'static str| string_attribute(opts, key);

        let path = attr("path")?.unwrap_or("/");
        out.push_str(&format!("; Path={path}"));

        if let Some(domain) = attr("domain")? {
            out.push_str(&format!("; Domain={domain}"));
        }
        if let Some(max_age) = opts.get("maxAge").and_then(Value::as_i64) {
            out.push_str(&format!("; Max-Age={}", max_age / 1000));
        }
        if let Some(expires) = attr("expires")? {
            out.push_str(&format!("; Expires={expires}"));
        }
        match (attr("sameSite")?, opts.get("sameSite")) {
            (Some(mode), _) => out.push_str(&format!("; SameSite={mode}")),
            (None, Some(Value::Bool(true))) => out.push_str("; SameSite=Strict"),
            _ => {}
        }
        if opts.get("secure").and_then(Value::as_bool).unwrap_or(false) {
            out.push_str("; Secure");
        }
        if opts.get("httpOnly").and_then(Value::as_bool).unwrap_or(true) {
            out.push_str("; HttpOnly");
        }
        Ok(out)
    }
}

/// A cookie part that cannot be placed in a `Set-Cookie` header as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cookie {part}: {value:?}")]
pub struct InvalidCookie {
    pub part: &'static str,
    pub value: String,
}

impl InvalidCookie {
    fn new(part: &'static str, value: &str) -> Self {
        Self {
            part,
            value: value.to_string(),
        }
    }
}

// RFC 6265 token
fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c)
}

// RFC 6265 cookie-octet
fn is_cookie_octet(c: char) -> bool {
    c.is_ascii_graphic() && !"\",;\\".contains(c)
}

fn string_attribute<'a>(
    opts: &'a CookieOptions,
    key: &'static str,
) -> Result<Option<&'a str>, InvalidCookie> {
    match opts.get(key).and_then(Value::as_str) {
        Some(v) if !v.chars().all(is_attribute_char) => Err(InvalidCookie::new(key, v)),
        other => Ok(other),
    }
}

fn is_attribute_char(c: char) -> bool {
    (c == ' ' || c.is_ascii_graphic()) && c != ';'
}

/// Declarative response returned by a handler.
///
/// `body: None` means "not set"; synthesis refuses it. Use `Value::Null` for
/// an explicit JSON `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<CookieSpec>,
}

impl LogicalResponse {
    pub const DEFAULT_STATUS: u16 = 200;

    /// Status to write, defaulting to 200.
    pub fn status_or_default(&self) -> u16 {
        self.status.unwrap_or(Self::DEFAULT_STATUS)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, cookie: CookieSpec) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn with_cookies(mut self, cookies: impl IntoIterator<Item = CookieSpec>) -> Self {
        self.cookies.extend(cookies);
        self
    }
}

/// `send(body)`; chain `with_status`, `with_headers` and `with_cookies` for the
/// optional positions.
pub fn send(body: Value) -> LogicalResponse {
    LogicalResponse {
        body: Some(body),
        status: None,
        headers: None,
        cookies: Vec::new(),
    }
}

/// 404 with `{ "message": "Not Found" }` unless a body is given.
pub fn not_found(body: Option<Value>) -> LogicalResponse {
    send(body.unwrap_or_else(|| json!({ "message": "Not Found" }))).with_status(404)
}

/// 401 with `{ "message": "Not Authorized" }` unless a body is given.
pub fn not_authorized(body: Option<Value>) -> LogicalResponse {
    send(body.unwrap_or_else(|| json!({ "message": "Not Authorized" }))).with_status(401)
}

pub fn create_cookie(
    name: impl Into<String>,
    value: impl Into<String>,
    options: CookieOptions,
) -> CookieSpec {
    CookieSpec(name.into(), value.into(), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn opts(value: Value) -> CookieOptions {
        match value {
            Value::Object(map) => map,
            _ => CookieOptions::new(),
        }
    }

    #[test]
    fn send_defaults() {
        let res = send(json!({ "a": 1 }));
        assert_eq!(res.body, Some(json!({ "a": 1 })));
        assert_eq!(res.status, None);
        assert_eq!(res.status_or_default(), 200);
        assert!(res.headers.is_none());
        assert!(res.cookies.is_empty());
    }

    #[test]
    fn not_found_and_not_authorized_fill_default_bodies() {
        let nf = not_found(None);
        assert_eq!(nf.status, Some(404));
        assert_eq!(nf.body, Some(json!({ "message": "Not Found" })));

        let na = not_authorized(Some(json!("go away")));
        assert_eq!(na.status, Some(401));
        assert_eq!(na.body, Some(json!("go away")));
    }

    #[test]
    fn cookies_keep_emission_order() {
        let res = send(json!(null))
            .with_cookie(create_cookie("b", "2", CookieOptions::new()))
            .with_cookies([create_cookie("a", "1", CookieOptions::new())]);
        let names: Vec<_> = res.cookies.iter().map(CookieSpec::name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[rstest]
    #[case::defaults(json!({}), "sid=abc; Path=/; HttpOnly")]
    #[case::max_age_in_ms(json!({ "maxAge": 60000 }), "sid=abc; Path=/; Max-Age=60; HttpOnly")]
    #[case::not_http_only(json!({ "httpOnly": false, "secure": true }), "sid=abc; Path=/; Secure")]
    #[case::same_site(
        json!({ "path": "/app", "domain": "example.com", "sameSite": "Lax" }),
        "sid=abc; Path=/app; Domain=example.com; SameSite=Lax; HttpOnly"
    )]
    fn cookie_header_value(#[case] options: Value, #[case] expected: &str) {
        let cookie = create_cookie("sid", "abc", opts(options));
        assert_eq!(cookie.to_header_value().unwrap(), expected);
    }

    #[rstest]
    #[case::attribute_injection("abc; Domain=evil.example", json!({}), "value")]
    #[case::comma_in_value("a,b", json!({}), "value")]
    #[case::space_in_value("a b", json!({}), "value")]
    #[case::path_injection("abc", json!({ "path": "/; Domain=evil.example" }), "path")]
    #[case::domain_control("abc", json!({ "domain": "example.com\r\nX: y" }), "domain")]
    fn cookie_rejects_unsafe_parts(#[case] value: &str, #[case] options: Value, #[case] part: &str) {
        let err = create_cookie("sid", value, opts(options)).to_header_value().unwrap_err();
        assert_eq!(err.part, part);
    }

    #[rstest]
    #[case::empty("")]
    #[case::separator("s;d")]
    #[case::equals("s=d")]
    fn cookie_rejects_bad_names(#[case] name: &str) {
        let err = create_cookie(name, "abc", CookieOptions::new()).to_header_value().unwrap_err();
        assert_eq!(err.part, "name");
    }
}
