//! Transport port - 1 回の HTTP exchange を表すインターフェース
//!
//! HTTP サーバー本体（listener, routing, body parsing）は外部の collaborator。
//! コアはこの trait を通してのみ request を読み、response を書く。

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::{CookieSpec, Headers};

/// Status an exchange reports before anything was written.
pub const DEFAULT_STATUS: u16 = 404;

pub trait TransportContext: Send {
    fn query(&self) -> &BTreeMap<String, String>;

    fn params(&self) -> &BTreeMap<String, String>;

    fn request_headers(&self) -> &Headers;

    fn request_cookies(&self) -> &BTreeMap<String, String>;

    fn request_body(&self) -> &Value;

    fn status(&self) -> u16;

    fn set_status(&mut self, status: u16);

    fn body(&self) -> Option<&Value>;

    fn set_body(&mut self, body: Value);

    fn set_header(&mut self, name: &str, value: &str);

    fn set_cookie(&mut self, cookie: CookieSpec);

    /// True once a body or a non-default status has been written.
    fn has_response(&self) -> bool {
        self.body().is_some() || self.status() != DEFAULT_STATUS
    }
}
