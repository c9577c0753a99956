//! Route table: `(method, path, handler)` triples.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handler::Handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    /// axum-style path, e.g. `/test/:id`.
    pub path: String,
    pub handler: Handler,
}

pub fn route(method: Method, path: impl Into<String>, handler: Handler) -> Route {
    Route {
        method,
        path: path.into(),
        handler,
    }
}

pub fn get(path: impl Into<String>, handler: Handler) -> Route {
    route(Method::Get, path, handler)
}

pub fn post(path: impl Into<String>, handler: Handler) -> Route {
    route(Method::Post, path, handler)
}

pub fn put(path: impl Into<String>, handler: Handler) -> Route {
    route(Method::Put, path, handler)
}

pub fn patch(path: impl Into<String>, handler: Handler) -> Route {
    route(Method::Patch, path, handler)
}

pub fn delete(path: impl Into<String>, handler: Handler) -> Route {
    route(Method::Delete, path, handler)
}

pub fn head(path: impl Into<String>, handler: Handler) -> Route {
    route(Method::Head, path, handler)
}

pub fn options(path: impl Into<String>, handler: Handler) -> Route {
    route(Method::Options, path, handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn noop() -> Handler {
        Handler::plain(|_args| async move { Ok(None) })
    }

    #[rstest]
    #[case::get(get("/x", noop()), Method::Get)]
    #[case::post(post("/x", noop()), Method::Post)]
    #[case::put(put("/x", noop()), Method::Put)]
    #[case::patch(patch("/x", noop()), Method::Patch)]
    #[case::delete(delete("/x", noop()), Method::Delete)]
    #[case::head(head("/x", noop()), Method::Head)]
    #[case::options(options("/x", noop()), Method::Options)]
    fn constructors_record_method(#[case] route: Route, #[case] method: Method) {
        assert_eq!(route.method, method);
        assert_eq!(route.path, "/x");
    }

    #[test]
    fn method_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Method::Patch).unwrap(), "\"PATCH\"");
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
