//! Resolver port - command を実際に処理する async 関数の抽象化
//!
//! # 二層構造
//! - **trait**: `Resolver` - object-safe, `Arc<dyn Resolver>` で Registry に格納
//! - **closure**: `FnResolver` - `Fn(Value, AmbientContext) -> Future` を Resolver に変換

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{AmbientContext, Result};

/// Resolves the payload of one named command.
///
/// # 使用例
/// ```ignore
/// struct Echo;
///
/// #[async_trait]
/// impl Resolver for Echo {
///     async fn resolve(&self, payload: Value, _ambient: &AmbientContext) -> Result<Value> {
///         Ok(payload)
///     }
/// }
/// ```
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, payload: Value, ambient: &AmbientContext) -> Result<Value>;
}

/// Adapts a closure into a `Resolver`.
pub struct FnResolver<F> {
    f: F,
}

impl<F> FnResolver<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn(Value, AmbientContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn resolve(&self, payload: Value, ambient: &AmbientContext) -> Result<Value> {
        (self.f)(payload, ambient.clone()).await
    }
}

/// `Arc<dyn Resolver>` from a closure.
pub fn resolver_fn<F, Fut>(f: F) -> Arc<dyn Resolver>
where
    F: Fn(Value, AmbientContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnResolver::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn closure_resolver_sees_payload_and_context() {
        let resolver = resolver_fn(|payload, ambient: AmbientContext| async move {
            Ok(json!({ "payload": payload, "ctx": ambient.value().clone() }))
        });

        let ambient = AmbientContext::new(json!({ "value": "foobar" }));
        let out = resolver.resolve(json!(7), &ambient).await.unwrap();
        assert_eq!(out, json!({ "payload": 7, "ctx": { "value": "foobar" } }));
    }
}
