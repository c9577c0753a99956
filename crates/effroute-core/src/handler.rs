//! Handler - route に束縛される処理
//!
//! # 二つの variant
//! - **Script**: effect script。`Effects` 経由で command を emit し、interpreter が解決する
//! - **Plain**: 普通の async 関数。`RequestArgs::ctx` で transport context を直接触ってよい
//!
//! variant は登録時に決まる（リクエストごとに推測しない）。

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::domain::{Headers, LogicalResponse, Result};
use crate::impls::ContextHandle;
use crate::interpreter::Effects;
use crate::ports::TransportContext;

/// What a handler hands to the synthesizer. `None` means "nothing returned".
pub type Reply = Option<LogicalResponse>;

pub type ScriptFn = dyn Fn(RequestArgs, Effects) -> BoxFuture<'static, Result<Reply>> + Send + Sync;
pub type PlainFn = dyn Fn(RequestArgs) -> BoxFuture<'static, Result<Reply>> + Send + Sync;

/// Per-request snapshot passed unchanged into the handler.
#[derive(Debug, Clone)]
pub struct RequestArgs {
    pub query: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: Value,
    pub headers: Headers,
    pub cookies: BTreeMap<String, String>,
    /// The live transport context.
    pub ctx: ContextHandle,
}

impl RequestArgs {
    /// Snapshot the request side of `ctx`.
    pub fn from_context(ctx: &ContextHandle) -> Self {
        ctx.with(|exchange| Self {
            query: exchange.query().clone(),
            params: exchange.params().clone(),
            body: exchange.request_body().clone(),
            headers: exchange.request_headers().clone(),
            cookies: exchange.request_cookies().clone(),
            ctx: ctx.clone(),
        })
    }
}

#[derive(Clone)]
pub enum Handler {
    Script(Arc<ScriptFn>),
    Plain(Arc<PlainFn>),
}

impl Handler {
    /// Register an effect script.
    ///
    /// # 使用例
    /// ```ignore
    /// async fn hello(_args: RequestArgs, fx: Effects) -> Result<Reply> {
    ///     let message = fx.perform(cmds::echo(json!("hello world"))).await?;
    ///     Ok(send(message).into())
    /// }
    ///
    /// let handler = Handler::script(hello);
    /// ```
    pub fn script<F, Fut>(f: F) -> Self
    where
        F: Fn(RequestArgs, Effects) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Handler::Script(Arc::new(
            move |args: RequestArgs, fx: Effects| -> BoxFuture<'static, Result<Reply>> {
                Box::pin(f(args, fx))
            },
        ))
    }

    /// Register a plain async function.
    pub fn plain<F, Fut>(f: F) -> Self
    where
        F: Fn(RequestArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Handler::Plain(Arc::new(
            move |args: RequestArgs| -> BoxFuture<'static, Result<Reply>> { Box::pin(f(args)) },
        ))
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Handler::Script(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Handler::Script(_) => "script",
            Handler::Plain(_) => "plain",
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler::{}", self.kind())
    }
}
