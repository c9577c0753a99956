//! Error pipeline - リクエスト境界で捕まえた失敗の最終処理
//!
//! # 状態遷移
//! caught-at-boundary → (reporting hook) → reported → (custom render | default render) → rendered
//!
//! 失敗は必ず何らかの response になる。リトライはしない。

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use crate::domain::{AmbientContext, ErrorEnvelope};
use crate::impls::ContextHandle;
use crate::ports::TransportContext;

/// Status used when the failure carries none.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// Observes every failure exactly once and is awaited before rendering.
/// A panic inside the hook is not caught.
pub type ErrorReporter =
    Arc<dyn Fn(&ErrorEnvelope, &AmbientContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Takes full control of the transport response for a failure. Runs with the
/// exchange only; do I/O in the reporter.
pub type ErrorRenderer =
    Arc<dyn Fn(&ContextHandle, Next<'_>, &ErrorEnvelope, &AmbientContext) + Send + Sync>;

/// Handed to a custom renderer; `run` falls through to the default rendering.
pub struct Next<'a> {
    ctx: &'a ContextHandle,
    envelope: &'a ErrorEnvelope,
}

impl Next<'_> {
    pub fn run(self) {
        render_default(self.ctx, self.envelope);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendered {
    Default,
    Custom,
}

#[derive(Clone, Default)]
pub struct ErrorPipeline {
    ambient: AmbientContext,
    on_error: Option<ErrorReporter>,
    handle_error: Option<ErrorRenderer>,
}

impl ErrorPipeline {
    pub fn new(ambient: AmbientContext) -> Self {
        Self {
            ambient,
            on_error: None,
            handle_error: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Option<ErrorReporter>) -> Self {
        self.on_error = reporter;
        self
    }

    pub fn with_renderer(mut self, renderer: Option<ErrorRenderer>) -> Self {
        self.handle_error = renderer;
        self
    }

    /// Report and render `envelope` into `ctx`.
    pub async fn recover(&self, ctx: &ContextHandle, envelope: ErrorEnvelope) -> Rendered {
        tracing::error!(
            status = envelope.status().unwrap_or(DEFAULT_ERROR_STATUS),
            error = %envelope,
            "request failed"
        );

        if let Some(report) = &self.on_error {
            report(&envelope, &self.ambient).await;
        }

        match &self.handle_error {
            Some(render) => {
                let next = Next {
                    ctx,
                    envelope: &envelope,
                };
                render(ctx, next, &envelope, &self.ambient);
                Rendered::Custom
            }
            None => {
                render_default(ctx, &envelope);
                Rendered::Default
            }
        }
    }
}

impl std::fmt::Debug for ErrorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorPipeline")
            .field("on_error", &self.on_error.is_some())
            .field("handle_error", &self.handle_error.is_some())
            .finish()
    }
}

/// `{ "message": <failure message> }` with the failure's status or 500.
pub fn render_default(ctx: &ContextHandle, envelope: &ErrorEnvelope) {
    let status = envelope.status().unwrap_or(DEFAULT_ERROR_STATUS);
    let body = json!({ "message": envelope.message() });
    ctx.with(|exchange| {
        exchange.set_status(status);
        exchange.set_body(body);
    });
}
