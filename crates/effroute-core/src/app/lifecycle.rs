//! Lifecycle - 1 リクエストの処理を最後まで駆動する
//!
//! # フロー
//! 1. transport context から `RequestArgs` を作る
//! 2. handler の variant で分岐（Script → interpreter / Plain → 直接呼び出し）
//! 3. 返り値を synthesizer に渡す
//! 4. 失敗は Error Pipeline へ

use crate::app::pipeline::ErrorPipeline;
use crate::domain::{AmbientContext, ErrorEnvelope};
use crate::handler::{Handler, Reply, RequestArgs};
use crate::impls::ContextHandle;
use crate::interpreter::interpret;
use crate::registry::Registry;
use crate::synth::{Synthesis, synthesize};

/// Shared by every route; holds only read-only state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    registry: Registry,
    ambient: AmbientContext,
    pipeline: ErrorPipeline,
}

impl Lifecycle {
    pub fn new(registry: Registry, ambient: AmbientContext, pipeline: ErrorPipeline) -> Self {
        Self {
            registry,
            ambient,
            pipeline,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ambient(&self) -> &AmbientContext {
        &self.ambient
    }

    /// Run the handler to completion.
    pub async fn dispatch(&self, handler: &Handler, args: RequestArgs) -> Result<Reply, ErrorEnvelope> {
        match handler {
            Handler::Script(script) => {
                interpret(&self.ambient, &self.registry, |args, fx| script(args, fx), args).await
            }
            Handler::Plain(plain) => plain(args).await.map_err(ErrorEnvelope::new),
        }
    }

    /// Dispatch and synthesize, without error recovery.
    pub async fn run(&self, handler: &Handler, ctx: &ContextHandle) -> Result<Synthesis, ErrorEnvelope> {
        let args = RequestArgs::from_context(ctx);
        let reply = self.dispatch(handler, args).await?;
        ctx.with(|exchange| synthesize(exchange, reply))
            .map_err(ErrorEnvelope::new)
    }

    /// Process one request. Always leaves a response in `ctx`.
    pub async fn handle(&self, handler: &Handler, ctx: &ContextHandle) {
        match self.run(handler, ctx).await {
            Ok(synthesis) => {
                tracing::debug!(handler = handler.kind(), ?synthesis, "request handled");
            }
            Err(envelope) => {
                self.pipeline.recover(ctx, envelope).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{cmds, universal};
    use crate::domain::{EffrouteError, send};
    use crate::impls::Exchange;
    use crate::registry::Interpreters;
    use serde_json::json;

    fn lifecycle() -> Lifecycle {
        let ambient = AmbientContext::new(json!({ "value": "foobar" }));
        Lifecycle::new(
            Registry::merge(universal(), Interpreters::new()),
            ambient.clone(),
            ErrorPipeline::new(ambient),
        )
    }

    fn ctx() -> ContextHandle {
        ContextHandle::new(Exchange::builder().params([("id", "32")]).build())
    }

    #[tokio::test]
    async fn script_handler_goes_through_interpreter() {
        let handler = Handler::script(|args, fx| async move {
            let id = fx.perform(cmds::echo(json!(args.params["id"]))).await?;
            Ok(Some(send(json!({ "id": id }))))
        });

        let ctx = ctx();
        lifecycle().handle(&handler, &ctx).await;
        assert_eq!(ctx.status(), 200);
        assert_eq!(ctx.body(), Some(json!({ "id": "32" })));
    }

    #[tokio::test]
    async fn plain_handler_may_write_context_directly() {
        let handler = Handler::plain(|args| async move {
            args.ctx.set_body(json!({ "message": "foo bar" }));
            Ok(Some(send(json!("ignored"))))
        });

        let ctx = ctx();
        let out = lifecycle().run(&handler, &ctx).await.unwrap();
        assert_eq!(out, Synthesis::Skipped);
        assert_eq!(ctx.body(), Some(json!({ "message": "foo bar" })));
    }

    #[tokio::test]
    async fn plain_handler_reply_is_synthesized() {
        let handler = Handler::plain(|_args| async move { Ok(Some(send(json!("hi")).with_status(202))) });

        let ctx = ctx();
        let out = lifecycle().run(&handler, &ctx).await.unwrap();
        assert_eq!(out, Synthesis::Written);
        assert_eq!(ctx.status(), 202);
    }

    #[tokio::test]
    async fn missing_body_is_rendered_as_failure() {
        let handler = Handler::plain(|_args| async move { Ok(None) });

        let ctx = ctx();
        let err = lifecycle().run(&handler, &ctx).await.unwrap_err();
        assert!(matches!(err.error(), EffrouteError::MissingResponseBody));

        let rendered = self::ctx();
        lifecycle().handle(&handler, &rendered).await;
        assert_eq!(rendered.status(), 500);
    }

    #[tokio::test]
    async fn plain_failure_has_no_attached_context() {
        let handler = Handler::plain(|_args| async move { Err(EffrouteError::handler("oops")) });
        let err = lifecycle().run(&handler, &ctx()).await.unwrap_err();
        assert!(err.ambient().is_none());
    }

    #[tokio::test]
    async fn script_failure_has_attached_context() {
        let handler = Handler::script(|_args, _fx| async move { Err(EffrouteError::handler("oops")) });
        let err = lifecycle().run(&handler, &ctx()).await.unwrap_err();
        assert_eq!(err.ambient(), Some(&AmbientContext::new(json!({ "value": "foobar" }))));
    }

    #[tokio::test]
    async fn failure_is_rendered_as_json() {
        let handler = Handler::plain(|_args| async move { Err(EffrouteError::handler("oops")) });

        let ctx = ctx();
        lifecycle().handle(&handler, &ctx).await;
        assert_eq!(ctx.status(), 500);
        assert_eq!(ctx.body(), Some(json!({ "message": "oops" })));
    }
}
