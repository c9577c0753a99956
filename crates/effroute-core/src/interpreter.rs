//! Effect interpreter - effect script を一歩ずつ駆動する
//!
//! # フロー
//! 1. script を `args` と `Effects` ハンドルで起動
//! 2. script が `Effect` を emit して suspend する（channel 経由）
//! 3. Registry で resolver を引いて実行（composite group は並行に fan-out）
//! 4. 結果（成功 or 失敗）で script を resume
//! 5. script が return したらその値が interpret の結果
//!
//! resolver の失敗は script に `Err` として返される。script が `?` で返せば
//! interpret はそこで終了し、ambient context を付けて呼び出し元に伝播する。
//! composite group は最初の失敗で resume する（部分的な結果は渡さない）。

use std::future::Future;

use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::domain::{
    AmbientContext, Command, Effect, EffrouteError, ErrorEnvelope, HandlerFailure, Result, Resumed,
};
use crate::registry::Registry;

struct Suspension {
    effect: Effect,
    resume: oneshot::Sender<Result<Resumed>>,
}

/// Handle through which a script emits commands and awaits their results.
#[derive(Clone)]
pub struct Effects {
    tx: mpsc::UnboundedSender<Suspension>,
}

impl Effects {
    /// Suspend on `effect` until the interpreter resumes the script.
    ///
    /// A failed resolver (or any failed member of a group) comes back as `Err`.
    pub async fn suspend(&self, effect: impl Into<Effect>) -> Result<Resumed> {
        let (resume, resumed) = oneshot::channel();
        self.tx
            .send(Suspension {
                effect: effect.into(),
                resume,
            })
            .map_err(|_| EffrouteError::Detached)?;
        resumed.await.map_err(|_| EffrouteError::Detached)?
    }

    /// Emit one command.
    pub async fn perform(&self, command: Command) -> Result<Value> {
        match self.suspend(command).await? {
            Resumed::Single(value) => Ok(value),
            other => Err(shape_mismatch("single", &other)),
        }
    }

    /// Emit a sequence group; results come back in the same order.
    pub async fn all(&self, commands: Vec<Command>) -> Result<Vec<Value>> {
        match self.suspend(commands).await? {
            Resumed::Sequence(values) => Ok(values),
            other => Err(shape_mismatch("sequence", &other)),
        }
    }

    /// Emit a mapping group; results come back under the same keys.
    pub async fn all_named(
        &self,
        commands: IndexMap<String, Command>,
    ) -> Result<IndexMap<String, Value>> {
        match self.suspend(commands).await? {
            Resumed::Mapping(values) => Ok(values),
            other => Err(shape_mismatch("mapping", &other)),
        }
    }
}

fn shape_mismatch(expected: &str, got: &Resumed) -> EffrouteError {
    HandlerFailure::new(format!(
        "expected a {expected} result, resumed with {}",
        got.kind()
    ))
    .into()
}

/// Run `script` to completion, resolving every effect it emits through `registry`.
///
/// Failures come back wrapped in an `ErrorEnvelope` carrying `ambient`.
pub async fn interpret<A, T, S, Fut>(
    ambient: &AmbientContext,
    registry: &Registry,
    script: S,
    args: A,
) -> Result<T, ErrorEnvelope>
where
    S: FnOnce(A, Effects) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let script = script(args, Effects { tx });
    tokio::pin!(script);

    let attach = |err: EffrouteError| ErrorEnvelope::new(err).with_ambient(ambient.clone());

    loop {
        tokio::select! {
            biased;
            out = &mut script => return out.map_err(attach),
            Some(Suspension { effect, resume }) = rx.recv() => {
                tracing::debug!(kind = effect.kind(), commands = effect.len(), "script suspended");
                let resumed = resolve_effect(registry, ambient, effect).await;
                if let Err(err) = &resumed {
                    tracing::debug!(error = %err, "resuming script with failure");
                }
                // The script may have stopped waiting; that surfaces when it returns.
                let _ = resume.send(resumed);
            }
        }
    }
}

async fn resolve_effect(
    registry: &Registry,
    ambient: &AmbientContext,
    effect: Effect,
) -> Result<Resumed> {
    match effect {
        Effect::Single(command) => registry.resolve(command, ambient).await.map(Resumed::Single),
        Effect::Sequence(commands) => fan_out(registry, ambient, commands)
            .await
            .map(Resumed::Sequence),
        Effect::Mapping(commands) => {
            let (keys, commands): (Vec<String>, Vec<Command>) = commands.into_iter().unzip();
            let values = fan_out(registry, ambient, commands).await?;
            Ok(Resumed::Mapping(keys.into_iter().zip(values).collect()))
        }
    }
}

/// Resolve all commands concurrently. The first failure wins; the remaining
/// resolvers keep running detached and their results are dropped.
async fn fan_out(
    registry: &Registry,
    ambient: &AmbientContext,
    commands: Vec<Command>,
) -> Result<Vec<Value>> {
    if let Some(unknown) = commands.iter().find(|cmd| !registry.contains(cmd.name())) {
        return Err(EffrouteError::UnknownCommand(unknown.name().to_string()));
    }

    let handles: Vec<_> = commands
        .into_iter()
        .map(|command| {
            let registry = registry.clone();
            let ambient = ambient.clone();
            tokio::spawn(async move { registry.resolve(command, &ambient).await })
        })
        .collect();

    try_join_all(handles.into_iter().map(|handle| async move {
        handle
            .await
            .map_err(|e| EffrouteError::handler(format!("resolver task failed: {e}")))?
    }))
    .await
}
