use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use clap::Parser;
use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use effroute_core::{
    AmbientContext, Command, Effects, Handler, RequestArgs, Reply, Resolver, ServerConfig, cmds,
    init, not_found, router, send,
};

/// Demo server for effect-interpreting route handlers.
#[derive(Debug, Parser)]
#[command(name = "effroute", version)]
struct Cli {
    #[arg(short, long, default_value_t = ServerConfig::DEFAULT_PORT)]
    port: u16,

    /// Debug-level logs (RUST_LOG wins when set).
    #[arg(short, long)]
    verbose: bool,

    /// Ambient context handed to every resolver, as JSON.
    #[arg(long, default_value = "{}")]
    context: String,
}

/// `greet`：ambient context の `greeting` を使って挨拶を組み立てる
struct Greet;

#[async_trait]
impl Resolver for Greet {
    async fn resolve(
        &self,
        payload: Value,
        ambient: &AmbientContext,
    ) -> effroute_core::Result<Value> {
        let greeting = ambient
            .get("greeting")
            .and_then(Value::as_str)
            .unwrap_or("hello");
        let name = payload.as_str().unwrap_or("world");
        Ok(json!(format!("{greeting}, {name}")))
    }
}

async fn hello_world(_args: RequestArgs, fx: Effects) -> effroute_core::Result<Reply> {
    let message = fx.perform(cmds::echo(json!("hello world"))).await?;
    Ok(Some(send(json!({ "message": message }))))
}

async fn greet(args: RequestArgs, fx: Effects) -> effroute_core::Result<Reply> {
    let name = args.query.get("name").cloned().unwrap_or_default();
    let (message, _) = tokio::join!(
        fx.perform(Command::new("greet", json!(name))),
        fx.perform(cmds::log_info(format!("greeting {name}"))),
    );
    Ok(Some(send(json!({ "message": message? }))))
}

async fn item(args: RequestArgs, fx: Effects) -> effroute_core::Result<Reply> {
    let Some(id) = args.params.get("id").cloned() else {
        return Ok(Some(not_found(None)));
    };
    let mut group = IndexMap::new();
    group.insert("id".to_string(), cmds::echo(json!(id)));
    group.insert("ulid".to_string(), cmds::ulid());
    group.insert("fetchedAt".to_string(), cmds::now());
    let item = fx.all_named(group).await?;
    Ok(Some(send(json!(item))))
}

async fn echo(args: RequestArgs, fx: Effects) -> effroute_core::Result<Reply> {
    let body = fx.perform(cmds::echo(args.body)).await?;
    Ok(Some(send(body)))
}

/// ctx に直接書き込む plain handler
async fn plain(args: RequestArgs) -> effroute_core::Result<Reply> {
    args.ctx.set_body(json!({ "message": "foo bar" }));
    Ok(None)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let context: Value =
        serde_json::from_str(&cli.context).context("--context must be valid JSON")?;

    let config = ServerConfig::builder()
        .port(cli.port)
        .context(context)
        .interpreter("greet", Arc::new(Greet))
        .routes([
            router::get("/hello-world", Handler::script(hello_world)),
            router::get("/greet", Handler::script(greet)),
            router::get("/items/:id", Handler::script(item)),
            router::post("/echo", Handler::script(echo)),
            router::get("/plain", Handler::plain(plain)),
        ])
        .on_error(|err, _ambient| {
            tracing::warn!(error = %err, "handler failed");
            async {}
        })
        .build()?;

    let server = init(config);
    let addr = server.start().await?;
    tracing::debug!(%addr, "ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    server.stop().await?;
    Ok(())
}
