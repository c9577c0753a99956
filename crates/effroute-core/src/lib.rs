//! effroute-core
//!
//! Effect-interpreting HTTP routing: handlers describe side effects as
//! commands, and a per-server registry of resolvers carries them out.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（command, response, context, errors）
//! - **ports**: 抽象化レイヤー（Resolver, TransportContext）
//! - **registry / commands**: command 名 → resolver の対応と base command set
//! - **interpreter**: effect script を最後まで駆動する
//! - **handler / router / synth**: route 定義と response の合成
//! - **app**: ServerConfig, Lifecycle, ErrorPipeline, Server
//! - **impls**: axum 上の TransportContext 実装
//!
//! # 使用例
//! ```ignore
//! use effroute_core::{cmds, init, router, send, Handler, ServerConfig};
//!
//! let hello = Handler::script(|_args, fx| async move {
//!     let message = fx.perform(cmds::echo(json!("hello world"))).await?;
//!     Ok(Some(send(message)))
//! });
//! let server = init(ServerConfig::builder().route(router::get("/hello-world", hello)).build()?);
//! server.start().await?;
//! ```

pub mod domain;
pub mod ports;
pub mod registry;
pub mod commands;
pub mod interpreter;
pub mod handler;
pub mod router;
pub mod synth;
pub mod app;
pub mod impls;

pub use crate::app::{Server, ServerConfig, ServerConfigBuilder, init};
pub use crate::commands::{cmds, universal};
pub use crate::domain::{
    AmbientContext, Command, EffrouteError, ErrorEnvelope, HandlerFailure, LogicalResponse,
    Result, create_cookie, not_authorized, not_found, send,
};
pub use crate::handler::{Handler, Reply, RequestArgs};
pub use crate::interpreter::{Effects, interpret};
pub use crate::ports::Resolver;
pub use crate::registry::{Interpreters, Registry};
