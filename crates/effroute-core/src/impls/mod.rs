//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **Exchange**: axum の request/response を包む TransportContext
//! - **ContextHandle**: handler と synthesizer が共有する Exchange へのハンドル

pub mod exchange;

pub use self::exchange::{BODY_LIMIT, ContextHandle, Exchange, ExchangeBuilder, Parsing};
