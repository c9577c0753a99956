//! App - アプリケーション層
//!
//! domain / ports / interpreter を組み合わせて HTTP サーバーを組み立てます。
//!
//! # 主要コンポーネント
//! - **ServerConfigBuilder**: 設定の構築と起動前検証
//! - **Lifecycle**: 1 リクエストの dispatch → synthesize
//! - **ErrorPipeline**: 失敗の report と render
//! - **Server**: listen / stop の状態管理

pub mod builder;
pub mod lifecycle;
pub mod pipeline;
pub mod server;

// 主要な型を再エクスポート
pub use self::builder::{ConfigError, Middleware, ServerConfig, ServerConfigBuilder};
pub use self::lifecycle::Lifecycle;
pub use self::pipeline::{ErrorPipeline, ErrorRenderer, ErrorReporter, Next, Rendered};
pub use self::server::{SECURITY_HEADERS, Server, ServerStatus, init};
