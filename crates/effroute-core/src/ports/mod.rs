//! Ports - 抽象化レイヤー
//!
//! コアが外部と接する境界を trait として定義する。
//! - **Resolver**: command 名に束縛された async 処理
//! - **TransportContext**: HTTP exchange（読み取り + response の書き込み）

pub mod resolver;
pub mod transport;

pub use self::resolver::{FnResolver, Resolver, resolver_fn};
pub use self::transport::{DEFAULT_STATUS, TransportContext};
