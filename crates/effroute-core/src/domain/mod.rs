//! Domain model (commands, responses, ambient context, errors).

pub mod command;
pub mod context;
pub mod errors;
pub mod response;

pub use self::command::{Command, Effect, Resumed};
pub use self::context::AmbientContext;
pub use self::errors::{
    BoxError, EffrouteError, ErrorEnvelope, HandlerFailure, Result, TransportFailure,
};
pub use self::response::{
    CookieOptions, CookieSpec, Headers, InvalidCookie, LogicalResponse, create_cookie, not_authorized,
    not_found, send,
};
