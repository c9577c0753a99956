//! Base command set merged under caller-supplied interpreters.
//!
//! `cmds` builds the descriptors; `universal()` returns the matching resolvers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use ulid::Ulid;

use crate::domain::{AmbientContext, EffrouteError, Result};
use crate::ports::Resolver;
use crate::registry::Interpreters;

pub const ECHO: &str = "echo";
pub const NOW: &str = "now";
pub const RANDOM_NUMBER: &str = "random_number";
pub const ULID: &str = "ulid";
pub const LOG_INFO: &str = "log_info";
pub const LOG_ERROR: &str = "log_error";
pub const SLEEP: &str = "sleep";

/// Command constructors.
pub mod cmds {
    use serde_json::{Value, json};

    use super::*;
    use crate::domain::Command;

    pub fn echo(payload: Value) -> Command {
        Command::new(ECHO, payload)
    }

    pub fn now() -> Command {
        Command::new(NOW, Value::Null)
    }

    pub fn random_number() -> Command {
        Command::new(RANDOM_NUMBER, Value::Null)
    }

    pub fn ulid() -> Command {
        Command::new(ULID, Value::Null)
    }

    pub fn log_info(message: impl Into<String>) -> Command {
        Command::new(LOG_INFO, json!(message.into()))
    }

    pub fn log_error(message: impl Into<String>) -> Command {
        Command::new(LOG_ERROR, json!(message.into()))
    }

    pub fn sleep(millis: u64) -> Command {
        Command::new(SLEEP, json!(millis))
    }
}

/// The base interpreters: echo, now, random_number, ulid, log_info, log_error, sleep.
pub fn universal() -> Interpreters {
    Interpreters::new()
        .with(ECHO, Arc::new(Echo))
        .with(NOW, Arc::new(Now))
        .with(RANDOM_NUMBER, Arc::new(RandomNumber))
        .with(ULID, Arc::new(NewUlid))
        .with(LOG_INFO, Arc::new(Log { error: false }))
        .with(LOG_ERROR, Arc::new(Log { error: true }))
        .with(SLEEP, Arc::new(Sleep))
}

struct Echo;

#[async_trait]
impl Resolver for Echo {
    async fn resolve(&self, payload: Value, _ambient: &AmbientContext) -> Result<Value> {
        Ok(payload)
    }
}

struct Now;

#[async_trait]
impl Resolver for Now {
    async fn resolve(&self, _payload: Value, _ambient: &AmbientContext) -> Result<Value> {
        Ok(json!(Utc::now().to_rfc3339()))
    }
}

struct RandomNumber;

#[async_trait]
impl Resolver for RandomNumber {
    async fn resolve(&self, _payload: Value, _ambient: &AmbientContext) -> Result<Value> {
        Ok(json!(rand::random::<f64>()))
    }
}

struct NewUlid;

#[async_trait]
impl Resolver for NewUlid {
    async fn resolve(&self, _payload: Value, _ambient: &AmbientContext) -> Result<Value> {
        let timestamp_ms = Utc::now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        Ok(json!(ulid.to_string()))
    }
}

struct Log {
    error: bool,
}

#[async_trait]
impl Resolver for Log {
    async fn resolve(&self, payload: Value, _ambient: &AmbientContext) -> Result<Value> {
        let message = match payload {
            Value::String(s) => s,
            other => other.to_string(),
        };
        if self.error {
            tracing::error!(target: "effroute::script", "{message}");
        } else {
            tracing::info!(target: "effroute::script", "{message}");
        }
        Ok(Value::Null)
    }
}

struct Sleep;

#[async_trait]
impl Resolver for Sleep {
    async fn resolve(&self, payload: Value, _ambient: &AmbientContext) -> Result<Value> {
        let millis = payload
            .as_u64()
            .ok_or_else(|| EffrouteError::handler("sleep expects a number of milliseconds"))?;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn registry() -> Registry {
        Registry::merge(universal(), Interpreters::new())
    }

    #[tokio::test]
    async fn echo_returns_payload_unchanged() {
        let payload = json!({ "foo": ["bar", 1, null] });
        let out = registry()
            .resolve(cmds::echo(payload.clone()), &AmbientContext::default())
            .await
            .unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn now_is_rfc3339() {
        let out = registry()
            .resolve(cmds::now(), &AmbientContext::default())
            .await
            .unwrap();
        let text = out.as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(text).is_ok());
    }

    #[tokio::test]
    async fn ulid_is_parseable_and_random_number_in_range() {
        let reg = registry();
        let ambient = AmbientContext::default();

        let id = reg.resolve(cmds::ulid(), &ambient).await.unwrap();
        assert!(Ulid::from_string(id.as_str().unwrap()).is_ok());

        let n = reg.resolve(cmds::random_number(), &ambient).await.unwrap();
        let n = n.as_f64().unwrap();
        assert!((0.0..1.0).contains(&n));
    }

    #[tokio::test]
    async fn sleep_rejects_non_numeric_payload() {
        let err = registry()
            .resolve(
                crate::domain::Command::new(SLEEP, json!("soon")),
                &AmbientContext::default(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("milliseconds"));
    }

    #[tokio::test]
    async fn log_commands_resolve_to_null() {
        let reg = registry();
        let ambient = AmbientContext::default();
        assert_eq!(reg.resolve(cmds::log_info("hi"), &ambient).await.unwrap(), Value::Null);
        assert_eq!(reg.resolve(cmds::log_error("bye"), &ambient).await.unwrap(), Value::Null);
    }
}
