//! Request listeners attached to every worker port.
//!
//! Each listener decodes its positional arguments, runs one operation
//! against the `BackgroundContext` and answers the request id with
//! `SUCCESS` or `ERROR`.
//!
//! Listener bodies run as separate tasks on the multi-thread runtime, so two
//! requests on one port may finish in any order. Only the closure part runs
//! in arrival order; listeners here keep no state between requests and
//! callers pair answers by id.

mod auth;
mod folders;
mod quickaccess;
mod secret;
mod tags;
mod themes;

use crate::{BackgroundContext, BackgroundResult};
use extension_port::{Disposer, ErrorPayload, MessageName, Port};
use serde_json::Value;
use tracing::warn;

/// Attach every background listener to `port`.
pub fn listen(port: &Port, ctx: &BackgroundContext) -> Vec<Disposer> {
    let mut disposers = Vec::new();
    disposers.extend(auth::listen(port, ctx));
    disposers.extend(quickaccess::listen(port, ctx));
    disposers.extend(secret::listen(port, ctx));
    disposers.extend(tags::listen(port, ctx));
    disposers.extend(themes::listen(port, ctx));
    disposers.extend(folders::listen(port, ctx));
    disposers
}

/// Turn an operation result into the handler's answer, logging failures.
pub(crate) fn reply(
    name: MessageName,
    result: BackgroundResult<Vec<Value>>,
) -> Result<Vec<Value>, ErrorPayload> {
    result.map_err(|error| {
        let payload = error.to_payload();
        warn!(name = %name, kind = payload.kind.as_str(), error = %payload.message, "Request failed");
        payload
    })
}

/// Body of a list answer; anything but an array becomes `[]`.
pub(crate) fn list_body(body: Value) -> Value {
    match body {
        Value::Array(items) => Value::Array(items),
        _ => Value::Array(Vec::new()),
    }
}

/// `id` field of an entity DTO.
pub(crate) fn dto_id(dto: &Value) -> BackgroundResult<String> {
    dto.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| crate::BackgroundError::InvalidParams("entity id is not set".to_string()))
}
