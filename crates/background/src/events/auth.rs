//! Login page listeners.

use super::reply;
use crate::{BackgroundContext, BackgroundResult};
use extension_port::{Disposer, Envelope, Message, MessageName, Port, WeakChannel};
use serde_json::{json, Value};
use tracing::info;

pub fn listen(port: &Port, ctx: &BackgroundContext) -> Vec<Disposer> {
    let mut disposers = Vec::new();

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::KeyringServerGet, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, server_key(&ctx)) }
    }));

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::AuthVerifyServerKey, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, verify_server_key(&ctx).await) }
    }));

    // Feedback events go back on the port the request came from.
    let c = ctx.clone();
    let feedback = port.channel().downgrade();
    disposers.push(port.handle(MessageName::AuthVerify, move |envelope: Envelope| {
        let ctx = c.clone();
        let feedback = feedback.clone();
        async move { reply(envelope.name, verify(&ctx, &feedback).await) }
    }));

    disposers
}

/// Pinned server key.
fn server_key(ctx: &BackgroundContext) -> BackgroundResult<Vec<Value>> {
    let key = ctx.verifier.pinned_server_key()?;
    Ok(vec![serde_json::to_value(key)?])
}

async fn verify_server_key(ctx: &BackgroundContext) -> BackgroundResult<Vec<Value>> {
    let key = ctx.verifier.verify_server_key().await?;
    Ok(vec![serde_json::to_value(key)?])
}

fn notify(feedback: &WeakChannel, name: MessageName, args: Vec<Value>) {
    if let Some(channel) = feedback.upgrade() {
        channel.emit(Message::Event { name, args });
    }
}

/// Runs the handshake. The login page only hears `auth.login-processing`
/// and `auth.login-success` once the server has proved its key, and
/// `auth.login-failed` otherwise.
async fn verify(ctx: &BackgroundContext, feedback: &WeakChannel) -> BackgroundResult<Vec<Value>> {
    match ctx.verifier.verify().await {
        Ok(outcome) => {
            info!("Server verified for login");
            notify(
                feedback,
                MessageName::AuthLoginProcessing,
                vec![json!("Server verified, logging in")],
            );
            notify(feedback, MessageName::AuthLoginSuccess, Vec::new());
            Ok(vec![serde_json::to_value(outcome)?])
        }
        Err(error) => {
            notify(
                feedback,
                MessageName::AuthLoginFailed,
                vec![json!(error.message())],
            );
            Err(error.into())
        }
    }
}
