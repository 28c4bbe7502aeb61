//! Secret listeners.

use super::reply;
use crate::controllers::SecretDecryptController;
use crate::{BackgroundContext, BackgroundResult};
use extension_port::{Disposer, Envelope, MessageName, Port};
use serde_json::Value;

pub fn listen(port: &Port, ctx: &BackgroundContext) -> Vec<Disposer> {
    let ctx = ctx.clone();
    let disposer = port.handle(MessageName::SecretDecrypt, move |envelope: Envelope| {
        let ctx = ctx.clone();
        async move { reply(envelope.name, decrypt(&ctx, &envelope).await) }
    });
    vec![disposer]
}

/// `[resource_id]` -> `[plaintext]`
async fn decrypt(ctx: &BackgroundContext, envelope: &Envelope) -> BackgroundResult<Vec<Value>> {
    let resource_id: String = envelope.arg(0)?;
    let secret = SecretDecryptController::new(ctx).main(&resource_id).await?;
    Ok(vec![secret.plaintext.to_value()])
}
