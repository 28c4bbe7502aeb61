//! Quick access popup listeners.

use super::reply;
use crate::controllers::UseResourceController;
use crate::{BackgroundContext, BackgroundResult};
use extension_port::{Disposer, Envelope, MessageName, Port};
use serde_json::Value;

pub fn listen(port: &Port, ctx: &BackgroundContext) -> Vec<Disposer> {
    let ctx = ctx.clone();
    let use_resource = port.handle(
        MessageName::UseResourceOnCurrentTab,
        move |envelope: Envelope| {
            let ctx = ctx.clone();
            async move { reply(envelope.name, use_resource_on_current_tab(&ctx, &envelope).await) }
        },
    );

    vec![use_resource]
}

/// `[resource_id]`: fill the active tab with the resource's credentials.
async fn use_resource_on_current_tab(
    ctx: &BackgroundContext,
    envelope: &Envelope,
) -> BackgroundResult<Vec<Value>> {
    let resource_id: String = envelope.arg(0)?;
    UseResourceController::new(ctx).main(&resource_id).await?;
    Ok(Vec::new())
}
