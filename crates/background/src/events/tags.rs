//! Tag listeners, forwarded to the API.

use super::{dto_id, list_body, reply};
use crate::collaborators::{ApiQuery, ApiResource};
use crate::{BackgroundContext, BackgroundResult};
use extension_port::{Disposer, Envelope, MessageName, Port};
use serde_json::{json, Value};
use tracing::debug;

pub fn listen(port: &Port, ctx: &BackgroundContext) -> Vec<Disposer> {
    let mut disposers = Vec::new();

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::TagsFindAll, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, find_all(&ctx).await) }
    }));

    let c = ctx.clone();
    disposers.push(port.handle(
        MessageName::TagsUpdateResourceTags,
        move |envelope: Envelope| {
            let ctx = c.clone();
            async move { reply(envelope.name, update_resource_tags(&ctx, &envelope).await) }
        },
    ));

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::TagsUpdate, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, update(&ctx, &envelope).await) }
    }));

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::TagsDelete, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, delete(&ctx, &envelope).await) }
    }));

    disposers
}

async fn find_all(ctx: &BackgroundContext) -> BackgroundResult<Vec<Value>> {
    let options = ctx.api_options()?;
    let response = ctx
        .api
        .find_all(&options, ApiResource::Tags, &ApiQuery::new())
        .await?;
    Ok(vec![list_body(response.body)])
}

/// `[resource_id, tags]`: replace the tags of one resource.
async fn update_resource_tags(
    ctx: &BackgroundContext,
    envelope: &Envelope,
) -> BackgroundResult<Vec<Value>> {
    let resource_id: String = envelope.arg(0)?;
    let tags: Vec<Value> = envelope.arg(1)?;
    let options = ctx.api_options()?;

    debug!(resource_id = %resource_id, count = tags.len(), "Updating resource tags");
    let response = ctx
        .api
        .update(&options, ApiResource::Tags, &resource_id, json!({ "tags": tags }))
        .await?;
    Ok(vec![list_body(response.body)])
}

async fn update(ctx: &BackgroundContext, envelope: &Envelope) -> BackgroundResult<Vec<Value>> {
    let dto: Value = envelope.arg(0)?;
    let id = dto_id(&dto)?;
    let options = ctx.api_options()?;
    let response = ctx.api.update(&options, ApiResource::Tags, &id, dto).await?;
    Ok(vec![response.body])
}

async fn delete(ctx: &BackgroundContext, envelope: &Envelope) -> BackgroundResult<Vec<Value>> {
    let tag_id: String = envelope.arg(0)?;
    let options = ctx.api_options()?;
    ctx.api.delete(&options, ApiResource::Tags, &tag_id).await?;
    Ok(Vec::new())
}
