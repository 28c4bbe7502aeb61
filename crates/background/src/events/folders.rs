//! Folder listeners, forwarded to the API.

use super::{dto_id, list_body, reply};
use crate::collaborators::{ApiQuery, ApiResource};
use crate::{BackgroundContext, BackgroundResult};
use extension_port::{Disposer, Envelope, MessageName, Port};
use serde_json::Value;

pub fn listen(port: &Port, ctx: &BackgroundContext) -> Vec<Disposer> {
    let mut disposers = Vec::new();

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::FoldersFindAll, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, find_all(&ctx).await) }
    }));

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::FoldersGet, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, get(&ctx, &envelope).await) }
    }));

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::FoldersCreate, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, create(&ctx, &envelope).await) }
    }));

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::FoldersUpdate, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, update(&ctx, &envelope).await) }
    }));

    let c = ctx.clone();
    disposers.push(port.handle(MessageName::FoldersDelete, move |envelope: Envelope| {
        let ctx = c.clone();
        async move { reply(envelope.name, delete(&ctx, &envelope).await) }
    }));

    disposers
}

async fn find_all(ctx: &BackgroundContext) -> BackgroundResult<Vec<Value>> {
    let options = ctx.api_options()?;
    let response = ctx
        .api
        .find_all(&options, ApiResource::Folders, &ApiQuery::new())
        .await?;
    Ok(vec![list_body(response.body)])
}

async fn get(ctx: &BackgroundContext, envelope: &Envelope) -> BackgroundResult<Vec<Value>> {
    let folder_id: String = envelope.arg(0)?;
    let options = ctx.api_options()?;
    let response = ctx
        .api
        .get(&options, ApiResource::Folders, &folder_id, &ApiQuery::new())
        .await?;
    Ok(vec![response.body])
}

async fn create(ctx: &BackgroundContext, envelope: &Envelope) -> BackgroundResult<Vec<Value>> {
    let dto: Value = envelope.arg(0)?;
    let options = ctx.api_options()?;
    let response = ctx.api.create(&options, ApiResource::Folders, dto).await?;
    Ok(vec![response.body])
}

async fn update(ctx: &BackgroundContext, envelope: &Envelope) -> BackgroundResult<Vec<Value>> {
    let dto: Value = envelope.arg(0)?;
    let id = dto_id(&dto)?;
    let options = ctx.api_options()?;
    let response = ctx.api.update(&options, ApiResource::Folders, &id, dto).await?;
    Ok(vec![response.body])
}

async fn delete(ctx: &BackgroundContext, envelope: &Envelope) -> BackgroundResult<Vec<Value>> {
    let folder_id: String = envelope.arg(0)?;
    let options = ctx.api_options()?;
    let response = ctx.api.delete(&options, ApiResource::Folders, &folder_id).await?;
    Ok(vec![response.body])
}
