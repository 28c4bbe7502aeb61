//! Theme listeners.

use super::{list_body, reply};
use crate::collaborators::{ApiQuery, ApiResource};
use crate::{BackgroundContext, BackgroundResult};
use extension_port::{Disposer, Envelope, MessageName, Port};
use serde_json::Value;

pub fn listen(port: &Port, ctx: &BackgroundContext) -> Vec<Disposer> {
    let ctx = ctx.clone();
    let disposer = port.handle(MessageName::ThemesFindAll, move |envelope: Envelope| {
        let ctx = ctx.clone();
        async move { reply(envelope.name, find_all(&ctx).await) }
    });
    vec![disposer]
}

async fn find_all(ctx: &BackgroundContext) -> BackgroundResult<Vec<Value>> {
    let options = ctx.api_options()?;
    let response = ctx
        .api
        .find_all(&options, ApiResource::Themes, &ApiQuery::new())
        .await?;
    Ok(vec![list_body(response.body)])
}
