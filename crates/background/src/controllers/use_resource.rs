//! Fill the active tab's form with a decrypted resource.

use super::SecretDecryptController;
use crate::{BackgroundContext, BackgroundError, BackgroundResult};
use extension_port::{MessageName, WorkerRole};
use serde_json::json;
use tracing::{info, warn};

pub struct UseResourceController<'a> {
    ctx: &'a BackgroundContext,
}

impl<'a> UseResourceController<'a> {
    pub fn new(ctx: &'a BackgroundContext) -> Self {
        Self { ctx }
    }

    /// Resolves once the page integration worker confirmed the fill.
    pub async fn main(&self, resource_id: &str) -> BackgroundResult<()> {
        let tab = self.ctx.tabs.active_tab().await?.ok_or_else(|| {
            warn!(resource_id, "No active tab to fill");
            BackgroundError::NoActiveTab
        })?;

        let secret = SecretDecryptController::new(self.ctx).main(resource_id).await?;

        let worker = self.ctx.registry.get(&WorkerRole::WEB_INTEGRATION, tab.id)?;
        worker
            .port
            .request(
                MessageName::FormFill,
                vec![
                    json!(secret.username()),
                    json!(secret.password()),
                    json!(tab.url),
                ],
            )
            .await?;

        info!(resource_id, tab_id = tab.id, "Form filled");
        Ok(())
    }
}
