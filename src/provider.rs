use crate::keymap::ResourceAction;
use crate::model::{InspectView, Listing, ResourceContext, ResourceKind, ServerInfo};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn list(&self, kind: ResourceKind) -> Result<Listing>;

    async fn inspect(&self, kind: ResourceKind, id: &str) -> Result<Listing>;

    async fn history(&self, image: &str) -> Result<Listing>;

    async fn logs(&self, container: &str) -> Result<Listing>;

    async fn perform(
        &self,
        kind: ResourceKind,
        action: ResourceAction,
        target: Option<&str>,
    ) -> Result<()>;

    async fn server_info(&self) -> Result<ServerInfo>;
}

pub async fn fetch(provider: &dyn ResourceProvider, context: &ResourceContext) -> Result<Listing> {
    match context {
        ResourceContext::Browse(kind) => provider.list(*kind).await,
        ResourceContext::Logs { container } => provider.logs(container).await,
        ResourceContext::Inspect {
            kind,
            id,
            view: InspectView::Details,
        } => provider.inspect(*kind, id).await,
        ResourceContext::Inspect {
            id,
            view: InspectView::History,
            ..
        } => provider.history(id).await,
    }
}
