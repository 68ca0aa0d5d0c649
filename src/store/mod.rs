pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::integration::{
    ConfigWrite, Integration, IntegrationPatch, IntegrationType, NewConnection, Provider,
};

/// Durable storage for integration rows.
///
/// Every read and write is scoped by organization except the id-keyed config
/// write, which callers only reach through a row they already loaded.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Create the (org, type, provider) row or overwrite its config in place.
    async fn upsert(&self, conn: NewConnection) -> anyhow::Result<Integration>;

    /// Newest first.
    async fn list(
        &self,
        org_id: Uuid,
        integration_type: Option<IntegrationType>,
    ) -> anyhow::Result<Vec<Integration>>;

    async fn get(&self, org_id: Uuid, id: Uuid) -> anyhow::Result<Option<Integration>>;

    /// Lookup regardless of connection state.
    async fn find(&self, org_id: Uuid, provider: Provider) -> anyhow::Result<Option<Integration>>;

    /// Only rows that are both active and connected.
    async fn find_connected(
        &self,
        org_id: Uuid,
        provider: Provider,
    ) -> anyhow::Result<Option<Integration>>;

    async fn update(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: &IntegrationPatch,
    ) -> anyhow::Result<Option<Integration>>;

    /// Hard delete. Returns the removed row.
    async fn delete(&self, org_id: Uuid, id: Uuid) -> anyhow::Result<Option<Integration>>;

    /// Replace the sealed config. Returns the new version, or `None` when the
    /// row is gone or `expected_version` no longer matches.
    async fn write_config(&self, id: Uuid, write: ConfigWrite) -> anyhow::Result<Option<i64>>;

    async fn ping(&self) -> anyhow::Result<()>;
}
