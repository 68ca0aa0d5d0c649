use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::IntegrationStore;
use crate::models::integration::{
    ConfigWrite, Integration, IntegrationPatch, IntegrationType, NewConnection, Provider,
};

/// Process-local store for `serve --ephemeral` and tests.
///
/// Each operation holds the lock for its whole read-modify-write, which gives
/// the same per-statement atomicity as the PostgreSQL store.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<Uuid, Integration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows across all organizations.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn same_key(row: &Integration, org_id: Uuid, provider: Provider) -> bool {
    row.organization_id == org_id
        && row.integration_type == provider.integration_type()
        && row.provider == provider
}

#[async_trait]
impl IntegrationStore for MemoryStore {
    async fn upsert(&self, conn: NewConnection) -> anyhow::Result<Integration> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();

        if let Some(existing) = rows
            .values_mut()
            .find(|r| same_key(r, conn.organization_id, conn.provider))
        {
            existing.config = Some(conn.config);
            existing.is_connected = conn.is_connected;
            existing.config_version += 1;
            if conn.is_connected {
                existing.last_sync_at = Some(now);
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let row = Integration {
            id: Uuid::new_v4(),
            organization_id: conn.organization_id,
            name: conn.name,
            integration_type: conn.provider.integration_type(),
            provider: conn.provider,
            config: Some(conn.config),
            config_version: 1,
            is_active: true,
            is_connected: conn.is_connected,
            last_sync_at: conn.is_connected.then_some(now),
            created_at: now,
            updated_at: now,
        };
        rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list(
        &self,
        org_id: Uuid,
        integration_type: Option<IntegrationType>,
    ) -> anyhow::Result<Vec<Integration>> {
        let rows = self.rows.read().await;
        let mut matching: Vec<Integration> = rows
            .values()
            .filter(|r| r.organization_id == org_id)
            .filter(|r| integration_type.map_or(true, |t| r.integration_type == t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn get(&self, org_id: Uuid, id: Uuid) -> anyhow::Result<Option<Integration>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&id)
            .filter(|r| r.organization_id == org_id)
            .cloned())
    }

    async fn find(&self, org_id: Uuid, provider: Provider) -> anyhow::Result<Option<Integration>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| same_key(r, org_id, provider))
            .cloned())
    }

    async fn find_connected(
        &self,
        org_id: Uuid,
        provider: Provider,
    ) -> anyhow::Result<Option<Integration>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| {
                same_key(r, org_id, provider) && r.is_active && r.is_connected && r.config.is_some()
            })
            .cloned())
    }

    async fn update(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: &IntegrationPatch,
    ) -> anyhow::Result<Option<Integration>> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&id).filter(|r| r.organization_id == org_id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            row.name = name.clone();
        }
        if let Some(active) = patch.is_active {
            row.is_active = active;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete(&self, org_id: Uuid, id: Uuid) -> anyhow::Result<Option<Integration>> {
        let mut rows = self.rows.write().await;
        match rows.get(&id) {
            Some(r) if r.organization_id == org_id => Ok(rows.remove(&id)),
            _ => Ok(None),
        }
    }

    async fn write_config(&self, id: Uuid, write: ConfigWrite) -> anyhow::Result<Option<i64>> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(expected) = write.expected_version {
            if row.config_version != expected {
                return Ok(None);
            }
        }
        row.config = Some(write.config);
        row.config_version += 1;
        if let Some(connected) = write.is_connected {
            row.is_connected = connected;
        }
        if write.touch_last_sync {
            row.last_sync_at = Some(Utc::now());
        }
        row.updated_at = Utc::now();
        Ok(Some(row.config_version))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
