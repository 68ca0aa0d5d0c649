use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::IntegrationStore;
use crate::models::integration::{
    ConfigWrite, Integration, IntegrationPatch, IntegrationRow, IntegrationType, NewConnection,
    Provider,
};

const COLUMNS: &str = "id, organization_id, name, integration_type, provider, config, \
     config_version, is_active, is_connected, last_sync_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn convert(rows: Vec<IntegrationRow>) -> anyhow::Result<Vec<Integration>> {
    rows.into_iter().map(Integration::try_from).collect()
}

#[async_trait]
impl IntegrationStore for PgStore {
    async fn upsert(&self, conn: NewConnection) -> anyhow::Result<Integration> {
        // One statement: concurrent connects for the same key converge on one row.
        let sql = format!(
            "INSERT INTO integrations \
                 (organization_id, name, integration_type, provider, config, is_connected, last_sync_at) \
             VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $6 THEN NOW() END) \
             ON CONFLICT (organization_id, integration_type, provider) DO UPDATE SET \
                 config = EXCLUDED.config, \
                 is_connected = EXCLUDED.is_connected, \
                 config_version = integrations.config_version + 1, \
                 last_sync_at = COALESCE(EXCLUDED.last_sync_at, integrations.last_sync_at), \
                 updated_at = NOW() \
             RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(conn.organization_id)
            .bind(&conn.name)
            .bind(conn.provider.integration_type().as_str())
            .bind(conn.provider.as_str())
            .bind(&conn.config)
            .bind(conn.is_connected)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn list(
        &self,
        org_id: Uuid,
        integration_type: Option<IntegrationType>,
    ) -> anyhow::Result<Vec<Integration>> {
        let sql = format!(
            "SELECT {} FROM integrations \
             WHERE organization_id = $1 AND ($2::TEXT IS NULL OR integration_type = $2) \
             ORDER BY created_at DESC",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(org_id)
            .bind(integration_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }

    async fn get(&self, org_id: Uuid, id: Uuid) -> anyhow::Result<Option<Integration>> {
        let sql = format!(
            "SELECT {} FROM integrations WHERE id = $1 AND organization_id = $2",
            COLUMNS
        );
        let row = sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Integration::try_from).transpose()
    }

    async fn find(&self, org_id: Uuid, provider: Provider) -> anyhow::Result<Option<Integration>> {
        let sql = format!(
            "SELECT {} FROM integrations \
             WHERE organization_id = $1 AND integration_type = $2 AND provider = $3",
            COLUMNS
        );
        let row = sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(org_id)
            .bind(provider.integration_type().as_str())
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Integration::try_from).transpose()
    }

    async fn find_connected(
        &self,
        org_id: Uuid,
        provider: Provider,
    ) -> anyhow::Result<Option<Integration>> {
        let sql = format!(
            "SELECT {} FROM integrations \
             WHERE organization_id = $1 AND integration_type = $2 AND provider = $3 \
               AND is_active AND is_connected AND config IS NOT NULL",
            COLUMNS
        );
        let row = sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(org_id)
            .bind(provider.integration_type().as_str())
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Integration::try_from).transpose()
    }

    async fn update(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: &IntegrationPatch,
    ) -> anyhow::Result<Option<Integration>> {
        let sql = format!(
            "UPDATE integrations SET \
                 name = COALESCE($3, name), \
                 is_active = COALESCE($4, is_active), \
                 updated_at = NOW() \
             WHERE id = $1 AND organization_id = $2 \
             RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(id)
            .bind(org_id)
            .bind(patch.name.as_deref())
            .bind(patch.is_active)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Integration::try_from).transpose()
    }

    async fn delete(&self, org_id: Uuid, id: Uuid) -> anyhow::Result<Option<Integration>> {
        let sql = format!(
            "DELETE FROM integrations WHERE id = $1 AND organization_id = $2 RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query_as::<_, IntegrationRow>(&sql)
            .bind(id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Integration::try_from).transpose()
    }

    async fn write_config(&self, id: Uuid, write: ConfigWrite) -> anyhow::Result<Option<i64>> {
        let version = sqlx::query_scalar::<_, i64>(
            "UPDATE integrations SET \
                 config = $2, \
                 config_version = config_version + 1, \
                 is_connected = COALESCE($3, is_connected), \
                 last_sync_at = CASE WHEN $4 THEN NOW() ELSE last_sync_at END, \
                 updated_at = NOW() \
             WHERE id = $1 AND ($5::BIGINT IS NULL OR config_version = $5) \
             RETURNING config_version",
        )
        .bind(id)
        .bind(&write.config)
        .bind(write.is_connected)
        .bind(write.touch_last_sync)
        .bind(write.expected_version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
