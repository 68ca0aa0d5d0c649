//! Integration registry: the store plus the vault.
//!
//! Every credential read and write in the service goes through here, so the
//! rest of the crate only ever sees typed [`CredentialBlob`]s.

use std::sync::Arc;

use uuid::Uuid;

use crate::errors::AppError;
use crate::models::credentials::CredentialBlob;
use crate::models::integration::{
    ConfigWrite, Integration, IntegrationPatch, IntegrationType, NewConnection, Provider,
};
use crate::store::IntegrationStore;
use crate::vault::CredentialVault;

/// A connected row together with its opened credentials.
#[derive(Debug, Clone)]
pub struct LoadedIntegration {
    pub integration: Integration,
    pub credentials: CredentialBlob,
}

#[derive(Clone)]
pub struct IntegrationRegistry {
    store: Arc<dyn IntegrationStore>,
    vault: Arc<CredentialVault>,
}

impl IntegrationRegistry {
    pub fn new(store: Arc<dyn IntegrationStore>, vault: Arc<CredentialVault>) -> Self {
        Self { store, vault }
    }

    pub fn store(&self) -> &Arc<dyn IntegrationStore> {
        &self.store
    }

    /// Create the row for (org, type, provider) or overwrite its credentials.
    ///
    /// `is_connected` is true only for providers that connect without an
    /// interactive authorization step.
    pub async fn connect_or_update(
        &self,
        org_id: Uuid,
        name: Option<String>,
        credentials: &CredentialBlob,
        is_connected: bool,
    ) -> Result<Integration, AppError> {
        let provider = credentials.provider();
        let config = self.vault.encrypt(credentials)?;
        let integration = self
            .store
            .upsert(NewConnection {
                organization_id: org_id,
                provider,
                name: name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| provider.display_name().to_string()),
                config,
                is_connected,
            })
            .await?;

        tracing::info!(
            org_id = %org_id,
            provider = %provider,
            integration_id = %integration.id,
            is_connected,
            "Integration credentials saved"
        );
        Ok(integration)
    }

    pub async fn list(
        &self,
        org_id: Uuid,
        integration_type: Option<IntegrationType>,
    ) -> Result<Vec<Integration>, AppError> {
        Ok(self.store.list(org_id, integration_type).await?)
    }

    pub async fn get(&self, org_id: Uuid, id: Uuid) -> Result<Integration, AppError> {
        self.store
            .get(org_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Integration not found".into()))
    }

    pub async fn update(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: &IntegrationPatch,
    ) -> Result<Integration, AppError> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation {
                    field: "name".into(),
                    message: "name must not be empty".into(),
                });
            }
        }
        self.store
            .update(org_id, id, patch)
            .await?
            .ok_or_else(|| AppError::NotFound("Integration not found".into()))
    }

    pub async fn delete(&self, org_id: Uuid, id: Uuid) -> Result<Integration, AppError> {
        let removed = self
            .store
            .delete(org_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Integration not found".into()))?;
        tracing::info!(org_id = %org_id, integration_id = %id, provider = %removed.provider, "Integration deleted");
        Ok(removed)
    }

    /// The row for a provider regardless of connection state.
    pub async fn find(&self, org_id: Uuid, provider: Provider) -> Result<Option<Integration>, AppError> {
        Ok(self.store.find(org_id, provider).await?)
    }

    pub async fn find_connected(
        &self,
        org_id: Uuid,
        provider: Provider,
    ) -> Result<Option<Integration>, AppError> {
        Ok(self.store.find_connected(org_id, provider).await?)
    }

    /// Open a row's credentials. The blob must belong to the row's provider.
    pub fn open(&self, integration: &Integration) -> Result<CredentialBlob, AppError> {
        let sealed = integration
            .config
            .as_deref()
            .ok_or_else(|| AppError::not_connected(integration.provider))?;
        let blob: CredentialBlob = self.vault.decrypt(sealed)?;
        if blob.provider() != integration.provider {
            return Err(AppError::Internal(anyhow::anyhow!(
                "integration {} holds {} credentials",
                integration.id,
                blob.provider()
            )));
        }
        Ok(blob)
    }

    /// Connected row plus decrypted credentials, or `NotConnected`.
    ///
    /// A blob that fails to open is reported as not connected and logged; it
    /// never surfaces as a server error.
    pub async fn load_connected(
        &self,
        org_id: Uuid,
        provider: Provider,
    ) -> Result<LoadedIntegration, AppError> {
        let integration = self
            .find_connected(org_id, provider)
            .await?
            .ok_or_else(|| AppError::not_connected(provider))?;

        match self.open(&integration) {
            Ok(credentials) => Ok(LoadedIntegration {
                integration,
                credentials,
            }),
            Err(AppError::Decryption(e)) => {
                tracing::error!(
                    org_id = %org_id,
                    provider = %provider,
                    integration_id = %integration.id,
                    "Stored credentials could not be opened: {}",
                    e
                );
                Err(AppError::not_connected(provider))
            }
            Err(e) => Err(e),
        }
    }

    /// Seal and store updated credentials for an existing row.
    ///
    /// With `expected_version` set the write is a compare-and-set and returns
    /// `None` when another writer got there first.
    pub async fn save_credentials(
        &self,
        integration_id: Uuid,
        credentials: &CredentialBlob,
        expected_version: Option<i64>,
        is_connected: Option<bool>,
    ) -> Result<Option<i64>, AppError> {
        let config = self.vault.encrypt(credentials)?;
        let version = self
            .store
            .write_config(
                integration_id,
                ConfigWrite {
                    config,
                    expected_version,
                    is_connected,
                    touch_last_sync: is_connected == Some(true),
                },
            )
            .await?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credentials::{Secret, TwilioCredentials};
    use crate::store::memory::MemoryStore;
    use crate::vault::builtin::generate_master_key;

    fn registry() -> IntegrationRegistry {
        let vault = CredentialVault::new(&generate_master_key()).unwrap();
        IntegrationRegistry::new(Arc::new(MemoryStore::new()), Arc::new(vault))
    }

    fn twilio(token: &str) -> CredentialBlob {
        CredentialBlob::Twilio(TwilioCredentials {
            account_sid: "AC123".into(),
            auth_token: Secret::new(token),
            phone_number: "+15550001111".into(),
        })
    }

    #[tokio::test]
    async fn test_connect_twice_overwrites() {
        let registry = registry();
        let org = Uuid::new_v4();

        let first = registry
            .connect_or_update(org, None, &twilio("one"), true)
            .await
            .unwrap();
        let second = registry
            .connect_or_update(org, None, &twilio("two"), true)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Twilio SMS");

        let loaded = registry.load_connected(org, Provider::Twilio).await.unwrap();
        assert_eq!(loaded.credentials, twilio("two"));
        assert_eq!(registry.list(org, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_key_reads_as_not_connected() {
        let store: Arc<dyn IntegrationStore> = Arc::new(MemoryStore::new());
        let org = Uuid::new_v4();
        let writer = IntegrationRegistry::new(
            store.clone(),
            Arc::new(CredentialVault::new(&generate_master_key()).unwrap()),
        );
        writer
            .connect_or_update(org, None, &twilio("tok"), true)
            .await
            .unwrap();

        let reader = IntegrationRegistry::new(
            store,
            Arc::new(CredentialVault::new(&generate_master_key()).unwrap()),
        );
        let err = reader.load_connected(org, Provider::Twilio).await.unwrap_err();
        assert!(matches!(err, AppError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_missing_rows_are_not_found() {
        let registry = registry();
        let org = Uuid::new_v4();
        assert!(matches!(
            registry.get(org, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            registry.delete(org, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            registry.load_connected(org, Provider::Zoom).await,
            Err(AppError::NotConnected(_))
        ));
    }
}
