//! Startup wiring.
//!
//! [`Vault`] builds every component once from [`AppConfig`] and hands out
//! shared references; nothing here is global. [`Records`] fans the typed
//! repositories out behind a [`RecordKind`] switch for the shell.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use url::Url;

use securevault_auth::{BiometricBinder, SessionManager};
use securevault_crypto::{CredentialStore, SessionKey, SessionKeySlot, SqliteStorage};
use securevault_store::records::decode;
use securevault_store::{
    ApiClient, AttachmentStore, BackendClient, BankAccount, CreditCard, Deposit, ExpiringItem,
    GeneralDocument, InsurancePolicy, RecordKind, Repository, ServiceMonitor, StoreResult,
    VaultEntity, VaultRecord, Website, collect_expiring,
};

use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Every long-lived component of a running vault.
pub struct Vault {
    pub config: AppConfig,
    pub backend: Arc<BackendClient>,
    pub credentials: CredentialStore,
    pub keys: SessionKeySlot,
    pub session: SessionManager,
    pub biometrics: BiometricBinder,
    pub records: Records,
    pub attachments: AttachmentStore,
    pub monitor: ServiceMonitor,
}

impl Vault {
    pub fn open(config: AppConfig) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
        let db_path = SqliteStorage::default_path(data_dir);
        let storage = SqliteStorage::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        tracing::info!(path = %db_path.display(), "local storage ready");

        let credentials = CredentialStore::new(Arc::new(storage));
        let keys = SessionKeySlot::new();

        let backend = Arc::new(
            BackendClient::new(&config.backend_config()).context("invalid backend settings")?,
        );
        let api = ApiClient::new(&config.api.url).context("invalid API URL")?;

        let session = SessionManager::new(
            backend.clone(),
            credentials.clone(),
            keys.clone(),
            config.session_config(),
        )
        .context("failed to start session manager")?;

        // No platform credential API is reachable from a terminal.
        let biometrics = BiometricBinder::new(None, credentials.clone(), rp_id(&config.api.url));

        Ok(Self {
            records: Records::new(&api, &keys),
            attachments: AttachmentStore::new(backend.clone()),
            monitor: ServiceMonitor::new(api, config.health_config()),
            config,
            backend,
            credentials,
            keys,
            session,
            biometrics,
        })
    }

    /// Expiring items across all cached-or-fetched records, minus dismissed
    /// notifications.
    pub async fn expiring(&self, today: chrono::NaiveDate) -> Result<Vec<ExpiringItem>> {
        let mut records = Vec::new();
        for kind in RecordKind::ALL.into_iter().filter(RecordKind::tracks_expiry) {
            records.extend(self.records.list(kind).await?);
        }
        let dismissed: BTreeSet<String> = self.credentials.dismissed_notifications()?;
        Ok(collect_expiring(&records, &dismissed, today))
    }

    /// Move records still sealed under a retired key to the current one,
    /// then forget the retired keys. On error they stay retired and the call
    /// can simply be repeated.
    pub async fn finish_rekey(&self) -> StoreResult<usize> {
        let Some(previous) = self.keys.retired().into_iter().next() else {
            return Ok(0);
        };
        let rewritten = self.records.reencrypt_all(&previous).await?;
        self.keys.finish_rotation();
        tracing::info!(rewritten, "re-encryption complete");
        Ok(rewritten)
    }
}

/// Relying-party id: the host part of the API URL.
pub fn rp_id(api_url: &str) -> String {
    Url::parse(api_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One repository per record kind.
pub struct Records {
    pub bank_accounts: Repository<BankAccount>,
    pub credit_cards: Repository<CreditCard>,
    pub documents: Repository<GeneralDocument>,
    pub policies: Repository<InsurancePolicy>,
    pub deposits: Repository<Deposit>,
    pub websites: Repository<Website>,
}

macro_rules! with_repo {
    ($records:expr, $kind:expr, |$repo:ident| $body:expr) => {
        match $kind {
            RecordKind::BankAccount => {
                let $repo = &$records.bank_accounts;
                $body
            }
            RecordKind::CreditCard => {
                let $repo = &$records.credit_cards;
                $body
            }
            RecordKind::GeneralDocument => {
                let $repo = &$records.documents;
                $body
            }
            RecordKind::InsurancePolicy => {
                let $repo = &$records.policies;
                $body
            }
            RecordKind::Deposit => {
                let $repo = &$records.deposits;
                $body
            }
            RecordKind::Website => {
                let $repo = &$records.websites;
                $body
            }
        }
    };
}

impl Records {
    pub fn new(api: &ApiClient, keys: &SessionKeySlot) -> Self {
        Self {
            bank_accounts: Repository::new(api.clone(), keys.clone()),
            credit_cards: Repository::new(api.clone(), keys.clone()),
            documents: Repository::new(api.clone(), keys.clone()),
            policies: Repository::new(api.clone(), keys.clone()),
            deposits: Repository::new(api.clone(), keys.clone()),
            websites: Repository::new(api.clone(), keys.clone()),
        }
    }

    pub async fn list(&self, kind: RecordKind) -> StoreResult<Vec<VaultRecord>> {
        with_repo!(self, kind, |repo| Ok(wrap(repo.list().await?)))
    }

    /// Look in the cache first, then refetch.
    pub async fn find(&self, kind: RecordKind, id: &str) -> StoreResult<Option<VaultRecord>> {
        with_repo!(self, kind, |repo| {
            if let Some(hit) = repo.get(id) {
                return Ok(Some(hit.into()));
            }
            repo.refresh().await?;
            Ok(repo.get(id).map(Into::into))
        })
    }

    /// Create from a JSON object of field values.
    pub async fn create(&self, kind: RecordKind, fields: Value) -> StoreResult<VaultRecord> {
        with_repo!(self, kind, |repo| create_in(repo, fields).await)
    }

    pub async fn update(
        &self,
        kind: RecordKind,
        id: &str,
        patch: Map<String, Value>,
    ) -> StoreResult<VaultRecord> {
        with_repo!(self, kind, |repo| Ok(repo.update(id, patch).await?.into()))
    }

    pub async fn remove(&self, kind: RecordKind, id: &str) -> StoreResult<()> {
        with_repo!(self, kind, |repo| repo.remove(id).await)
    }

    /// Move every secure field from `previous` (or another retired key) to
    /// the current session key.
    pub async fn reencrypt_all(&self, previous: &SessionKey) -> StoreResult<usize> {
        let mut total = 0;
        for kind in RecordKind::ALL {
            total += with_repo!(self, kind, |repo| repo.reencrypt(previous).await?);
        }
        Ok(total)
    }

    pub fn clear_caches(&self) {
        for kind in RecordKind::ALL {
            with_repo!(self, kind, |repo| repo.clear_cache());
        }
    }
}

fn wrap<T>(items: Vec<T>) -> Vec<VaultRecord>
where
    VaultRecord: From<T>,
{
    items.into_iter().map(VaultRecord::from).collect()
}

async fn create_in<T>(repo: &Repository<T>, fields: Value) -> StoreResult<VaultRecord>
where
    T: VaultEntity,
    VaultRecord: From<T>,
{
    let item: T = decode(fields)?;
    Ok(repo.create(&item).await?.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rp_id_is_the_host() {
        assert_eq!(rp_id("http://localhost:3000"), "localhost");
        assert_eq!(rp_id("https://Vault.Example.com/api"), "vault.example.com");
        assert_eq!(rp_id("https://user@host.example:8443/x?y"), "host.example");
        assert_eq!(rp_id("http://[::1]:3000"), "::1");
        assert_eq!(rp_id(""), "localhost");
        assert_eq!(rp_id("not a url"), "localhost");
        assert_eq!(rp_id("file:///tmp/vault"), "localhost");
    }

    #[test]
    fn vault_opens_with_placeholder_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().join("nested");

        let vault = Vault::open(config).unwrap();
        assert!(vault.backend.is_placeholder());
        assert!(!vault.session.is_authenticated());
        assert!(!vault.biometrics.is_supported());
        assert!(dir.path().join("nested").join("local.db").exists());
    }

    #[tokio::test]
    async fn finish_rekey_keeps_retired_key_when_the_api_is_down() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.api.url = format!("http://{addr}");
        let vault = Vault::open(config).unwrap();

        // Nothing retired: nothing to do, no request made.
        vault.keys.set(SessionKey::from_bytes([2u8; 32]));
        assert_eq!(vault.finish_rekey().await.unwrap(), 0);

        vault.keys.retire(SessionKey::from_bytes([1u8; 32]));
        assert!(vault.finish_rekey().await.is_err());
        assert!(vault.keys.rotation_pending());
    }
}
