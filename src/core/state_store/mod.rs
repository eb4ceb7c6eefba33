use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::external::Storage;
use crate::models::{
    ProviderConfig, StateData, Transaction, TransactionId, TransactionStatus, PROVIDER_TYPE_RPC,
};
use crate::utils::*;

pub const STORAGE_STATE: &str = "__core__state";

const STATE_VERSION: u64 = 1;

/// Persisted wallet client state: provider config, wallet metadata and
/// submitted transactions.
///
/// All data lives in one storage slot. Each mutation reads the stored blob,
/// transforms it and writes it back while holding the write lock, so
/// concurrent mutations of the same instance never interleave. The in-memory
/// snapshot is replaced only after a successful write.
///
/// Only one `StateStore` is expected to own the slot. Sharing it between
/// processes requires compare-and-swap support from the storage.
pub struct StateStore {
    key: String,
    storage: Arc<dyn Storage>,
    state: RwLock<StateData>,
    handlers: Mutex<Vec<Arc<dyn StateStoreHandler>>>,
}

impl StateStore {
    /// Loads full state from the default storage key. Fails on invalid data
    pub async fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        Self::load_with_key(STORAGE_STATE, storage).await
    }

    /// Loads full state from the specified storage key. Fails on invalid data
    pub async fn load_with_key(key: &str, storage: Arc<dyn Storage>) -> Result<Self> {
        let data = read_state(key, storage.as_ref()).await?;
        Ok(Self::with_data(key, storage, data))
    }

    /// Loads full state. Returns empty state on invalid data
    pub async fn load_unchecked(storage: Arc<dyn Storage>) -> Self {
        match read_state(STORAGE_STATE, storage.as_ref()).await {
            Ok(data) => Self::with_data(STORAGE_STATE, storage, data),
            Err(e) => {
                log::warn!("Failed to load stored state, using empty state: {e:?}");
                Self::with_data(STORAGE_STATE, storage, Default::default())
            }
        }
    }

    fn with_data(key: &str, storage: Arc<dyn Storage>, data: StateData) -> Self {
        Self {
            key: key.to_owned(),
            storage,
            state: RwLock::new(data),
            handlers: Default::default(),
        }
    }

    /// Registers a handler which is notified after each successful write
    pub fn subscribe(&self, handler: Arc<dyn StateStoreHandler>) {
        self.handlers.lock().push(handler);
    }

    /// Returns handler to the inner data
    pub async fn stored_data(&'_ self) -> StoredStateData<'_> {
        StoredStateData(self.state.read().await)
    }

    /// Returns a snapshot of the full state. Changes to it are not persisted
    pub async fn get_data(&self) -> StateData {
        self.state.read().await.clone()
    }

    /// Replaces the full state
    pub async fn set_data(&self, data: StateData) -> Result<()> {
        self.update(move |state| {
            *state = data;
            Ok(Update::Config)
        })
        .await
    }

    /// Re-reads the state from the storage
    pub async fn reload(&self) -> Result<()> {
        let mut state = self.state.write().await;
        *state = read_state(&self.key, self.storage.as_ref()).await?;
        Ok(())
    }

    /// Removes stored state and resets it to the empty one
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.storage
            .remove(&self.key)
            .await
            .map_err(|e| StateStoreError::Persistence(e.into()))?;

        *state = Default::default();
        self.notify(&state, Update::Config);
        Ok(())
    }

    pub async fn get_config(&self) -> Map<String, Value> {
        self.state.read().await.config.clone()
    }

    /// Deep-merges the specified object into the config.
    ///
    /// Nested objects are merged, arrays and other values are replaced.
    pub async fn set_config(&self, config: Value) -> Result<()> {
        let config = into_object(config, "config")?;
        self.update(move |state| {
            merge_json(&mut state.config, config);
            Ok(Update::Config)
        })
        .await
    }

    pub async fn get_wallet(&self) -> Map<String, Value> {
        self.state.read().await.wallet.clone()
    }

    /// Replaces wallet metadata. Config and transactions are left intact
    pub async fn set_wallet(&self, wallet: Value) -> Result<()> {
        let wallet = into_object(wallet, "wallet")?;
        self.update(move |state| {
            state.wallet = wallet;
            Ok(Update::Other)
        })
        .await
    }

    pub async fn get_provider(&self) -> Option<ProviderConfig> {
        self.state.read().await.provider()
    }

    pub async fn set_rpc_target(&self, rpc_target: &str) -> Result<()> {
        self.set_config(json!({
            "provider": {
                "type": PROVIDER_TYPE_RPC,
                "rpcTarget": rpc_target,
            }
        }))
        .await
    }

    pub async fn get_current_rpc_address(&self) -> Option<String> {
        self.state.read().await.rpc_target().map(str::to_owned)
    }

    pub async fn get_tx_list(&self) -> Vec<Transaction> {
        self.state.read().await.transactions.clone()
    }

    /// Replaces the whole transactions list
    pub async fn save_tx_list(&self, transactions: Vec<Transaction>) -> Result<()> {
        self.update(move |state| {
            state.transactions = transactions;
            Ok(Update::Other)
        })
        .await
    }

    /// Appends transaction to the end of the list. Ids are not checked for
    /// uniqueness
    pub async fn add_tx(&self, transaction: Transaction) -> Result<()> {
        self.update(move |state| {
            state.transactions.push(transaction);
            Ok(Update::Other)
        })
        .await
    }

    /// Returns the first transaction with the specified id
    pub async fn get_tx(&self, id: &TransactionId) -> Option<Transaction> {
        self.state
            .read()
            .await
            .transactions
            .iter()
            .find(|tx| tx.has_id(id))
            .cloned()
    }

    pub async fn confirm_tx(&self, id: &TransactionId) -> Result<()> {
        self.set_tx_status(id, TransactionStatus::Confirmed).await
    }

    pub async fn reject_tx(&self, id: &TransactionId) -> Result<()> {
        self.set_tx_status(id, TransactionStatus::Rejected).await
    }

    /// Returns unconfirmed transactions by their ids.
    ///
    /// Transactions without id are skipped. For duplicate ids the first
    /// transaction in the list is used.
    pub async fn unconfirmed_txs(&self) -> BTreeMap<TransactionId, Transaction> {
        let state = self.state.read().await;

        let mut result = BTreeMap::new();
        for tx in state.transactions.iter().filter(|tx| tx.is_unconfirmed()) {
            if let Some(id) = &tx.id {
                result.entry(id.clone()).or_insert_with(|| tx.clone());
            }
        }
        result
    }

    /// Updates status of all transactions with the specified id.
    ///
    /// Confirmed and rejected transactions are left as is.
    async fn set_tx_status(&self, id: &TransactionId, status: TransactionStatus) -> Result<()> {
        self.update(|state| {
            let mut changed = false;
            for tx in state.transactions.iter_mut() {
                if tx.has_id(id) && !tx.is_finished() {
                    tx.status = Some(status.clone());
                    changed = true;
                }
            }

            if changed {
                log::debug!("Transaction {id} status changed to {status}");
                Ok(Update::Other)
            } else {
                Ok(Update::None)
            }
        })
        .await
    }

    async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut StateData) -> Result<Update>,
    {
        let mut state = self.state.write().await;

        let mut data = read_state(&self.key, self.storage.as_ref()).await?;
        let update = f(&mut data)?;
        if update != Update::None {
            self.save(&data).await?;
        }

        *state = data;
        if update != Update::None {
            self.notify(&state, update);
        }
        Ok(())
    }

    async fn save(&self, data: &StateData) -> Result<()> {
        #[derive(Serialize)]
        struct StoredMeta {
            version: u64,
        }

        #[derive(Serialize)]
        struct StoredState<'a> {
            meta: StoredMeta,
            data: &'a StateData,
        }

        let data = serde_json::to_string(&StoredState {
            meta: StoredMeta {
                version: STATE_VERSION,
            },
            data,
        })
        .trust_me();

        if let Err(e) = self.storage.set(&self.key, &data).await {
            log::warn!("Failed to save state: {e:?}");
            return Err(StateStoreError::Persistence(e.into()).into());
        }

        log::debug!("Saved state ({} bytes)", data.len());
        Ok(())
    }

    fn notify(&self, data: &StateData, update: Update) {
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            if update == Update::Config {
                handler.on_config_changed(&data.config);
            }
            handler.on_state_changed(data);
        }
    }
}

pub struct StoredStateData<'a>(RwLockReadGuard<'a, StateData>);

impl<'a> StoredStateData<'a> {
    pub fn config(&self) -> &Map<String, Value> {
        &self.0.config
    }

    pub fn wallet(&self) -> &Map<String, Value> {
        &self.0.wallet
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.0.transactions
    }
}

pub trait StateStoreHandler: Send + Sync {
    /// Called after the config was written
    fn on_config_changed(&self, config: &Map<String, Value>) {
        let _ = config;
    }

    /// Called after any successful write
    fn on_state_changed(&self, data: &StateData) {
        let _ = data;
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StateStoreError {
    #[error("Failed to access stored state")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid {0}: expected object")]
    Validation(&'static str),
}

#[derive(thiserror::Error, Debug)]
enum StoredStateError {
    #[error("Unsupported state version: {0}")]
    UnsupportedVersion(u64),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Update {
    None,
    Config,
    Other,
}

fn into_object(value: Value, name: &'static str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StateStoreError::Validation(name).into()),
    }
}

async fn read_state(key: &str, storage: &dyn Storage) -> Result<StateData> {
    let data = match storage.get(key).await {
        Ok(Some(data)) => data,
        Ok(None) => return Ok(Default::default()),
        Err(e) => return Err(StateStoreError::Persistence(e.into()).into()),
    };

    parse_state(&data).map_err(|e| StateStoreError::Persistence(e.into()).into())
}

/// Parses stored state, upgrading legacy unversioned layout
fn parse_state(data: &str) -> Result<StateData> {
    let mut value = serde_json::from_str::<Value>(data)?;

    let version = value
        .get("meta")
        .and_then(|meta| meta.get("version"))
        .and_then(Value::as_u64)
        .unwrap_or_default();

    match version {
        0 => {
            log::debug!("Migrating unversioned state");
            Ok(serde_json::from_value(value)?)
        }
        STATE_VERSION => {
            let data = value
                .get_mut("data")
                .map(Value::take)
                .unwrap_or_else(|| Value::Object(Default::default()));
            Ok(serde_json::from_value(data)?)
        }
        version => Err(StoredStateError::UnsupportedVersion(version).into()),
    }
}
