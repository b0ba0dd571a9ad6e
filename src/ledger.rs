//! Ledger state stores: the traits operations run against, plus in-memory and sled backends
use super::error::{ContractError, KeyError, StoreError};
use super::history::{HistoryEntry, TimeStamp};
use super::key;
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree, UnabortableTransactionError,
};
use sled::{Transactional, Tree};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Transactional get/put view of the ledger.
pub trait StateStore {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put_state(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn create_composite_key(&self, namespace: &str, attributes: &[&str]) -> Result<String, KeyError> {
        key::create_composite_key(namespace, attributes)
    }
}

pub type StateIter<'a> = Box<dyn Iterator<Item = Result<(String, Vec<u8>), StoreError>> + 'a>;

/// Range reads over committed state.
pub trait StateQuery {
    /// Every entry whose key starts with `prefix`, in key order.
    fn state_by_prefix(&self, prefix: &str) -> Result<StateIter<'_>, StoreError>;

    /// Entries under the partial composite key of `namespace` and `attributes`.
    fn state_by_partial_composite_key(
        &self,
        namespace: &str,
        attributes: &[&str],
    ) -> Result<StateIter<'_>, KeyError> {
        let prefix = key::create_composite_key(namespace, attributes)?;
        Ok(self
            .state_by_prefix(&prefix)
            .unwrap_or_else(|err| Box::new(std::iter::once(Err::<(String, Vec<u8>), _>(err)))))
    }
}

/// Per-key write history.
pub trait HistoryQuery {
    /// All values committed to `key`, oldest first.
    fn history_for_key(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}

/// In-memory ledger. Writes are visible immediately, there is no transaction isolation.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> Result<usize, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.len())
    }
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl StateStore for MemoryStore {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }
    fn put_state(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

impl StateQuery for MemoryStore {
    fn state_by_prefix(&self, prefix: &str) -> Result<StateIter<'_>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;

        // snapshot, so the lock is not held across iteration
        let matched: Vec<_> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();

        Ok(Box::new(matched.into_iter()))
    }
}

// history keys are `<state key>0xFF<nanos be><tx id>`; 0xFF never occurs in a utf-8 key
const HISTORY_MARKER: u8 = 0xFF;

fn history_prefix(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key.as_bytes());
    prefix.push(HISTORY_MARKER);
    prefix
}

/// Ledger persisted in sled. Current values live in the `state` tree and every
/// write is appended to the `history` tree within the same transaction.
#[derive(Clone)]
pub struct SledLedger {
    instance: Arc<sled::Db>,
    state: Tree,
    history: Tree,
}

impl SledLedger {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, StoreError> {
        let state = instance.open_tree("state")?;
        let history = instance.open_tree("history")?;

        Ok(Self {
            instance,
            state,
            history,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::new(Arc::new(sled::open(path)?))
    }

    /// Run `f` as one transaction. Sled re-runs the closure when it detects a
    /// conflicting concurrent transaction; any other error aborts without writing.
    pub fn submit<T, F>(&self, f: F) -> Result<T, ContractError>
    where
        F: Fn(&dyn StateStore) -> Result<T, ContractError>,
    {
        let result = (&self.state, &self.history).transaction(|(state, history)| {
            let stub = SledTxStub::begin(state, history);

            f(&stub).map_err(|err| {
                if err.is_conflict() {
                    ConflictableTransactionError::Conflict
                } else {
                    ConflictableTransactionError::Abort(err)
                }
            })
        });

        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(ContractError::Commit(err.into())),
        }
    }

    pub fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.instance.flush()?)
    }
}

impl StateStore for SledLedger {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    // a single write in its own transaction
    fn put_state(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let result = (&self.state, &self.history).transaction(|(state, history)| {
            SledTxStub::begin(state, history)
                .put_state(key, value)
                .map_err(|err| match err {
                    StoreError::Conflict => ConflictableTransactionError::Conflict,
                    other => ConflictableTransactionError::Abort(other),
                })
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }
}

impl StateQuery for SledLedger {
    fn state_by_prefix(&self, prefix: &str) -> Result<StateIter<'_>, StoreError> {
        let iter = self.state.scan_prefix(prefix.as_bytes()).map(|item| {
            let (k, v) = item?;
            let k = String::from_utf8(k.to_vec()).map_err(|_| StoreError::InvalidKey)?;
            Ok((k, v.to_vec()))
        });

        Ok(Box::new(iter))
    }
}

impl HistoryQuery for SledLedger {
    fn history_for_key(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        self.history
            .scan_prefix(history_prefix(key))
            .values()
            .map(|value| Ok(minicbor::decode::<HistoryEntry>(&value?)?))
            .collect()
    }
}

struct SledTxStub<'t> {
    state: &'t TransactionalTree,
    history: &'t TransactionalTree,
    tx_id: String,
    timestamp: TimeStamp<chrono::Utc>,
}

impl<'t> SledTxStub<'t> {
    fn begin(state: &'t TransactionalTree, history: &'t TransactionalTree) -> Self {
        Self {
            state,
            history,
            tx_id: uuid7::uuid7().to_string(),
            timestamp: TimeStamp::new(),
        }
    }
}

impl From<UnabortableTransactionError> for StoreError {
    fn from(err: UnabortableTransactionError) -> Self {
        match err {
            UnabortableTransactionError::Conflict => StoreError::Conflict,
            UnabortableTransactionError::Storage(err) => StoreError::Backend(err),
        }
    }
}

impl StateStore for SledTxStub<'_> {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn put_state(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let entry = HistoryEntry::new(self.tx_id.clone(), self.timestamp.clone(), value);
        let encoded = entry.build().map_err(|_| StoreError::Encode)?;

        let mut history_key = history_prefix(key);
        history_key.extend_from_slice(&self.timestamp.nanos().to_be_bytes());
        history_key.extend_from_slice(self.tx_id.as_bytes());

        self.state.insert(key.as_bytes(), value)?;
        self.history.insert(history_key, encoded)?;
        Ok(())
    }
}
