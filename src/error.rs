use super::key::display_key;
use super::record::ServiceStatus;
use std::fmt;

/// Operations exposed to the host runtime. Carried by every error for context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    SetStatus,
    Withdraw,
    Delete,
    Whoami,
    List,
    History,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::SetStatus => "set_status",
            Operation::Withdraw => "withdraw",
            Operation::Delete => "delete",
            Operation::Whoami => "whoami",
            Operation::List => "list",
            Operation::History => "history",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    #[error("segment {segment:?} contains reserved character {ch:?}")]
    ReservedCharacter { segment: String, ch: char },
}

#[derive(thiserror::Error, Debug)]
pub enum IdentityError {
    #[error("client identity is unavailable")]
    MissingClientId,
    #[error("organization identity is unavailable")]
    MissingMspId,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Another transaction touched the same key; the host decides whether to retry.
    #[error("transaction conflict")]
    Conflict,
    #[error("ledger backend failure: {0}")]
    Backend(#[from] sled::Error),
    #[error("stored key is not valid utf-8")]
    InvalidKey,
    #[error("in-memory store lock poisoned")]
    Poisoned,
    #[error("failed to encode history entry")]
    Encode,
    #[error("failed to decode history entry: {0}")]
    History(#[from] minicbor::decode::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ContractError {
    #[error("{op}: failed to create composite key: {source}")]
    KeyConstruction {
        op: Operation,
        #[source]
        source: KeyError,
    },
    #[error("{op}: failed to decode service record{}: {source}", describe_key(.key))]
    Decode {
        op: Operation,
        key: Option<String>,
        #[source]
        source: serde_json::Error,
    },
    #[error("{op}: failed to encode service record at {}: {source}", display_key(.key))]
    Encode {
        op: Operation,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{op}: failed to resolve caller identity: {source}")]
    Identity {
        op: Operation,
        #[source]
        source: IdentityError,
    },
    #[error("{op}: service request already exists at {}", display_key(.key))]
    Conflict { op: Operation, key: String },
    #[error("{op}: service request does not exist at {}", display_key(.key))]
    NotFound { op: Operation, key: String },
    #[error("{op}: permission denied for organization {msp_id} at {}", display_key(.key))]
    Permission {
        op: Operation,
        key: String,
        msp_id: String,
    },
    #[error("{op}: status {value:?} at {} is not an integer: {source}", display_key(.key))]
    InvalidStatus {
        op: Operation,
        key: String,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("{op}: service request at {} is {status}, expected {expected}", display_key(.key))]
    State {
        op: Operation,
        key: String,
        status: ServiceStatus,
        expected: ServiceStatus,
    },
    #[error("{op}: ledger access failed{}: {source}", describe_key(.key))]
    Store {
        op: Operation,
        key: Option<String>,
        #[source]
        source: StoreError,
    },
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] StoreError),
}

impl ContractError {
    /// The operation the error was raised by, if it was raised inside one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            ContractError::KeyConstruction { op, .. }
            | ContractError::Decode { op, .. }
            | ContractError::Encode { op, .. }
            | ContractError::Identity { op, .. }
            | ContractError::Conflict { op, .. }
            | ContractError::NotFound { op, .. }
            | ContractError::Permission { op, .. }
            | ContractError::InvalidStatus { op, .. }
            | ContractError::State { op, .. }
            | ContractError::Store { op, .. } => Some(*op),
            ContractError::Commit(_) => None,
        }
    }

    pub(crate) fn is_conflict(&self) -> bool {
        matches!(
            self,
            ContractError::Store {
                source: StoreError::Conflict,
                ..
            } | ContractError::Commit(StoreError::Conflict)
        )
    }
}

fn describe_key(key: &Option<String>) -> String {
    match key {
        Some(key) => format!(" at {}", display_key(key)),
        None => String::new(),
    }
}
