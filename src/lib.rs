pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod key;
pub mod ledger;
pub mod record;
pub mod service;
pub mod utils;

pub use config::ContractConfig;
pub use context::{ClientIdentity, StaticIdentity, TransactionContext};
pub use error::{ContractError, Operation};
pub use ledger::{MemoryStore, SledLedger, StateQuery, StateStore};
pub use record::{ServiceRecord, ServiceStatus};
pub use service::ServiceContract;
