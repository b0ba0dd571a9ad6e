//! Per-transaction context handed to every contract operation
use super::error::IdentityError;
use super::ledger::StateStore;

/// Authenticated caller of the current transaction, supplied by the host.
pub trait ClientIdentity {
    /// Unique identifier of the submitting client.
    fn client_id(&self) -> Result<String, IdentityError>;
    /// Organization (membership service provider) the client belongs to.
    fn msp_id(&self) -> Result<String, IdentityError>;

    /// Resolves both halves of the identity, client id first.
    fn caller(&self) -> Result<Caller, IdentityError> {
        Ok(Caller {
            client_id: self.client_id()?,
            msp_id: self.msp_id()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub client_id: String,
    pub msp_id: String,
}

/// Identity with fixed values, as a host that already authenticated the caller would provide.
/// Either half may be absent to model a context without that attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticIdentity {
    client_id: Option<String>,
    msp_id: Option<String>,
}

impl StaticIdentity {
    pub fn new(client_id: &str, msp_id: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            msp_id: Some(msp_id.to_string()),
        }
    }
    pub fn anonymous() -> Self {
        Self::default()
    }
    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }
    pub fn with_msp_id(mut self, msp_id: &str) -> Self {
        self.msp_id = Some(msp_id.to_string());
        self
    }
}

impl ClientIdentity for StaticIdentity {
    fn client_id(&self) -> Result<String, IdentityError> {
        self.client_id.clone().ok_or(IdentityError::MissingClientId)
    }
    fn msp_id(&self) -> Result<String, IdentityError> {
        self.msp_id.clone().ok_or(IdentityError::MissingMspId)
    }
}

/// Ledger view and caller identity of one transaction. Nothing is cached here,
/// a new context is built for each invocation.
pub struct TransactionContext<'a> {
    stub: &'a dyn StateStore,
    identity: &'a dyn ClientIdentity,
}

impl<'a> TransactionContext<'a> {
    pub fn new(stub: &'a dyn StateStore, identity: &'a dyn ClientIdentity) -> Self {
        Self { stub, identity }
    }
    pub fn stub(&self) -> &dyn StateStore {
        self.stub
    }
    pub fn identity(&self) -> &dyn ClientIdentity {
        self.identity
    }
}
