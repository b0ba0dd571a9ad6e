//! Service layer API for the service request lifecycle
use super::config::ContractConfig;
use super::context::TransactionContext;
use super::error::{ContractError, Operation, StoreError};
use super::history::HistoryEntry;
use super::key::{self, SERVICE_NAMESPACE, display_key};
use super::ledger::{HistoryQuery, StateQuery};
use super::record::{ServiceRecord, ServiceStatus};

/// Lifecycle engine for service requests. Holds configuration only, every
/// operation re-reads the ledger through the context it is given.
#[derive(Debug, Clone, Default)]
pub struct ServiceContract {
    config: ContractConfig,
}

impl ServiceContract {
    pub fn new(config: ContractConfig) -> Self {
        Self { config }
    }

    /// Raw stored encoding of a request, `None` when nothing was ever created at that key.
    pub fn read(
        &self,
        ctx: &TransactionContext<'_>,
        type_of_service: &str,
        phone: &str,
    ) -> Result<Option<Vec<u8>>, ContractError> {
        let op = Operation::Read;
        let key = service_key(ctx, op, type_of_service, phone)?;

        tracing::debug!(%op, key = %display_key(&key), "reading service request");
        get_raw(ctx, op, &key)
    }

    /// Submit a new request. Status and ownership are assigned here, whatever the payload says.
    pub fn create(
        &self,
        ctx: &TransactionContext<'_>,
        payload: &[u8],
    ) -> Result<ServiceRecord, ContractError> {
        let op = Operation::Create;
        let record = ServiceRecord::decode(payload)
            .map_err(|source| ContractError::Decode { op, key: None, source })?;

        let key = service_key(ctx, op, &record.type_of_service, &record.phone)?;

        // any stored value blocks creation, including a deleted request
        if get_raw(ctx, op, &key)?.is_some() {
            tracing::warn!(%op, key = %display_key(&key), "service request already exists");
            return Err(ContractError::Conflict { op, key });
        }

        let caller = ctx
            .identity()
            .caller()
            .map_err(|source| ContractError::Identity { op, source })?;

        let record = record
            .set_status(ServiceStatus::Open)
            .set_owner(&caller.client_id, &caller.msp_id);

        put_record(ctx, op, &key, &record)?;

        tracing::info!(
            %op,
            key = %display_key(&key),
            owner = %caller.client_id,
            msp_id = %caller.msp_id,
            "service request created"
        );
        Ok(record)
    }

    /// Overwrite the status of a request. Administrative organization only.
    ///
    /// Any integer is accepted, including codes outside the known lifecycle.
    pub fn set_status(
        &self,
        ctx: &TransactionContext<'_>,
        type_of_service: &str,
        phone: &str,
        status: &str,
    ) -> Result<ServiceRecord, ContractError> {
        let op = Operation::SetStatus;
        let key = service_key(ctx, op, type_of_service, phone)?;
        let stored = get_existing(ctx, op, &key)?;

        self.require_admin(ctx, op, &key)?;

        let mut record = decode_stored(op, &key, &stored)?;
        let new_status = status
            .parse::<ServiceStatus>()
            .map_err(|source| ContractError::InvalidStatus {
                op,
                key: key.clone(),
                value: status.to_string(),
                source,
            })?;

        if !new_status.is_known() {
            tracing::warn!(
                %op,
                key = %display_key(&key),
                status = %new_status,
                "storing status outside the lifecycle"
            );
        }

        let previous = record.status;
        record.status = new_status;
        put_record(ctx, op, &key, &record)?;

        tracing::info!(%op, key = %display_key(&key), from = %previous, to = %new_status, "status changed");
        Ok(record)
    }

    /// Move a request to `Withdrawn`.
    ///
    /// The caller must match the owner by organization or by client id, and the
    /// request must currently be `Deleted`. Hosts that receive a status argument
    /// with this call discard it.
    pub fn withdraw(
        &self,
        ctx: &TransactionContext<'_>,
        type_of_service: &str,
        phone: &str,
    ) -> Result<ServiceRecord, ContractError> {
        let op = Operation::Withdraw;
        let key = service_key(ctx, op, type_of_service, phone)?;
        let stored = get_existing(ctx, op, &key)?;

        let caller = ctx
            .identity()
            .caller()
            .map_err(|source| ContractError::Identity { op, source })?;

        let mut record = decode_stored(op, &key, &stored)?;

        if !record.is_owned_by(&caller.client_id, &caller.msp_id) {
            tracing::warn!(%op, key = %display_key(&key), msp_id = %caller.msp_id, "caller does not own request");
            return Err(ContractError::Permission {
                op,
                key,
                msp_id: caller.msp_id,
            });
        }
        // TODO: confirm with product owners whether withdrawal should instead be refused once deleted
        if record.status != ServiceStatus::Deleted {
            tracing::warn!(%op, key = %display_key(&key), status = %record.status, "withdraw precondition failed");
            return Err(ContractError::State {
                op,
                key,
                status: record.status,
                expected: ServiceStatus::Deleted,
            });
        }

        record.status = ServiceStatus::Withdrawn;
        put_record(ctx, op, &key, &record)?;

        tracing::info!(%op, key = %display_key(&key), "service request withdrawn");
        Ok(record)
    }

    /// Soft-delete a request. Administrative organization only, from any status.
    /// Hosts that receive a status argument with this call discard it.
    pub fn delete(
        &self,
        ctx: &TransactionContext<'_>,
        type_of_service: &str,
        phone: &str,
    ) -> Result<ServiceRecord, ContractError> {
        let op = Operation::Delete;
        let key = service_key(ctx, op, type_of_service, phone)?;
        let stored = get_existing(ctx, op, &key)?;

        self.require_admin(ctx, op, &key)?;

        let mut record = decode_stored(op, &key, &stored)?;
        let previous = record.status;
        record.status = ServiceStatus::Deleted;
        put_record(ctx, op, &key, &record)?;

        tracing::info!(%op, key = %display_key(&key), from = %previous, "service request deleted");
        Ok(record)
    }

    /// Organization and client id of the caller, in that order.
    pub fn whoami(&self, ctx: &TransactionContext<'_>) -> Result<(String, String), ContractError> {
        let op = Operation::Whoami;
        let identity = ctx.identity();
        let map = |source| ContractError::Identity { op, source };

        let msp_id = identity.msp_id().map_err(map)?;
        let client_id = identity.client_id().map_err(map)?;
        Ok((msp_id, client_id))
    }

    /// Every stored request in key order, optionally narrowed to one category.
    /// The first undecodable entry fails the whole listing.
    pub fn list(
        &self,
        query: &dyn StateQuery,
        type_of_service: Option<&str>,
    ) -> Result<Vec<ServiceRecord>, ContractError> {
        let op = Operation::List;
        let attributes: Vec<&str> = type_of_service.into_iter().collect();

        let entries = query
            .state_by_partial_composite_key(SERVICE_NAMESPACE, &attributes)
            .map_err(|source| ContractError::KeyConstruction { op, source })?;

        collect_records(op, entries)
    }

    /// Every value ever committed for a request, oldest first.
    pub fn history(
        &self,
        ledger: &dyn HistoryQuery,
        type_of_service: &str,
        phone: &str,
    ) -> Result<Vec<HistoryEntry>, ContractError> {
        let op = Operation::History;
        let key = key::derive_key(type_of_service, phone)
            .map_err(|source| ContractError::KeyConstruction { op, source })?;

        ledger
            .history_for_key(&key)
            .map_err(|source| ContractError::Store {
                op,
                key: Some(key),
                source,
            })
    }

    fn require_admin(
        &self,
        ctx: &TransactionContext<'_>,
        op: Operation,
        key: &str,
    ) -> Result<(), ContractError> {
        let msp_id = ctx
            .identity()
            .msp_id()
            .map_err(|source| ContractError::Identity { op, source })?;

        if !self.config.is_admin(&msp_id) {
            tracing::warn!(%op, key = %display_key(key), %msp_id, "organization is not administrative");
            return Err(ContractError::Permission {
                op,
                key: key.to_string(),
                msp_id,
            });
        }
        Ok(())
    }
}

/// Decode raw `(key, bytes)` pairs into records, stopping at the first failure.
pub fn collect_records<I>(op: Operation, entries: I) -> Result<Vec<ServiceRecord>, ContractError>
where
    I: IntoIterator<Item = Result<(String, Vec<u8>), StoreError>>,
{
    let mut records = Vec::new();
    for entry in entries {
        let (key, value) = entry.map_err(|source| ContractError::Store {
            op,
            key: None,
            source,
        })?;
        records.push(decode_stored(op, &key, &value)?);
    }
    Ok(records)
}

fn service_key(
    ctx: &TransactionContext<'_>,
    op: Operation,
    type_of_service: &str,
    phone: &str,
) -> Result<String, ContractError> {
    ctx.stub()
        .create_composite_key(SERVICE_NAMESPACE, &[type_of_service, phone])
        .map_err(|source| ContractError::KeyConstruction { op, source })
}

fn get_raw(
    ctx: &TransactionContext<'_>,
    op: Operation,
    key: &str,
) -> Result<Option<Vec<u8>>, ContractError> {
    ctx.stub()
        .get_state(key)
        .map_err(|source| ContractError::Store {
            op,
            key: Some(key.to_string()),
            source,
        })
}

fn get_existing(
    ctx: &TransactionContext<'_>,
    op: Operation,
    key: &str,
) -> Result<Vec<u8>, ContractError> {
    get_raw(ctx, op, key)?.ok_or_else(|| ContractError::NotFound {
        op,
        key: key.to_string(),
    })
}

fn decode_stored(op: Operation, key: &str, bytes: &[u8]) -> Result<ServiceRecord, ContractError> {
    ServiceRecord::decode(bytes).map_err(|source| ContractError::Decode {
        op,
        key: Some(key.to_string()),
        source,
    })
}

fn put_record(
    ctx: &TransactionContext<'_>,
    op: Operation,
    key: &str,
    record: &ServiceRecord,
) -> Result<(), ContractError> {
    let bytes = record.encode().map_err(|source| ContractError::Encode {
        op,
        key: key.to_string(),
        source,
    })?;

    ctx.stub()
        .put_state(key, &bytes)
        .map_err(|source| ContractError::Store {
            op,
            key: Some(key.to_string()),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticIdentity;
    use crate::ledger::{MemoryStore, StateStore};

    const PAYLOAD: &[u8] =
        br#"{"type_services":"billing","phone":"555","email":"a@x.com","address":"1 Rd"}"#;

    fn admin() -> StaticIdentity {
        StaticIdentity::new("admin_1", "Org1MSP")
    }
    fn client() -> StaticIdentity {
        StaticIdentity::new("client_1", "Org2MSP")
    }

    fn stored_status(contract: &ServiceContract, store: &MemoryStore) -> ServiceStatus {
        let identity = client();
        let ctx = TransactionContext::new(store, &identity);
        let bytes = contract.read(&ctx, "billing", "555").unwrap().unwrap();
        ServiceRecord::decode(&bytes).unwrap().status
    }

    #[test]
    fn create_assigns_status_and_owner() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let identity = client();
        let ctx = TransactionContext::new(&store, &identity);

        let payload = br#"{"type_services":"billing","phone":"555","email":"a@x.com",
            "address":"1 Rd","status":6,"ClientID":"forged","MspID":"Org1MSP"}"#;
        let record = contract.create(&ctx, payload).unwrap();

        assert_eq!(record.status, ServiceStatus::Open);
        assert_eq!(record.owner_client_id, "client_1");
        assert_eq!(record.owner_org_id, "Org2MSP");
        assert_eq!(stored_status(&contract, &store), ServiceStatus::Open);
    }

    #[test]
    fn create_rejects_duplicates_and_bad_payloads() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let identity = client();
        let ctx = TransactionContext::new(&store, &identity);

        contract.create(&ctx, PAYLOAD).unwrap();
        assert!(matches!(
            contract.create(&ctx, PAYLOAD),
            Err(ContractError::Conflict { .. })
        ));
        assert!(matches!(
            contract.create(&ctx, b"{"),
            Err(ContractError::Decode { key: None, .. })
        ));
    }

    #[test]
    fn create_without_identity_writes_nothing() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let identity = StaticIdentity::anonymous().with_msp_id("Org2MSP");
        let ctx = TransactionContext::new(&store, &identity);

        assert!(matches!(
            contract.create(&ctx, PAYLOAD),
            Err(ContractError::Identity { .. })
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn set_status_requires_admin_and_integer() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let (owner, admin) = (client(), admin());

        contract
            .create(&TransactionContext::new(&store, &owner), PAYLOAD)
            .unwrap();

        let ctx = TransactionContext::new(&store, &owner);
        assert!(matches!(
            contract.set_status(&ctx, "billing", "555", "2"),
            Err(ContractError::Permission { .. })
        ));

        let ctx = TransactionContext::new(&store, &admin);
        assert!(matches!(
            contract.set_status(&ctx, "billing", "555", "two"),
            Err(ContractError::InvalidStatus { .. })
        ));
        assert_eq!(stored_status(&contract, &store), ServiceStatus::Open);

        contract.set_status(&ctx, "billing", "555", "42").unwrap();
        assert_eq!(stored_status(&contract, &store), ServiceStatus::Unknown(42));
    }

    #[test]
    fn missing_record_is_not_found_before_permission() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let identity = client();
        let ctx = TransactionContext::new(&store, &identity);

        assert!(contract.read(&ctx, "billing", "555").unwrap().is_none());
        assert!(matches!(
            contract.set_status(&ctx, "billing", "555", "2"),
            Err(ContractError::NotFound { .. })
        ));
        assert!(matches!(
            contract.withdraw(&ctx, "billing", "555"),
            Err(ContractError::NotFound { .. })
        ));
        assert!(matches!(
            contract.delete(&ctx, "billing", "555"),
            Err(ContractError::NotFound { .. })
        ));
    }

    #[test]
    fn withdraw_only_after_delete_and_only_by_owner() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let (owner, admin) = (client(), admin());
        let stranger = StaticIdentity::new("client_2", "Org3MSP");

        contract
            .create(&TransactionContext::new(&store, &owner), PAYLOAD)
            .unwrap();

        let owner_ctx = TransactionContext::new(&store, &owner);
        assert!(matches!(
            contract.withdraw(&owner_ctx, "billing", "555"),
            Err(ContractError::State { status: ServiceStatus::Open, .. })
        ));

        contract
            .delete(&TransactionContext::new(&store, &admin), "billing", "555")
            .unwrap();

        assert!(matches!(
            contract.withdraw(&TransactionContext::new(&store, &stranger), "billing", "555"),
            Err(ContractError::Permission { .. })
        ));

        let record = contract.withdraw(&owner_ctx, "billing", "555").unwrap();
        assert_eq!(record.status, ServiceStatus::Withdrawn);
        assert_eq!(record.owner_client_id, "client_1");
    }

    #[test]
    fn withdraw_without_client_id_is_identity_error() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let (owner, admin) = (client(), admin());
        let nameless = StaticIdentity::anonymous().with_msp_id("Org2MSP");

        contract
            .create(&TransactionContext::new(&store, &owner), PAYLOAD)
            .unwrap();
        contract
            .delete(&TransactionContext::new(&store, &admin), "billing", "555")
            .unwrap();

        assert!(matches!(
            contract.withdraw(&TransactionContext::new(&store, &nameless), "billing", "555"),
            Err(ContractError::Identity {
                op: Operation::Withdraw,
                ..
            })
        ));
        assert_eq!(stored_status(&contract, &store), ServiceStatus::Deleted);
    }

    #[test]
    fn admin_operations_without_org_are_identity_errors() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let owner = client();
        let orgless = StaticIdentity::anonymous().with_client_id("admin_1");

        contract
            .create(&TransactionContext::new(&store, &owner), PAYLOAD)
            .unwrap();

        let ctx = TransactionContext::new(&store, &orgless);
        assert!(matches!(
            contract.set_status(&ctx, "billing", "555", "2"),
            Err(ContractError::Identity {
                op: Operation::SetStatus,
                ..
            })
        ));
        assert!(matches!(
            contract.delete(&ctx, "billing", "555"),
            Err(ContractError::Identity {
                op: Operation::Delete,
                ..
            })
        ));
        assert_eq!(stored_status(&contract, &store), ServiceStatus::Open);
    }

    #[test]
    fn same_org_different_client_may_withdraw() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let (owner, admin) = (client(), admin());
        let colleague = StaticIdentity::new("client_9", "Org2MSP");

        contract
            .create(&TransactionContext::new(&store, &owner), PAYLOAD)
            .unwrap();
        contract
            .delete(&TransactionContext::new(&store, &admin), "billing", "555")
            .unwrap();

        let record = contract
            .withdraw(&TransactionContext::new(&store, &colleague), "billing", "555")
            .unwrap();
        assert_eq!(record.status, ServiceStatus::Withdrawn);
    }

    #[test]
    fn list_stops_at_first_corrupt_entry() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let identity = client();
        let ctx = TransactionContext::new(&store, &identity);

        contract.create(&ctx, PAYLOAD).unwrap();
        assert_eq!(contract.list(&store, None).unwrap().len(), 1);

        let corrupt = key::derive_key("billing", "556").unwrap();
        store.put_state(&corrupt, b"garbage").unwrap();

        assert!(matches!(
            contract.list(&store, Some("billing")),
            Err(ContractError::Decode { key: Some(_), .. })
        ));
        assert!(contract.list(&store, Some("repair")).unwrap().is_empty());
    }

    #[test]
    fn whoami_reports_org_then_client() {
        let contract = ServiceContract::default();
        let store = MemoryStore::new();
        let identity = client();
        let ctx = TransactionContext::new(&store, &identity);

        assert_eq!(
            contract.whoami(&ctx).unwrap(),
            ("Org2MSP".to_string(), "client_1".to_string())
        );
    }
}
