//! Contract configuration

/// Administrative organization of the reference network.
pub const DEFAULT_ADMIN_MSP: &str = "Org1MSP";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractConfig {
    /// The only organization allowed to change status or delete any record.
    pub admin_msp_id: String,
}

impl ContractConfig {
    pub fn new(admin_msp_id: &str) -> Self {
        Self {
            admin_msp_id: admin_msp_id.to_string(),
        }
    }
    pub fn is_admin(&self, msp_id: &str) -> bool {
        self.admin_msp_id == msp_id
    }
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_MSP)
    }
}
