//! Service request records, their lifecycle status and the JSON codec
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Review state of a service request.
///
/// Stored as a bare integer. Values outside the seven known states are kept
/// verbatim in `Unknown` so that they survive a decode/encode round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ServiceStatus {
    #[default]
    Open,
    UnderConsideration,
    DataRefinement,
    Satisfied,
    Withdrawn,
    Refused,
    Deleted,
    Unknown(i64),
}

impl ServiceStatus {
    pub fn code(self) -> i64 {
        match self {
            ServiceStatus::Open => 1,
            ServiceStatus::UnderConsideration => 2,
            ServiceStatus::DataRefinement => 3,
            ServiceStatus::Satisfied => 4,
            ServiceStatus::Withdrawn => 5,
            ServiceStatus::Refused => 6,
            ServiceStatus::Deleted => 7,
            ServiceStatus::Unknown(code) => code,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, ServiceStatus::Unknown(_))
    }
}

impl From<i64> for ServiceStatus {
    fn from(code: i64) -> Self {
        match code {
            1 => ServiceStatus::Open,
            2 => ServiceStatus::UnderConsideration,
            3 => ServiceStatus::DataRefinement,
            4 => ServiceStatus::Satisfied,
            5 => ServiceStatus::Withdrawn,
            6 => ServiceStatus::Refused,
            7 => ServiceStatus::Deleted,
            other => ServiceStatus::Unknown(other),
        }
    }
}

impl From<ServiceStatus> for i64 {
    fn from(status: ServiceStatus) -> Self {
        status.code()
    }
}

// accepts any integer, the seven states are not enforced here
impl FromStr for ServiceStatus {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(ServiceStatus::from)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Open => write!(f, "Open(1)"),
            ServiceStatus::UnderConsideration => write!(f, "UnderConsideration(2)"),
            ServiceStatus::DataRefinement => write!(f, "DataRefinement(3)"),
            ServiceStatus::Satisfied => write!(f, "Satisfied(4)"),
            ServiceStatus::Withdrawn => write!(f, "Withdrawn(5)"),
            ServiceStatus::Refused => write!(f, "Refused(6)"),
            ServiceStatus::Deleted => write!(f, "Deleted(7)"),
            ServiceStatus::Unknown(code) => write!(f, "Unknown({code})"),
        }
    }
}

/// A service request submitted by a client.
///
/// Field names on the wire follow the records already on the ledger
/// (`type_services`, `ClientID`, `MspID`). Any other name is ignored on decode,
/// and optional strings may be absent or `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "type_services")]
    pub type_of_service: String,
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "String::is_empty")]
    pub comment: String,
    pub email: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(rename = "ClientID", default, deserialize_with = "null_as_empty")]
    pub owner_client_id: String, // set once on create
    #[serde(rename = "MspID", default, deserialize_with = "null_as_empty")]
    pub owner_org_id: String, // set once on create
}

// `null` decodes like an absent field
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ServiceRecord {
    /// Construct a record with the identifying and required contact fields
    pub fn new(type_of_service: &str, phone: &str, email: &str, address: &str) -> Self {
        Self {
            type_of_service: type_of_service.to_string(),
            phone: phone.to_string(),
            email: email.to_string(),
            address: address.to_string(),
            ..Self::default()
        }
    }
    pub fn set_comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_string();
        self
    }
    pub fn set_first_name(mut self, first_name: &str) -> Self {
        self.first_name = first_name.to_string();
        self
    }
    pub fn set_last_name(mut self, last_name: &str) -> Self {
        self.last_name = last_name.to_string();
        self
    }
    pub fn set_status(mut self, status: ServiceStatus) -> Self {
        self.status = status;
        self
    }
    pub fn set_owner(mut self, client_id: &str, org_id: &str) -> Self {
        self.owner_client_id = client_id.to_string();
        self.owner_org_id = org_id.to_string();
        self
    }

    /// Decode a record from its stored or submitted JSON form. Unknown fields are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// True when the caller matches the owner by organization or by client id.
    pub fn is_owned_by(&self, client_id: &str, org_id: &str) -> bool {
        self.owner_org_id == org_id || self.owner_client_id == client_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_lifecycle() {
        for code in 1..=7_i64 {
            let status = ServiceStatus::from(code);
            assert!(status.is_known());
            assert_eq!(status.code(), code);
        }
        assert_eq!(ServiceStatus::from(42_i64), ServiceStatus::Unknown(42));
        assert!(!ServiceStatus::Unknown(0).is_known());
    }

    #[test]
    fn status_parses_any_integer() {
        assert_eq!("7".parse::<ServiceStatus>().unwrap(), ServiceStatus::Deleted);
        assert_eq!("+2".parse::<ServiceStatus>().unwrap(), ServiceStatus::UnderConsideration);
        assert_eq!("-3".parse::<ServiceStatus>().unwrap(), ServiceStatus::Unknown(-3));
        assert!("seven".parse::<ServiceStatus>().is_err());
        assert!(" 7".parse::<ServiceStatus>().is_err());
    }

    #[test]
    fn optional_fields_are_omitted_when_empty() {
        let record = ServiceRecord::new("billing", "555", "a@x.com", "1 Rd");
        let json: serde_json::Value = serde_json::from_slice(&record.encode().unwrap()).unwrap();

        assert!(json.get("comment").is_none());
        assert!(json.get("last_name").is_none());
        assert_eq!(json["type_services"], "billing");
        assert_eq!(json["status"], 1);
        assert_eq!(json["ClientID"], "");
    }

    #[test]
    fn decode_ignores_unknown_fields() {
        let payload = br#"{"type_services":"billing","phone":"555","email":"a@x.com",
            "address":"1 Rd","Key":"","extra":{"nested":true},
            "type_of_service":"repair","owner_org_id":"Org2MSP"}"#;
        let record = ServiceRecord::decode(payload).unwrap();

        assert_eq!(record.type_of_service, "billing");
        assert!(record.owner_org_id.is_empty());
        assert_eq!(record.status, ServiceStatus::Open);
        assert!(record.first_name.is_empty());
    }

    #[test]
    fn decode_treats_null_optionals_as_absent() {
        let payload = br#"{"type_services":"b","phone":"1","email":"e","address":"a",
            "comment":null,"first_name":null,"last_name":null,"ClientID":null,"MspID":null}"#;
        let record = ServiceRecord::decode(payload).unwrap();

        assert_eq!(record, ServiceRecord::new("b", "1", "e", "a"));

        let json: serde_json::Value = serde_json::from_slice(&record.encode().unwrap()).unwrap();
        assert!(json.get("comment").is_none());
        assert!(json.get("last_name").is_none());
    }

    #[test]
    fn decode_rejects_missing_required_fields() {
        assert!(ServiceRecord::decode(br#"{"phone":"555"}"#).is_err());
        assert!(ServiceRecord::decode(b"not json").is_err());
        assert!(ServiceRecord::decode(br#"{"type_services":"b","phone":"5","email":"e","address":"a","status":"x"}"#).is_err());
    }

    #[test]
    fn unknown_status_survives_round_trip() {
        let record = ServiceRecord::new("billing", "555", "a@x.com", "1 Rd")
            .set_status(ServiceStatus::Unknown(99));
        let decoded = ServiceRecord::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded.status, ServiceStatus::Unknown(99));
    }
}
