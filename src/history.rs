//! Write history kept by the ledger for every key
use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Nanoseconds since the epoch, clamped at zero. Used to order history keys.
    pub fn nanos(&self) -> u64 {
        self.0
            .timestamp_nanos_opt()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or_default()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// One committed write to a ledger key.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct HistoryEntry {
    #[n(0)]
    pub tx_id: String, // uuid7 of the writing transaction
    #[n(1)]
    pub timestamp: TimeStamp<Utc>,
    #[n(2)]
    pub value_hash: String, // sha256 of `value`, hex
    #[cbor(n(3), with = "minicbor::bytes")]
    pub value: Vec<u8>,
}

impl HistoryEntry {
    pub fn new(tx_id: String, timestamp: TimeStamp<Utc>, value: &[u8]) -> Self {
        Self {
            tx_id,
            timestamp,
            value_hash: sha256::digest(value),
            value: value.to_vec(),
        }
    }

    /// True when the stored digest still matches the value bytes.
    pub fn verify(&self) -> bool {
        sha256::digest(self.value.as_slice()) == self.value_hash
    }

    pub fn build(&self) -> Result<Vec<u8>, minicbor::encode::Error<std::convert::Infallible>> {
        minicbor::to_vec(self)
    }
}
