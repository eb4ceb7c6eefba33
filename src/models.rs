use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provider type used for custom RPC endpoints
pub const PROVIDER_TYPE_RPC: &str = "rpc";

/// Full persisted application state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    /// Arbitrary configuration, deep-merged on update
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Wallet metadata, replaced as a whole on update
    #[serde(default)]
    pub wallet: Map<String, Value>,
    /// Submitted transactions in insertion order
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl StateData {
    pub fn provider(&self) -> Option<ProviderConfig> {
        let provider = self.config.get("provider")?;
        serde_json::from_value(provider.clone()).ok()
    }

    pub fn rpc_target(&self) -> Option<&str> {
        self.config.get("provider")?.get("rpcTarget")?.as_str()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(
        rename = "rpcTarget",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub rpc_target: Option<String>,
}

/// Submitted transaction record.
///
/// Only `id` and `status` are interpreted, all other fields are kept as is.
/// An `id` or `status` which is `null` or can't be interpreted stays in
/// `fields` untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub id: Option<TransactionId>,
    pub status: Option<TransactionStatus>,
    pub fields: Map<String, Value>,
}

impl Transaction {
    pub fn new<T>(id: T) -> Self
    where
        T: Into<TransactionId>,
    {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn has_id(&self, id: &TransactionId) -> bool {
        matches!(&self.id, Some(own) if own == id)
    }

    pub fn is_unconfirmed(&self) -> bool {
        matches!(self.status, Some(TransactionStatus::Unconfirmed))
    }

    pub fn is_finished(&self) -> bool {
        matches!(&self.status, Some(status) if status.is_terminal())
    }
}

impl Serialize for Transaction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        if let Some(id) = &self.id {
            map.serialize_entry("id", id)?;
        }
        if let Some(status) = &self.status {
            map.serialize_entry("status", status)?;
        }
        for (key, value) in self.fields.iter() {
            let shadowed = match key.as_str() {
                "id" => self.id.is_some(),
                "status" => self.status.is_some(),
                _ => false,
            };
            if !shadowed {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Transaction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let id = take_field(&mut fields, "id");
        let status = take_field(&mut fields, "status");
        Ok(Self { id, status, fields })
    }
}

fn take_field<T>(fields: &mut Map<String, Value>, key: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    let value = fields.get(key)?;
    if value.is_null() {
        return None;
    }

    let parsed = T::deserialize(value).ok()?;
    fields.remove(key);
    Some(parsed)
}

/// Caller-supplied transaction identifier.
///
/// Compared by exact JSON value: numbers and strings never compare equal,
/// `1` and `"1"` are different ids. Non-negative integers are always stored
/// as [`TransactionId::Number`], negative ones as [`TransactionId::Signed`].
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionId {
    Number(u64),
    Signed(i64),
    Float(FloatId),
    String(String),
}

impl From<u64> for TransactionId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<i64> for TransactionId {
    fn from(id: i64) -> Self {
        match u64::try_from(id) {
            Ok(id) => Self::Number(id),
            Err(_) => Self::Signed(id),
        }
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self::String(id)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self::String(id.to_owned())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => fmt::Display::fmt(id, f),
            Self::Signed(id) => fmt::Display::fmt(id, f),
            Self::Float(id) => fmt::Display::fmt(&id.0, f),
            Self::String(id) => f.write_str(id),
        }
    }
}

/// Fractional transaction id, compared bitwise
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FloatId(pub f64);

impl PartialEq for FloatId {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatId {}

impl std::hash::Hash for FloatId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state)
    }
}

impl PartialOrd for FloatId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Transaction status. Unknown statuses are preserved verbatim, including
/// non-string ones.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum TransactionStatus {
    Unconfirmed,
    Confirmed,
    Rejected,
    Other(String),
    Raw(Value),
}

impl TransactionStatus {
    /// Confirmed and rejected transactions never change their status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Rejected)
    }
}

impl From<String> for TransactionStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "unconfirmed" => Self::Unconfirmed,
            "confirmed" => Self::Confirmed,
            "rejected" => Self::Rejected,
            _ => Self::Other(status),
        }
    }
}

impl From<&str> for TransactionStatus {
    fn from(status: &str) -> Self {
        Self::from(status.to_owned())
    }
}

impl From<Value> for TransactionStatus {
    fn from(status: Value) -> Self {
        match status {
            Value::String(status) => Self::from(status),
            status => Self::Raw(status),
        }
    }
}

impl From<TransactionStatus> for Value {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Other(status) => Value::String(status),
            TransactionStatus::Raw(status) => status,
            status => Value::String(status.to_string()),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfirmed => f.write_str("unconfirmed"),
            Self::Confirmed => f.write_str("confirmed"),
            Self::Rejected => f.write_str("rejected"),
            Self::Other(status) => f.write_str(status),
            Self::Raw(status) => fmt::Display::fmt(status, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn transaction_keeps_unknown_fields() {
        let tx: Transaction = serde_json::from_value(json!({
            "id": 1,
            "status": "submitted",
            "txParams": { "to": "0xabc", "value": "0x10" },
            "time": 1461350000000u64,
        }))
        .unwrap();

        assert_eq!(tx.id, Some(TransactionId::Number(1)));
        assert_eq!(tx.status, Some(TransactionStatus::Other("submitted".to_owned())));
        assert_eq!(tx.fields["txParams"]["to"], json!("0xabc"));

        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["status"], json!("submitted"));
        assert_eq!(value["time"], json!(1461350000000u64));
    }

    #[test]
    fn transaction_without_id() {
        let tx: Transaction = serde_json::from_value(json!({ "foo": "bar" })).unwrap();
        assert!(tx.id.is_none());
        assert!(tx.status.is_none());
        assert_eq!(serde_json::to_value(&tx).unwrap(), json!({ "foo": "bar" }));
    }

    #[test]
    fn transaction_with_any_numeric_id() {
        let cases = [
            (json!(-1), TransactionId::Signed(-1)),
            (json!(1.5), TransactionId::Float(FloatId(1.5))),
            (
                json!(1461350000000.5),
                TransactionId::Float(FloatId(1461350000000.5)),
            ),
            (json!(42), TransactionId::Number(42)),
        ];

        for (id, expected) in cases {
            let value = json!({ "id": id, "status": "unconfirmed" });
            let tx: Transaction = serde_json::from_value(value.clone()).unwrap();
            assert_eq!(tx.id, Some(expected));
            assert!(tx.fields.is_empty());
            assert_eq!(serde_json::to_value(&tx).unwrap(), value);
        }

        assert_eq!(TransactionId::from(-1i64), TransactionId::Signed(-1));
        assert_eq!(TransactionId::from(7i64), TransactionId::Number(7));
        assert_eq!(TransactionId::Float(FloatId(1.5)).to_string(), "1.5");
    }

    #[test]
    fn transaction_with_raw_status() {
        let value = json!({ "id": 1, "status": 3 });
        let tx: Transaction = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(tx.status, Some(TransactionStatus::Raw(json!(3))));
        assert!(!tx.is_unconfirmed());
        assert!(!tx.is_finished());
        assert_eq!(serde_json::to_value(&tx).unwrap(), value);
    }

    #[test]
    fn uninterpreted_id_and_status_are_kept() {
        let value = json!({ "id": null, "status": null, "foo": 1 });
        let tx: Transaction = serde_json::from_value(value.clone()).unwrap();
        assert!(tx.id.is_none());
        assert!(tx.status.is_none());
        assert_eq!(serde_json::to_value(&tx).unwrap(), value);

        let value = json!({ "id": [1, 2], "status": "unconfirmed" });
        let tx: Transaction = serde_json::from_value(value.clone()).unwrap();
        assert!(tx.id.is_none());
        assert!(tx.is_unconfirmed());
        assert_eq!(tx.fields["id"], json!([1, 2]));
        assert_eq!(serde_json::to_value(&tx).unwrap(), value);
    }

    #[test]
    fn typed_id_shadows_field() {
        let tx = Transaction::new(1u64).with_field("id", "stale");
        assert_eq!(serde_json::to_value(&tx).unwrap(), json!({ "id": 1 }));
    }

    #[test]
    fn numeric_and_string_ids_differ() {
        let numeric: TransactionId = serde_json::from_value(json!(1)).unwrap();
        let string: TransactionId = serde_json::from_value(json!("1")).unwrap();

        assert_eq!(numeric, TransactionId::Number(1));
        assert_eq!(string, TransactionId::from("1"));
        assert_ne!(numeric, string);
        assert_eq!(numeric.to_string(), string.to_string());
    }

    #[test]
    fn missing_fields_are_defaulted() {
        let data: StateData = serde_json::from_value(json!({})).unwrap();
        assert!(data.config.is_empty());
        assert!(data.wallet.is_empty());
        assert!(data.transactions.is_empty());
        assert!(data.provider().is_none());
        assert!(data.rpc_target().is_none());
    }

    #[test]
    fn provider_view() {
        let data: StateData = serde_json::from_value(json!({
            "config": { "provider": { "type": "rpc", "rpcTarget": "http://localhost:8545" } }
        }))
        .unwrap();

        assert_eq!(
            data.provider(),
            Some(ProviderConfig {
                ty: PROVIDER_TYPE_RPC.to_owned(),
                rpc_target: Some("http://localhost:8545".to_owned()),
            })
        );
        assert_eq!(data.rpc_target(), Some("http://localhost:8545"));
    }
}
