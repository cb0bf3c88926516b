//! Wire objects exchanged with the relay.

pub mod sale;
pub mod ws;

pub use sale::{Amount, AmountError, SaleEvent};

use serde::{Deserialize, Serialize};

/// Path of the ingress endpoint producers POST sales to.
pub const INGRESS_PATH: &str = "/add-upi-sale";

/// Acknowledgement returned to the producer by the ingress endpoint.
///
/// Encoded as `{"ok":1}` on success and `{"ok":0,"error":"…"}` on rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(with = "flag")]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    /// A successful acknowledgement.
    pub fn accepted() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    /// A failed acknowledgement carrying the rejection reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// `ok` is a `1`/`0` flag on the wire; booleans are accepted when reading.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(u64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(b) => b,
            Flag::Int(n) => n != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_ack_is_numeric_flag() {
        assert_eq!(serde_json::to_string(&Ack::accepted()).unwrap(), r#"{"ok":1}"#);
    }

    #[test]
    fn rejected_ack_carries_reason() {
        let json = serde_json::to_string(&Ack::rejected("missing field `date`")).unwrap();
        assert_eq!(json, r#"{"ok":0,"error":"missing field `date`"}"#);
    }

    #[test]
    fn ack_reads_boolean_flag() {
        let ack: Ack = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert_eq!(ack, Ack::accepted());
    }
}
