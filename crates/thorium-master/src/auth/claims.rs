//! Token claims for Thorium credentials.
//!
//! Every token names exactly one kind of subject. The kind is carried as a
//! `kind` tag so a token minted for one use site can never be accepted at
//! another: a machine key is not a session key and vice versa.

use serde::{Deserialize, Serialize};

/// The authenticated subject of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Subject {
    /// A logged-in player account.
    Account { uid: i64 },
    /// A character selected by an account.
    Character { uid: i64, id: i64 },
    /// A registered worker machine.
    Machine {
        #[serde(rename = "machineId")]
        machine_id: i64,
    },
}

impl Subject {
    pub const fn kind(&self) -> TokenKind {
        match self {
            Self::Account { .. } => TokenKind::Account,
            Self::Character { .. } => TokenKind::Character,
            Self::Machine { .. } => TokenKind::Machine,
        }
    }
}

/// Discriminant of [`Subject`], used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Account,
    Character,
    Machine,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Account => f.write_str("account"),
            Self::Character => f.write_str("character"),
            Self::Machine => f.write_str("machine"),
        }
    }
}

/// JWT claims embedded in every Thorium token.
///
/// There is no `exp`: session lifetime is owned by the session store, so a
/// session can be revoked everywhere at once by deleting its entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(flatten)]
    pub subject: Subject,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// JWT ID, unique per token so re-issued credentials always differ.
    pub jti: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn machine_claims_use_wire_names() {
        let claims = Claims {
            subject: Subject::Machine { machine_id: 4 },
            iat: 10,
            jti: "j".into(),
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["kind"], "machine");
        assert_eq!(json["machineId"], 4);
        assert_eq!(json["iat"], 10);
    }

    #[test]
    fn textual_id_is_rejected() {
        let raw = r#"{"kind":"account","uid":"7","iat":1,"jti":"x"}"#;
        assert!(serde_json::from_str::<Claims>(raw).is_err());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let raw = r#"{"kind":"admin","uid":7,"iat":1,"jti":"x"}"#;
        assert!(serde_json::from_str::<Claims>(raw).is_err());
    }

    #[test]
    fn missing_field_is_rejected() {
        let raw = r#"{"kind":"character","uid":7,"iat":1,"jti":"x"}"#;
        assert!(serde_json::from_str::<Claims>(raw).is_err());
    }
}
