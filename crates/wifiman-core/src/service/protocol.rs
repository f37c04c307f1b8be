// ── Request/response envelope ──
//
// Wire shape of the facade. Requests are adjacently tagged:
//   {"command": "connect", "params": {"ssid": "Office", "password": "pw1"}}
// `params` may be omitted (or null) whenever every parameter has a default.
// Responses are `{ok, data}` or `{ok, error: {code, message}}`.

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{CoreError, ErrorCode};

/// A password arriving over the wire. Moves straight into a
/// `SecretString` and never prints.
pub struct Password(SecretString);

impl Password {
    pub fn into_secret(self) -> SecretString {
        self.0
    }
}

impl From<SecretString> for Password {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self(SecretString::from(s.to_owned()))
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| Self(SecretString::from(s)))
    }
}

/// Every command the facade accepts.
#[derive(Debug, Deserialize)]
#[serde(try_from = "Envelope")]
pub enum Request {
    Scan,
    ListNetworks {
        favorites_only: bool,
    },
    Connect {
        ssid: String,
        password: Option<Password>,
    },
    Disconnect {
        ssid: String,
    },
    CancelConnect,
    ToggleFavorite {
        ssid: String,
    },
    SetFavorite {
        ssid: String,
        favorite: bool,
    },
    SavePassword {
        ssid: String,
        password: Password,
    },
    GetPassword {
        ssid: String,
    },
    DeletePassword {
        ssid: String,
    },
    ListPasswords,
    AuditPasswords,
    Status,
}

/// A request as received, before `params` is normalized.
#[derive(Deserialize)]
struct Envelope {
    command: String,
    #[serde(default)]
    params: Value,
}

/// Tagged form of [`Request`]. Every variant is a struct so an empty
/// `params` object fits all of them.
#[derive(Deserialize)]
#[serde(
    tag = "command",
    content = "params",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
enum Wire {
    Scan {},
    ListNetworks {
        #[serde(default)]
        favorites_only: bool,
    },
    Connect {
        ssid: String,
        #[serde(default)]
        password: Option<Password>,
    },
    Disconnect {
        ssid: String,
    },
    CancelConnect {},
    ToggleFavorite {
        ssid: String,
    },
    SetFavorite {
        ssid: String,
        favorite: bool,
    },
    SavePassword {
        ssid: String,
        password: Password,
    },
    GetPassword {
        ssid: String,
    },
    DeletePassword {
        ssid: String,
    },
    ListPasswords {},
    AuditPasswords {},
    Status {},
}

impl TryFrom<Envelope> for Request {
    type Error = serde_json::Error;

    fn try_from(Envelope { command, params }: Envelope) -> Result<Self, Self::Error> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let wire: Wire = serde_json::from_value(json!({ "command": command, "params": params }))?;
        Ok(match wire {
            Wire::Scan {} => Self::Scan,
            Wire::ListNetworks { favorites_only } => Self::ListNetworks { favorites_only },
            Wire::Connect { ssid, password } => Self::Connect { ssid, password },
            Wire::Disconnect { ssid } => Self::Disconnect { ssid },
            Wire::CancelConnect {} => Self::CancelConnect,
            Wire::ToggleFavorite { ssid } => Self::ToggleFavorite { ssid },
            Wire::SetFavorite { ssid, favorite } => Self::SetFavorite { ssid, favorite },
            Wire::SavePassword { ssid, password } => Self::SavePassword { ssid, password },
            Wire::GetPassword { ssid } => Self::GetPassword { ssid },
            Wire::DeletePassword { ssid } => Self::DeletePassword { ssid },
            Wire::ListPasswords {} => Self::ListPasswords,
            Wire::AuditPasswords {} => Self::AuditPasswords,
            Wire::Status {} => Self::Status,
        })
    }
}

impl Request {
    /// Command name as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::ListNetworks { .. } => "listNetworks",
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::CancelConnect => "cancelConnect",
            Self::ToggleFavorite { .. } => "toggleFavorite",
            Self::SetFavorite { .. } => "setFavorite",
            Self::SavePassword { .. } => "savePassword",
            Self::GetPassword { .. } => "getPassword",
            Self::DeletePassword { .. } => "deletePassword",
            Self::ListPasswords => "listPasswords",
            Self::AuditPasswords => "auditPasswords",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Uniform result envelope. Internal error types never cross it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &CoreError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }

    /// A request line that could not be parsed at all.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::failure(&CoreError::invalid(message))
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn parses_adjacently_tagged_commands() {
        let req: Request = serde_json::from_str(
            r#"{"command":"connect","params":{"ssid":"Office","password":"pw1"}}"#,
        )
        .unwrap();
        match req {
            Request::Connect { ssid, password } => {
                assert_eq!(ssid, "Office");
                assert_eq!(password.unwrap().into_secret().expose_secret(), "pw1");
            }
            other => panic!("unexpected {other:?}"),
        }

        let req: Request = serde_json::from_str(r#"{"command":"scan"}"#).unwrap();
        assert!(matches!(req, Request::Scan));

        let req: Request =
            serde_json::from_str(r#"{"command":"listNetworks","params":{"favoritesOnly":true}}"#)
                .unwrap();
        assert!(matches!(req, Request::ListNetworks { favorites_only: true }));
    }

    #[test]
    fn password_never_appears_in_debug() {
        let req: Request = serde_json::from_str(
            r#"{"command":"savePassword","params":{"ssid":"Office","password":"hunter2"}}"#,
        )
        .unwrap();
        assert!(!format!("{req:?}").contains("hunter2"));
    }

    #[test]
    fn params_may_be_omitted_when_all_have_defaults() {
        for command in [
            "scan",
            "listNetworks",
            "cancelConnect",
            "listPasswords",
            "auditPasswords",
            "status",
        ] {
            for body in [
                format!(r#"{{"command":"{command}"}}"#),
                format!(r#"{{"command":"{command}","params":null}}"#),
                format!(r#"{{"command":"{command}","params":{{}}}}"#),
            ] {
                let req: Request = serde_json::from_str(&body)
                    .unwrap_or_else(|e| panic!("{body} rejected: {e}"));
                assert_eq!(req.name(), command);
            }
        }

        let req: Request = serde_json::from_str(r#"{"command":"listNetworks"}"#).unwrap();
        assert!(matches!(req, Request::ListNetworks { favorites_only: false }));
    }

    #[test]
    fn required_params_are_still_enforced() {
        for body in [
            r#"{"command":"connect"}"#,
            r#"{"command":"disconnect","params":{}}"#,
            r#"{"command":"setFavorite","params":{"ssid":"Office"}}"#,
            r#"{"command":"savePassword","params":{"ssid":"Office"}}"#,
        ] {
            assert!(serde_json::from_str::<Request>(body).is_err(), "{body} accepted");
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"command":"reboot"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"params":{}}"#).is_err());
    }

    #[test]
    fn failure_carries_stable_code() {
        let resp = Response::failure(&CoreError::AlreadyConnecting { ssid: "Home".into() });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["code"], "ALREADY_CONNECTING");
        assert!(json.get("data").is_none());
    }
}
