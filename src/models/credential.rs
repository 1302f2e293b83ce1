use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row in the credential pool.
///
/// Identity (`id`, `kind`) is fixed at creation; the operational fields
/// (`exhausted`, `reset_at`, tokens) mutate through the store. Changing the
/// kind of an existing credential is a delete plus insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub kind: CredentialKind,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub exhausted: bool,
    #[serde(default)]
    pub reset_at: Option<DateTime<Utc>>,
}

/// The two ways a credential authenticates against its upstream. The set is
/// closed: either a long-lived bearer secret, or a refresh/access token pair
/// obtained from an interactive login elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialKind {
    StaticKey {
        secret: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    InteractiveLogin {
        refresh_token: String,
        #[serde(default)]
        access_token: String,
        #[serde(default = "unix_epoch")]
        token_refreshed_at: DateTime<Utc>,
        #[serde(default)]
        tenant_id: Option<String>,
    },
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl Credential {
    pub fn is_interactive(&self) -> bool {
        matches!(self.kind, CredentialKind::InteractiveLogin { .. })
    }

    /// Kind discriminant as stored in the `kind` column.
    pub fn kind_str(&self) -> &'static str {
        match self.kind {
            CredentialKind::StaticKey { .. } => "static_key",
            CredentialKind::InteractiveLogin { .. } => "interactive_login",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_key_json_shape_is_flat_and_tagged() {
        let cred = Credential {
            id: 7,
            name: "work".into(),
            kind: CredentialKind::StaticKey {
                secret: "sk-abc".into(),
                base_url: None,
            },
            priority: 2,
            exhausted: false,
            reset_at: None,
        };

        let v = serde_json::to_value(&cred).unwrap();
        assert_eq!(v["kind"], "static_key");
        assert_eq!(v["secret"], "sk-abc");
        assert_eq!(v["priority"], 2);
    }

    #[test]
    fn interactive_login_roundtrips() {
        let json = serde_json::json!({
            "name": "personal",
            "kind": "interactive_login",
            "refresh_token": "rt-1",
            "tenant_id": "acct-1",
        });

        let cred: Credential = serde_json::from_value(json).unwrap();
        assert!(cred.is_interactive());
        match &cred.kind {
            CredentialKind::InteractiveLogin {
                refresh_token,
                access_token,
                token_refreshed_at,
                tenant_id,
            } => {
                assert_eq!(refresh_token, "rt-1");
                assert!(access_token.is_empty());
                assert_eq!(*token_refreshed_at, DateTime::<Utc>::UNIX_EPOCH);
                assert_eq!(tenant_id.as_deref(), Some("acct-1"));
            }
            _ => panic!("wrong kind"),
        }
    }
}
