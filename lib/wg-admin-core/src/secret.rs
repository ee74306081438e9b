//! Deployment secrets

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

const REDACTED: &str = "<redacted>";

/// Administration password of the VPN web UI.
///
/// Never printed: `Debug` shows a short digest, `Display` and `Serialize`
/// show a placeholder. Use [`AdminPassword::expose`] to hand it to a backend.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminPassword(String);

impl AdminPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First 8 hex characters of the SHA-256 of the password
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for AdminPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminPassword")
            .field("sha256", &self.fingerprint())
            .finish()
    }
}

impl fmt::Display for AdminPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for AdminPassword {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for AdminPassword {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(AdminPassword)
    }
}

/// Parameters supplied at deployment time
#[derive(Clone, Debug, Serialize)]
pub struct VpnSecrets {
    /// Public host name clients connect to
    pub host: String,
    pub password: AdminPassword,
}

impl VpnSecrets {
    pub fn new(host: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            password: AdminPassword::new(password),
        }
    }
}
