use async_trait::async_trait;
use hmac::{ Hmac, Mac };
use log::{ info, warn };
use sha2::Sha256;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Users and admins live in separate namespaces: the same principal may hold
/// one credential of each kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrincipalKind {
    User,
    Admin,
}

impl std::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrincipalKind::User => write!(f, "user"),
            PrincipalKind::Admin => write!(f, "admin"),
        }
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn verify(&self, kind: PrincipalKind, principal: &str, secret: &str) -> bool;

    async fn register(
        &self,
        kind: PrincipalKind,
        principal: &str,
        secret: &str
    ) -> Result<(), AuthError>;

    async fn verify_credentials(&self, principal: &str, secret: &str) -> bool {
        self.verify(PrincipalKind::User, principal, secret).await
    }

    async fn register_principal(&self, principal: &str, secret: &str) -> Result<(), AuthError> {
        self.register(PrincipalKind::User, principal, secret).await
    }

    async fn verify_admin(&self, principal: &str, secret: &str) -> bool {
        self.verify(PrincipalKind::Admin, principal, secret).await
    }

    async fn register_admin(&self, principal: &str, secret: &str) -> Result<(), AuthError> {
        self.register(PrincipalKind::Admin, principal, secret).await
    }
}

struct StoredCredential {
    salt: String,
    digest: String,
}

/// In-process credential store keyed by principal kind and name.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<(PrincipalKind, String), StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn keyed_mac(salt: &str, secret: &str) -> Result<HmacSha256, AuthError> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).map_err(|e|
        AuthError::Storage(format!("Failed to initialise HMAC: {}", e))
    )?;
    mac.update(secret.as_bytes());
    Ok(mac)
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn verify(&self, kind: PrincipalKind, principal: &str, secret: &str) -> bool {
        let credentials = self.credentials.read().await;
        let Some(stored) = credentials.get(&(kind, principal.to_string())) else {
            return false;
        };
        let Ok(expected) = hex::decode(&stored.digest) else {
            warn!("Corrupt credential digest for {} {}", kind, principal);
            return false;
        };
        match keyed_mac(&stored.salt, secret) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }

    async fn register(
        &self,
        kind: PrincipalKind,
        principal: &str,
        secret: &str
    ) -> Result<(), AuthError> {
        let key = (kind, principal.to_string());
        let mut credentials = self.credentials.write().await;
        if credentials.contains_key(&key) {
            return Err(AuthError::AlreadyExists(principal.to_string()));
        }
        let salt = Uuid::new_v4().simple().to_string();
        let digest = hex::encode(keyed_mac(&salt, secret)?.finalize().into_bytes());
        credentials.insert(key, StoredCredential { salt, digest });
        info!("Registered {} {}", kind, principal);
        Ok(())
    }
}
