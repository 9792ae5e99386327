use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cas::types::SignatureAlgorithm;
use crate::types::Result;
use crate::x509::{PrivateKey, PublicKey, Signer};

/// Where a key is generated and stored
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtectionLevel {
    /// Key manager default
    #[default]
    Unspecified,
    /// Software-protected key
    Software,
    /// Hardware security module
    HSM,
}

/// Key creation policy attached to authority creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateKeyRequest {
    /// Key name or resource identifier understood by the key manager
    pub name: String,
    /// Signing algorithm; `Unspecified` selects the key manager default
    pub signature_algorithm: SignatureAlgorithm,
    /// Key size in bits, only meaningful for RSA
    pub bits: usize,
    pub protection_level: ProtectionLevel,
}

/// A freshly generated key
#[derive(Debug, Clone)]
pub struct CreateKeyResponse {
    pub name: String,
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// Key-management collaborator used by CAS backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Generate a new key pair according to `req`
    async fn create_key(&self, req: &CreateKeyRequest) -> Result<CreateKeyResponse>;

    /// Wrap a key into a non-exportable signer
    async fn create_signer(&self, key: &CreateKeyResponse) -> Result<Arc<dyn Signer>>;
}
