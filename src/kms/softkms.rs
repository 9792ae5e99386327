use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ring::rand::SystemRandom;
use ring::signature::{self, EcdsaKeyPair, Ed25519KeyPair};
use tracing::debug;

use crate::cas::types::SignatureAlgorithm;
use crate::error::Error;
use crate::kms::types::{CreateKeyRequest, CreateKeyResponse, KeyManager, ProtectionLevel};
use crate::types::Result;
use crate::x509::{PrivateKey, PublicKey, Signer};

/// rcgen algorithm for a signature algorithm, if rcgen can sign with it
pub(crate) fn rcgen_algorithm(
    algorithm: SignatureAlgorithm,
) -> Option<&'static rcgen::SignatureAlgorithm> {
    match algorithm {
        SignatureAlgorithm::ECDSAWithSHA256 => Some(&rcgen::PKCS_ECDSA_P256_SHA256),
        SignatureAlgorithm::ECDSAWithSHA384 => Some(&rcgen::PKCS_ECDSA_P384_SHA384),
        SignatureAlgorithm::PureEd25519 => Some(&rcgen::PKCS_ED25519),
        SignatureAlgorithm::SHA256WithRSA => Some(&rcgen::PKCS_RSA_SHA256),
        SignatureAlgorithm::SHA384WithRSA => Some(&rcgen::PKCS_RSA_SHA384),
        SignatureAlgorithm::SHA512WithRSA => Some(&rcgen::PKCS_RSA_SHA512),
        _ => None,
    }
}

/// In-process key manager generating software keys
#[derive(Debug, Clone)]
pub struct SoftKms {
    default_algorithm: SignatureAlgorithm,
}

impl Default for SoftKms {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftKms {
    /// Key manager defaulting to ECDSA P-256
    pub fn new() -> Self {
        Self::with_default_algorithm(SignatureAlgorithm::ECDSAWithSHA256)
    }

    pub fn with_default_algorithm(default_algorithm: SignatureAlgorithm) -> Self {
        let default_algorithm = if default_algorithm.is_unspecified() {
            SignatureAlgorithm::ECDSAWithSHA256
        } else {
            default_algorithm
        };
        Self { default_algorithm }
    }

    pub fn default_algorithm(&self) -> SignatureAlgorithm {
        self.default_algorithm
    }
}

#[async_trait]
impl KeyManager for SoftKms {
    async fn create_key(&self, req: &CreateKeyRequest) -> Result<CreateKeyResponse> {
        if req.protection_level == ProtectionLevel::HSM {
            return Err(Error::InvalidArgument(
                "software key manager cannot create HSM-protected keys".into(),
            ));
        }

        let algorithm = if req.signature_algorithm.is_unspecified() {
            self.default_algorithm
        } else {
            req.signature_algorithm
        };

        // ring generates EC and Ed25519 keys only
        let alg = match algorithm {
            SignatureAlgorithm::ECDSAWithSHA256
            | SignatureAlgorithm::ECDSAWithSHA384
            | SignatureAlgorithm::PureEd25519 => rcgen_algorithm(algorithm),
            _ => None,
        }
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{} keys are not supported by the software key manager",
                algorithm
            ))
        })?;

        debug!("Generating {} key '{}'", algorithm, req.name);
        let key_pair = rcgen::KeyPair::generate_for(alg)?;

        Ok(CreateKeyResponse {
            name: req.name.clone(),
            public_key: PublicKey::new(
                algorithm,
                key_pair.public_key_der(),
                key_pair.public_key_raw().to_vec(),
            ),
            private_key: PrivateKey::new(algorithm, key_pair.serialize_der()),
        })
    }

    async fn create_signer(&self, key: &CreateKeyResponse) -> Result<Arc<dyn Signer>> {
        Ok(Arc::new(SoftSigner::new(key)?))
    }
}

enum SigningKey {
    Ecdsa(EcdsaKeyPair),
    Ed25519(Ed25519KeyPair),
}

/// Signer over a software key that never hands the key back out
pub struct SoftSigner {
    key: SigningKey,
    public_key: PublicKey,
    rng: SystemRandom,
}

impl SoftSigner {
    pub fn new(key: &CreateKeyResponse) -> Result<Self> {
        let rng = SystemRandom::new();
        let der = key.private_key.as_pkcs8_der();
        let rejected = |e: ring::error::KeyRejected| {
            Error::backend_with("failed to load signing key", e.to_string())
        };

        let signing_key = match key.private_key.algorithm() {
            SignatureAlgorithm::ECDSAWithSHA256 => SigningKey::Ecdsa(
                EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, der, &rng)
                    .map_err(rejected)?,
            ),
            SignatureAlgorithm::ECDSAWithSHA384 => SigningKey::Ecdsa(
                EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P384_SHA384_ASN1_SIGNING, der, &rng)
                    .map_err(rejected)?,
            ),
            SignatureAlgorithm::PureEd25519 => {
                SigningKey::Ed25519(Ed25519KeyPair::from_pkcs8(der).map_err(rejected)?)
            }
            other => {
                return Err(Error::InvalidArgument(format!(
                    "{} keys cannot back a software signer",
                    other
                )))
            }
        };

        Ok(Self {
            key: signing_key,
            public_key: key.public_key.clone(),
            rng,
        })
    }
}

impl fmt::Debug for SoftSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftSigner")
            .field("algorithm", &self.public_key.algorithm)
            .finish_non_exhaustive()
    }
}

impl Signer for SoftSigner {
    fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match &self.key {
            SigningKey::Ecdsa(key) => key
                .sign(&self.rng, message)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|e| Error::backend_with("ECDSA signing failed", e.to_string())),
            SigningKey::Ed25519(key) => Ok(key.sign(message).as_ref().to_vec()),
        }
    }
}
