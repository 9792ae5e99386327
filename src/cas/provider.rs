use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::cas::softcas::SoftCas;
use crate::cas::types::{
    CreateCertificateAuthorityRequest, CreateCertificateAuthorityResponse,
    CreateCertificateRequest, CreateCertificateResponse, GetCertificateAuthorityRequest,
    GetCertificateAuthorityResponse, RenewCertificateRequest, RenewCertificateResponse,
    RevokeCertificateRequest, RevokeCertificateResponse,
};
use crate::config::Settings;
use crate::error::Error;
use crate::types::Result;

/// Certificate Authority Service interface.
///
/// Each backend (software signer, cloud KMS, hosted CA) implements this
/// trait; the request and response types are shared by all of them.
#[async_trait]
pub trait CertificateAuthorityService: Send + Sync {
    /// Sign a new certificate from a template.
    ///
    /// Calls repeating a non-empty `request_id` return the certificate issued
    /// by the first successful call.
    async fn create_certificate(
        &self,
        req: &CreateCertificateRequest,
    ) -> Result<CreateCertificateResponse>;

    /// Re-sign a previously issued certificate with a fresh validity window
    async fn renew_certificate(
        &self,
        req: &RenewCertificateRequest,
    ) -> Result<RenewCertificateResponse>;

    /// Revoke a certificate; fails with `AlreadyRevoked` on repeats
    async fn revoke_certificate(
        &self,
        req: &RevokeCertificateRequest,
    ) -> Result<RevokeCertificateResponse>;

    /// Look up the root certificate of a named authority
    async fn get_certificate_authority(
        &self,
        req: &GetCertificateAuthorityRequest,
    ) -> Result<GetCertificateAuthorityResponse>;

    /// Create a root or intermediate authority with a new signing key
    async fn create_certificate_authority(
        &self,
        req: &CreateCertificateAuthorityRequest,
    ) -> Result<CreateCertificateAuthorityResponse>;
}

/// Create a CAS backend based on configuration
pub async fn create_cas(settings: Arc<Settings>) -> Result<Arc<dyn CertificateAuthorityService>> {
    match settings.cas.backend.as_str() {
        "softcas" => {
            let cas = SoftCas::new(settings.cas.clone());
            if settings.cas.bootstrap {
                let issuer = cas.bootstrap().await?;
                info!("Software CA issuing from '{}'", issuer.name);
            }
            Ok(Arc::new(cas))
        }
        other => Err(Error::Config(format!("Unsupported CAS backend: {}", other))),
    }
}
