//! Certificate Authority Service contract and backends

pub mod provider;
pub mod softcas;
pub mod types;

pub use provider::{create_cas, CertificateAuthorityService};
pub use softcas::SoftCas;
pub use types::{
    CertificateAuthorityType, CreateCertificateAuthorityRequest,
    CreateCertificateAuthorityResponse, CreateCertificateRequest, CreateCertificateResponse,
    GetCertificateAuthorityRequest, GetCertificateAuthorityResponse, RenewCertificateRequest,
    RenewCertificateResponse, RevocationReason, RevokeCertificateRequest,
    RevokeCertificateResponse, SignatureAlgorithm,
};
