use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::kms::CreateKeyRequest;
use crate::types::Result;
use crate::x509::{Certificate, KeyMaterial, PublicKey};

/// Type of certificate authority to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateAuthorityType {
    /// Self-signed authority
    RootCA,
    /// Authority signed by a parent authority
    IntermediateCA,
}

impl fmt::Display for CertificateAuthorityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateAuthorityType::RootCA => write!(f, "root"),
            CertificateAuthorityType::IntermediateCA => write!(f, "intermediate"),
        }
    }
}

/// Signature algorithm and digest pair
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Backend default
    #[default]
    Unspecified,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    SHA256WithRSA,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    SHA384WithRSA,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    SHA512WithRSA,
    /// RSASSA-PSS with SHA-256
    SHA256WithRSAPSS,
    /// RSASSA-PSS with SHA-384
    SHA384WithRSAPSS,
    /// RSASSA-PSS with SHA-512
    SHA512WithRSAPSS,
    /// ECDSA on P-256 with SHA-256
    ECDSAWithSHA256,
    /// ECDSA on P-384 with SHA-384
    ECDSAWithSHA384,
    /// ECDSA on P-521 with SHA-512
    ECDSAWithSHA512,
    /// Ed25519 (SHA-512 internally)
    PureEd25519,
}

impl SignatureAlgorithm {
    pub fn is_unspecified(&self) -> bool {
        *self == SignatureAlgorithm::Unspecified
    }

    pub fn is_rsa(&self) -> bool {
        matches!(
            self,
            Self::SHA256WithRSA
                | Self::SHA384WithRSA
                | Self::SHA512WithRSA
                | Self::SHA256WithRSAPSS
                | Self::SHA384WithRSAPSS
                | Self::SHA512WithRSAPSS
        )
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unspecified => "unspecified",
            Self::SHA256WithRSA => "SHA256-RSA",
            Self::SHA384WithRSA => "SHA384-RSA",
            Self::SHA512WithRSA => "SHA512-RSA",
            Self::SHA256WithRSAPSS => "SHA256-RSAPSS",
            Self::SHA384WithRSAPSS => "SHA384-RSAPSS",
            Self::SHA512WithRSAPSS => "SHA512-RSAPSS",
            Self::ECDSAWithSHA256 => "ECDSA-SHA256",
            Self::ECDSAWithSHA384 => "ECDSA-SHA384",
            Self::ECDSAWithSHA512 => "ECDSA-SHA512",
            Self::PureEd25519 => "Ed25519",
        };
        write!(f, "{}", s)
    }
}

/// Revocation reason (RFC 5280 CRLReason)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevocationReason {
    /// Unspecified
    Unspecified = 0,
    /// Key compromise
    KeyCompromise = 1,
    /// CA compromise
    CACompromise = 2,
    /// Affiliation changed
    AffiliationChanged = 3,
    /// Superseded
    Superseded = 4,
    /// Cessation of operation
    CessationOfOperation = 5,
    /// Certificate hold
    CertificateHold = 6,
    /// Removed from CRL
    RemoveFromCRL = 8,
    /// Privilege withdrawn
    PrivilegeWithdrawn = 9,
    /// AA compromise
    AACompromise = 10,
}

impl RevocationReason {
    /// Look up a reason by its numeric code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unspecified),
            1 => Some(Self::KeyCompromise),
            2 => Some(Self::CACompromise),
            3 => Some(Self::AffiliationChanged),
            4 => Some(Self::Superseded),
            5 => Some(Self::CessationOfOperation),
            6 => Some(Self::CertificateHold),
            8 => Some(Self::RemoveFromCRL),
            9 => Some(Self::PrivilegeWithdrawn),
            10 => Some(Self::AACompromise),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::KeyCompromise => "keyCompromise",
            Self::CACompromise => "cACompromise",
            Self::AffiliationChanged => "affiliationChanged",
            Self::Superseded => "superseded",
            Self::CessationOfOperation => "cessationOfOperation",
            Self::CertificateHold => "certificateHold",
            Self::RemoveFromCRL => "removeFromCRL",
            Self::PrivilegeWithdrawn => "privilegeWithdrawn",
            Self::AACompromise => "aACompromise",
        }
    }
}

impl FromStr for RevocationReason {
    type Err = Error;

    fn from_str(reason: &str) -> Result<Self> {
        match reason.to_lowercase().as_str() {
            "unspecified" => Ok(Self::Unspecified),
            "keycompromise" | "key compromise" => Ok(Self::KeyCompromise),
            "cacompromise" | "ca compromise" => Ok(Self::CACompromise),
            "affiliationchanged" | "affiliation changed" => Ok(Self::AffiliationChanged),
            "superseded" => Ok(Self::Superseded),
            "cessationofoperation" | "cessation of operation" => Ok(Self::CessationOfOperation),
            "certificatehold" | "certificate hold" => Ok(Self::CertificateHold),
            "removefromcrl" | "remove from crl" => Ok(Self::RemoveFromCRL),
            "privilegewithdrawn" | "privilege withdrawn" => Ok(Self::PrivilegeWithdrawn),
            "aacompromise" | "aa compromise" => Ok(Self::AACompromise),
            _ => Err(Error::InvalidArgument(format!("unknown revocation reason '{}'", reason))),
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Check a lifetime/backdate pair
pub fn validate_validity(lifetime: Duration, backdate: Duration) -> Result<()> {
    if lifetime <= Duration::zero() {
        return Err(Error::InvalidArgument(format!(
            "lifetime must be positive, got {}s",
            lifetime.num_seconds()
        )));
    }
    if backdate < Duration::zero() {
        return Err(Error::InvalidArgument(format!(
            "backdate cannot be negative, got {}s",
            backdate.num_seconds()
        )));
    }
    if backdate >= lifetime {
        return Err(Error::InvalidArgument(format!(
            "backdate {}s must be shorter than lifetime {}s",
            backdate.num_seconds(),
            lifetime.num_seconds()
        )));
    }
    Ok(())
}

/// Validity window for a certificate issued at `issued_at`: it starts
/// `backdate` before issuance and spans exactly `lifetime`.
pub fn validity_window(
    issued_at: DateTime<Utc>,
    lifetime: Duration,
    backdate: Duration,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    validate_validity(lifetime, backdate)?;

    let not_before = issued_at
        .checked_sub_signed(backdate)
        .ok_or_else(|| Error::InvalidArgument("backdate out of range".into()))?;
    let not_after = not_before
        .checked_add_signed(lifetime)
        .ok_or_else(|| Error::InvalidArgument("lifetime out of range".into()))?;
    Ok((not_before, not_after))
}

/// Request to sign a new certificate
#[derive(Debug, Clone)]
pub struct CreateCertificateRequest {
    /// Fields to sign; the public key must be set
    pub template: Certificate,
    pub lifetime: Duration,
    pub backdate: Duration,
    /// Idempotency key; empty disables deduplication
    pub request_id: String,
}

impl CreateCertificateRequest {
    pub fn validate(&self) -> Result<()> {
        validate_validity(self.lifetime, self.backdate)
    }
}

/// Signed certificate and its chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCertificateResponse {
    pub certificate: Certificate,
    /// Issuer chain, nearest issuer first
    pub certificate_chain: Vec<Certificate>,
}

/// Request to re-sign an existing certificate with a fresh validity window
#[derive(Debug, Clone)]
pub struct RenewCertificateRequest {
    /// The certificate being renewed; its serial number identifies it
    pub template: Certificate,
    pub lifetime: Duration,
    pub backdate: Duration,
    pub request_id: String,
}

impl RenewCertificateRequest {
    pub fn validate(&self) -> Result<()> {
        validate_validity(self.lifetime, self.backdate)?;
        if self.template.serial_number.is_empty() {
            return Err(Error::InvalidArgument(
                "renewal template must carry the serial number of the certificate to renew".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewCertificateResponse {
    pub certificate: Certificate,
    pub certificate_chain: Vec<Certificate>,
}

/// Request to revoke a certificate
#[derive(Debug, Clone)]
pub struct RevokeCertificateRequest {
    pub certificate: Certificate,
    /// Human readable reason
    pub reason: String,
    /// RFC 5280 reason code
    pub reason_code: i32,
    pub request_id: String,
}

impl RevokeCertificateRequest {
    pub fn validate(&self) -> Result<()> {
        if self.certificate.serial_number.is_empty() {
            return Err(Error::InvalidArgument(
                "certificate to revoke has no serial number".into(),
            ));
        }
        self.reason_code()?;
        Ok(())
    }

    /// The typed reason code
    pub fn reason_code(&self) -> Result<RevocationReason> {
        RevocationReason::from_code(self.reason_code).ok_or_else(|| {
            Error::InvalidArgument(format!("invalid revocation reason code {}", self.reason_code))
        })
    }
}

/// The revoked certificate and its chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeCertificateResponse {
    pub certificate: Certificate,
    pub certificate_chain: Vec<Certificate>,
}

/// Request for the root certificate of an authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCertificateAuthorityRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCertificateAuthorityResponse {
    pub root_certificate: Certificate,
}

/// Request to create a root or intermediate authority
#[derive(Debug, Clone)]
pub struct CreateCertificateAuthorityRequest {
    pub name: String,
    pub ca_type: CertificateAuthorityType,
    pub template: Certificate,
    pub lifetime: Duration,
    pub backdate: Duration,
    pub request_id: String,
    /// Placement hint for partitioned backends
    pub project: String,
    /// Placement hint for partitioned backends
    pub location: String,
    /// Already-created parent, required for intermediates
    pub parent: Option<Box<CreateCertificateAuthorityResponse>>,
    /// Key creation policy; the backend default applies when absent
    pub create_key: Option<CreateKeyRequest>,
}

impl CreateCertificateAuthorityRequest {
    pub fn validate(&self) -> Result<()> {
        validate_validity(self.lifetime, self.backdate)?;

        match (self.ca_type, &self.parent) {
            (CertificateAuthorityType::IntermediateCA, None) => Err(Error::InvalidArgument(
                "intermediate authority requires a parent".into(),
            )),
            (CertificateAuthorityType::IntermediateCA, Some(parent))
                if !parent.certificate.is_ca =>
            {
                Err(Error::InvalidArgument(format!(
                    "parent '{}' is not a certificate authority",
                    parent.name
                )))
            }
            (CertificateAuthorityType::RootCA, Some(_)) => Err(Error::InvalidArgument(
                "root authority cannot have a parent".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// A created authority: its certificate, chain, public key and signing path
#[derive(Debug, Clone)]
pub struct CreateCertificateAuthorityResponse {
    pub name: String,
    pub certificate: Certificate,
    /// Chain above this authority, nearest issuer first; empty for roots
    pub certificate_chain: Vec<Certificate>,
    pub public_key: PublicKey,
    pub key_material: KeyMaterial,
}
