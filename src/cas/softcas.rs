use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cas::provider::CertificateAuthorityService;
use crate::cas::types::{
    validity_window, CertificateAuthorityType, CreateCertificateAuthorityRequest,
    CreateCertificateAuthorityResponse, CreateCertificateRequest, CreateCertificateResponse,
    GetCertificateAuthorityRequest, GetCertificateAuthorityResponse, RenewCertificateRequest,
    RenewCertificateResponse, RevocationReason, RevokeCertificateRequest,
    RevokeCertificateResponse,
};
use crate::config::{CasConfig, KeyMaterialMode};
use crate::error::Error;
use crate::kms::softkms::rcgen_algorithm;
use crate::kms::{CreateKeyRequest, KeyManager, SoftKms};
use crate::types::Result;
use crate::x509::{Certificate, KeyMaterial, KeyUsage, PublicKey, Signer};

/// Revocation details of an issued certificate
#[derive(Debug, Clone)]
struct Revocation {
    reason: String,
    reason_code: RevocationReason,
    revoked_at: DateTime<Utc>,
}

/// Certificate issued by this backend
#[derive(Debug, Clone)]
struct IssuedRecord {
    certificate: Certificate,
    chain: Vec<Certificate>,
    revocation: Option<Revocation>,
}

/// Authority known to this backend
#[derive(Debug, Clone)]
struct AuthorityRecord {
    certificate: Certificate,
    chain: Vec<Certificate>,
}

impl AuthorityRecord {
    fn root(&self) -> &Certificate {
        self.chain.last().unwrap_or(&self.certificate)
    }
}

/// Authority that signs leaf certificates
#[derive(Debug, Clone)]
struct ActiveIssuer {
    certificate: Certificate,
    chain: Vec<Certificate>,
    key: KeyMaterial,
}

impl ActiveIssuer {
    /// Chain handed out with every leaf: the issuer followed by its own chain
    fn leaf_chain(&self) -> Vec<Certificate> {
        std::iter::once(self.certificate.clone())
            .chain(self.chain.iter().cloned())
            .collect()
    }
}

#[derive(Default)]
struct State {
    issuer: Option<ActiveIssuer>,
    /// Issued certificates by hex serial
    issued: HashMap<String, IssuedRecord>,
    /// Authorities by name
    authorities: HashMap<String, AuthorityRecord>,
    /// Idempotency caches by request ID. Entries live as long as the
    /// instance so a retry is answered at any point in its lifetime.
    created: HashMap<String, CreateCertificateResponse>,
    renewed: HashMap<String, RenewCertificateResponse>,
    authorities_created: HashMap<String, CreateCertificateAuthorityResponse>,
}

/// Software certificate authority.
///
/// Keys come from a [`KeyManager`] and certificates are assembled and signed
/// with rcgen. Issued certificates, revocations and request IDs are tracked
/// in memory for the lifetime of the instance.
pub struct SoftCas {
    config: CasConfig,
    kms: Arc<dyn KeyManager>,
    state: Mutex<State>,
}

impl SoftCas {
    /// Create a software CA backed by the in-process key manager
    pub fn new(config: CasConfig) -> Self {
        let kms = Arc::new(SoftKms::with_default_algorithm(config.default_key_algorithm));
        Self::with_key_manager(config, kms)
    }

    /// Create a software CA delegating key creation to `kms`
    pub fn with_key_manager(config: CasConfig, kms: Arc<dyn KeyManager>) -> Self {
        Self {
            config,
            kms,
            state: Mutex::new(State::default()),
        }
    }

    /// Sign leaf certificates with the given authority from now on
    pub async fn set_issuer(&self, authority: &CreateCertificateAuthorityResponse) {
        let mut state = self.state.lock().await;

        state
            .authorities
            .entry(authority.name.clone())
            .or_insert_with(|| AuthorityRecord {
                certificate: authority.certificate.clone(),
                chain: authority.certificate_chain.clone(),
            });
        state.issuer = Some(ActiveIssuer {
            certificate: authority.certificate.clone(),
            chain: authority.certificate_chain.clone(),
            key: authority.key_material.clone(),
        });

        info!("Active issuer set to '{}' ({})", authority.name, authority.certificate.subject);
    }

    /// Create the configured root and intermediate and issue from the intermediate
    pub async fn bootstrap(&self) -> Result<CreateCertificateAuthorityResponse> {
        let root_config = &self.config.root;
        let root = self
            .create_certificate_authority(&CreateCertificateAuthorityRequest {
                name: root_config.name.clone(),
                ca_type: CertificateAuthorityType::RootCA,
                template: Certificate::template(&root_config.subject()?),
                lifetime: root_config.lifetime(),
                backdate: self.config.default_backdate(),
                request_id: String::new(),
                project: String::new(),
                location: String::new(),
                parent: None,
                create_key: None,
            })
            .await?;

        let intermediate_config = &self.config.intermediate;
        let mut template = Certificate::template(&intermediate_config.subject()?);
        template.max_path_len = Some(0);

        let intermediate = self
            .create_certificate_authority(&CreateCertificateAuthorityRequest {
                name: intermediate_config.name.clone(),
                ca_type: CertificateAuthorityType::IntermediateCA,
                template,
                lifetime: intermediate_config.lifetime(),
                backdate: self.config.default_backdate(),
                request_id: String::new(),
                project: String::new(),
                location: String::new(),
                parent: Some(Box::new(root)),
                create_key: None,
            })
            .await?;

        self.set_issuer(&intermediate).await;
        Ok(intermediate)
    }
}

#[async_trait]
impl CertificateAuthorityService for SoftCas {
    async fn create_certificate(
        &self,
        req: &CreateCertificateRequest,
    ) -> Result<CreateCertificateResponse> {
        req.validate()?;
        debug!("Soft CAS: Creating certificate for {}", req.template.subject);

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(previous) = cached(&state.created, &req.request_id) {
            debug!("Soft CAS: Replaying certificate for request {}", req.request_id);
            return Ok(previous);
        }

        let issuer = state.issuer.as_ref().ok_or_else(|| {
            Error::backend("no active signing authority; create or set an issuer first")
        })?;
        let public_key = req.template.public_key.clone().ok_or_else(|| {
            Error::InvalidArgument("certificate template has no public key".into())
        })?;

        let certificate = sign_certificate(
            issuer,
            req.template.clone(),
            &public_key,
            req.lifetime,
            req.backdate,
        )?;
        let response = CreateCertificateResponse {
            certificate,
            certificate_chain: issuer.leaf_chain(),
        };

        record_issued(&mut state.issued, &response.certificate, &response.certificate_chain);
        if !req.request_id.is_empty() {
            state.created.insert(req.request_id.clone(), response.clone());
        }

        info!(
            "Issued certificate {} for {}",
            response.certificate.serial_hex(),
            response.certificate.subject
        );
        Ok(response)
    }

    async fn renew_certificate(
        &self,
        req: &RenewCertificateRequest,
    ) -> Result<RenewCertificateResponse> {
        req.validate()?;
        let serial = req.template.serial_hex();
        debug!("Soft CAS: Renewing certificate {}", serial);

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(previous) = cached(&state.renewed, &req.request_id) {
            debug!("Soft CAS: Replaying renewal for request {}", req.request_id);
            return Ok(previous);
        }

        let existing = state
            .issued
            .get(&serial)
            .ok_or_else(|| Error::NotFound(format!("certificate {}", serial)))?;
        if existing.revocation.is_some() {
            return Err(Error::AlreadyRevoked(format!(
                "certificate {} is revoked and cannot be renewed",
                serial
            )));
        }

        let public_key = req
            .template
            .public_key
            .clone()
            .or_else(|| existing.certificate.public_key.clone())
            .ok_or_else(|| {
                Error::InvalidArgument(format!("certificate {} has no public key", serial))
            })?;

        let issuer = state.issuer.as_ref().ok_or_else(|| {
            Error::backend("no active signing authority; create or set an issuer first")
        })?;
        let certificate = sign_certificate(
            issuer,
            req.template.clone(),
            &public_key,
            req.lifetime,
            req.backdate,
        )?;
        let response = RenewCertificateResponse {
            certificate,
            certificate_chain: issuer.leaf_chain(),
        };

        record_issued(&mut state.issued, &response.certificate, &response.certificate_chain);
        if !req.request_id.is_empty() {
            state.renewed.insert(req.request_id.clone(), response.clone());
        }

        info!(
            "Renewed certificate {} as {}",
            serial,
            response.certificate.serial_hex()
        );
        Ok(response)
    }

    async fn revoke_certificate(
        &self,
        req: &RevokeCertificateRequest,
    ) -> Result<RevokeCertificateResponse> {
        req.validate()?;
        let reason_code = req.reason_code()?;
        let serial = req.certificate.serial_hex();
        debug!("Soft CAS: Revoking certificate {} ({})", serial, reason_code);

        let mut state = self.state.lock().await;
        let record = state
            .issued
            .get_mut(&serial)
            .ok_or_else(|| Error::NotFound(format!("certificate {}", serial)))?;

        if let Some(revocation) = &record.revocation {
            return Err(Error::AlreadyRevoked(format!(
                "certificate {} was revoked at {} ({}: {})",
                serial, revocation.revoked_at, revocation.reason_code, revocation.reason
            )));
        }

        record.revocation = Some(Revocation {
            reason: req.reason.clone(),
            reason_code,
            revoked_at: Utc::now(),
        });

        info!("Revoked certificate {}: {}", serial, reason_code);
        Ok(RevokeCertificateResponse {
            certificate: record.certificate.clone(),
            certificate_chain: record.chain.clone(),
        })
    }

    async fn get_certificate_authority(
        &self,
        req: &GetCertificateAuthorityRequest,
    ) -> Result<GetCertificateAuthorityResponse> {
        if req.name.is_empty() {
            return Err(Error::InvalidArgument("authority name is required".into()));
        }

        let state = self.state.lock().await;
        let authority = state
            .authorities
            .get(&req.name)
            .ok_or_else(|| Error::NotFound(format!("certificate authority '{}'", req.name)))?;

        Ok(GetCertificateAuthorityResponse {
            root_certificate: authority.root().clone(),
        })
    }

    async fn create_certificate_authority(
        &self,
        req: &CreateCertificateAuthorityRequest,
    ) -> Result<CreateCertificateAuthorityResponse> {
        req.validate()?;

        let name = if req.name.is_empty() {
            req.template.subject.common_name.clone()
        } else {
            req.name.clone()
        };
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "authority needs a name or a subject common name".into(),
            ));
        }
        debug!(
            "Soft CAS: Creating {} authority '{}' (project '{}', location '{}')",
            req.ca_type, name, req.project, req.location
        );

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(previous) = cached(&state.authorities_created, &req.request_id) {
            debug!("Soft CAS: Replaying authority for request {}", req.request_id);
            return Ok(previous);
        }
        if state.authorities.contains_key(&name) {
            return Err(Error::InvalidArgument(format!(
                "certificate authority '{}' already exists",
                name
            )));
        }

        let key_request = req.create_key.clone().unwrap_or_else(|| CreateKeyRequest {
            name: name.clone(),
            ..CreateKeyRequest::default()
        });
        let key = self.kms.create_key(&key_request).await?;
        let key_pair = rcgen::KeyPair::try_from(key.private_key.as_pkcs8_der())?;

        let (not_before, not_after) = validity_window(now()?, req.lifetime, req.backdate)?;
        let mut certificate = req.template.clone();
        certificate.serial_number = new_serial();
        certificate.not_before = Some(not_before);
        certificate.not_after = Some(not_after);
        certificate.is_ca = true;
        certificate.public_key = Some(key.public_key.clone());
        if certificate.key_usage.is_empty() {
            certificate.key_usage = vec![
                KeyUsage::CertSign,
                KeyUsage::CrlSign,
                KeyUsage::DigitalSignature,
            ];
        }

        let (signed, chain) = match &req.parent {
            None => {
                certificate.issuer = certificate.subject.clone();
                certificate.signature_algorithm = key.public_key.algorithm;
                (certificate.to_params()?.self_signed(&key_pair)?, Vec::new())
            }
            Some(parent) => {
                certificate.issuer = parent.certificate.subject.clone();
                certificate.signature_algorithm = parent.key_material.algorithm();
                let (parent_cert, parent_key) =
                    load_issuer(&parent.certificate, &parent.key_material)?;
                let signed = certificate
                    .to_params()?
                    .signed_by(&key_pair, &parent_cert, &parent_key)?;
                let chain = std::iter::once(parent.certificate.clone())
                    .chain(parent.certificate_chain.iter().cloned())
                    .collect();
                (signed, chain)
            }
        };
        certificate.raw = signed.der().as_ref().to_vec();

        let key_material = match self.config.key_material {
            KeyMaterialMode::Raw => KeyMaterial::RawKeyPair(key.private_key.clone()),
            KeyMaterialMode::Signer => {
                KeyMaterial::OpaqueSigner(self.kms.create_signer(&key).await?)
            }
        };

        let response = CreateCertificateAuthorityResponse {
            name: name.clone(),
            certificate,
            certificate_chain: chain,
            public_key: key.public_key,
            key_material,
        };

        if req.parent.is_some() {
            record_issued(&mut state.issued, &response.certificate, &response.certificate_chain);
        }
        state.authorities.insert(
            name.clone(),
            AuthorityRecord {
                certificate: response.certificate.clone(),
                chain: response.certificate_chain.clone(),
            },
        );
        if !req.request_id.is_empty() {
            state
                .authorities_created
                .insert(req.request_id.clone(), response.clone());
        }

        info!(
            "Created {} authority '{}' with serial {}",
            req.ca_type,
            name,
            response.certificate.serial_hex()
        );
        Ok(response)
    }
}

/// Adapts a [`Signer`] to rcgen's remote key interface
struct RemoteSigner {
    signer: Arc<dyn Signer>,
    algorithm: &'static rcgen::SignatureAlgorithm,
}

impl rcgen::RemoteKeyPair for RemoteSigner {
    fn public_key(&self) -> &[u8] {
        &self.signer.public_key().raw
    }

    fn sign(&self, msg: &[u8]) -> std::result::Result<Vec<u8>, rcgen::Error> {
        self.signer.sign(msg).map_err(|e| {
            warn!("Remote signer failed: {}", e);
            rcgen::Error::RemoteKeyError
        })
    }

    fn algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
        self.algorithm
    }
}

/// Load an authority's certificate and key into rcgen form for signing
fn load_issuer(
    certificate: &Certificate,
    key: &KeyMaterial,
) -> Result<(rcgen::Certificate, rcgen::KeyPair)> {
    let key_pair = match key {
        KeyMaterial::RawKeyPair(private_key) => {
            rcgen::KeyPair::try_from(private_key.as_pkcs8_der())?
        }
        KeyMaterial::OpaqueSigner(signer) => {
            let algorithm = signer.public_key().algorithm;
            let algorithm = rcgen_algorithm(algorithm).ok_or_else(|| {
                Error::backend(format!("cannot sign with {} signer", algorithm))
            })?;
            rcgen::KeyPair::from_remote(Box::new(RemoteSigner {
                signer: signer.clone(),
                algorithm,
            }))?
        }
    };

    // rcgen only reads the issuer's name and key from this certificate
    let issuer = certificate.to_params()?.self_signed(&key_pair)?;
    Ok((issuer, key_pair))
}

/// Sign `template` with the active issuer
fn sign_certificate(
    issuer: &ActiveIssuer,
    mut template: Certificate,
    public_key: &PublicKey,
    lifetime: Duration,
    backdate: Duration,
) -> Result<Certificate> {
    let (not_before, not_after) = validity_window(now()?, lifetime, backdate)?;

    template.serial_number = new_serial();
    template.not_before = Some(not_before);
    template.not_after = Some(not_after);
    template.issuer = issuer.certificate.subject.clone();
    template.public_key = Some(public_key.clone());
    template.signature_algorithm = issuer.key.algorithm();

    let spki = rcgen::SubjectPublicKeyInfo::from_der(&public_key.der)
        .map_err(|e| Error::InvalidArgument(format!("invalid template public key: {}", e)))?;
    let (issuer_cert, issuer_key) = load_issuer(&issuer.certificate, &issuer.key)?;

    let signed = template
        .to_params()?
        .signed_by(&spki, &issuer_cert, &issuer_key)?;
    template.raw = signed.der().as_ref().to_vec();
    Ok(template)
}

fn record_issued(
    issued: &mut HashMap<String, IssuedRecord>,
    certificate: &Certificate,
    chain: &[Certificate],
) {
    issued.insert(
        certificate.serial_hex(),
        IssuedRecord {
            certificate: certificate.clone(),
            chain: chain.to_vec(),
            revocation: None,
        },
    );
}

fn cached<T: Clone>(cache: &HashMap<String, T>, request_id: &str) -> Option<T> {
    if request_id.is_empty() {
        return None;
    }
    cache.get(request_id).cloned()
}

/// Positive 128-bit serial number without a leading zero byte
fn new_serial() -> Vec<u8> {
    let mut serial: [u8; 16] = rand::random();
    serial[0] = (serial[0] & 0x7f).max(1);
    serial.to_vec()
}

/// Current time at the one-second precision X.509 encodes
fn now() -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(Utc::now().timestamp(), 0)
        .ok_or_else(|| Error::backend("system clock out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::kms::types::MockKeyManager;
    use crate::x509::{MultiString, Name, Subject};
    use x509_parser::prelude::*;

    async fn issuing_cas(config: CasConfig) -> (SoftCas, CreateCertificateAuthorityResponse) {
        let cas = SoftCas::new(config);
        let intermediate = cas.bootstrap().await.unwrap();
        (cas, intermediate)
    }

    async fn leaf_template(common_name: &str) -> Certificate {
        let key = SoftKms::new()
            .create_key(&CreateKeyRequest::default())
            .await
            .unwrap();
        let mut template = Certificate::template(&Subject::from(Name::with_common_name(common_name)));
        template.dns_names = vec![common_name.to_string()];
        template.public_key = Some(key.public_key);
        template
    }

    fn create_request(template: Certificate, request_id: &str) -> CreateCertificateRequest {
        CreateCertificateRequest {
            template,
            lifetime: Duration::hours(24),
            backdate: Duration::minutes(1),
            request_id: request_id.to_string(),
        }
    }

    fn root_request(name: &str) -> CreateCertificateAuthorityRequest {
        CreateCertificateAuthorityRequest {
            name: name.to_string(),
            ca_type: CertificateAuthorityType::RootCA,
            template: Certificate::template(&Subject::from(Name::with_common_name(name))),
            lifetime: Duration::days(365),
            backdate: Duration::zero(),
            request_id: String::new(),
            project: "acme-project".into(),
            location: "us-west1".into(),
            parent: None,
            create_key: None,
        }
    }

    fn parse(cert: &Certificate) -> X509Certificate<'_> {
        let (_, parsed) = X509Certificate::from_der(&cert.raw).unwrap();
        parsed
    }

    #[tokio::test]
    async fn test_create_certificate_is_idempotent() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let req = create_request(leaf_template("app.example.com").await, "req-1");

        let first = cas.create_certificate(&req).await.unwrap();
        let second = cas.create_certificate(&req).await.unwrap();
        assert_eq!(first.certificate.serial_number, second.certificate.serial_number);
        assert_eq!(first.certificate.raw, second.certificate.raw);
        assert_eq!(first, second);

        let other = cas
            .create_certificate(&create_request(req.template.clone(), "req-2"))
            .await
            .unwrap();
        assert_ne!(other.certificate.serial_number, first.certificate.serial_number);
    }

    #[tokio::test]
    async fn test_concurrent_requests_with_same_id_converge() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let cas = Arc::new(cas);
        let req = create_request(leaf_template("app.example.com").await, "shared-id");

        let (a, b) = tokio::join!(cas.create_certificate(&req), cas.create_certificate(&req));
        assert_eq!(a.unwrap().certificate.raw, b.unwrap().certificate.raw);
    }

    #[tokio::test]
    async fn test_validity_window_is_backdated() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let req = create_request(leaf_template("app.example.com").await, "");

        let before = Utc::now().timestamp();
        let resp = cas.create_certificate(&req).await.unwrap();
        let after = Utc::now().timestamp();

        let cert = &resp.certificate;
        let not_before = cert.not_before.unwrap();
        let not_after = cert.not_after.unwrap();
        assert_eq!(not_after - not_before, req.lifetime);

        let issued_at = (not_before + req.backdate).timestamp();
        assert!(issued_at >= before && issued_at <= after);

        let parsed = parse(cert);
        assert_eq!(parsed.validity().not_before.timestamp(), not_before.timestamp());
        assert_eq!(parsed.validity().not_after.timestamp(), not_after.timestamp());
        assert_eq!(parsed.tbs_certificate.raw_serial(), cert.serial_number.as_slice());
    }

    #[tokio::test]
    async fn test_create_certificate_rejects_bad_validity() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;

        let mut req = create_request(leaf_template("app.example.com").await, "");
        req.lifetime = Duration::zero();
        let err = cas.create_certificate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        req.lifetime = Duration::minutes(5);
        req.backdate = Duration::minutes(10);
        let err = cas.create_certificate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        req.lifetime = Duration::hours(1);
        req.backdate = Duration::hours(1);
        let err = cas.create_certificate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_create_certificate_without_issuer() {
        let cas = SoftCas::new(CasConfig::default());
        let req = create_request(leaf_template("app.example.com").await, "");

        let err = cas.create_certificate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
    }

    #[tokio::test]
    async fn test_create_certificate_requires_public_key() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let mut template = leaf_template("app.example.com").await;
        template.public_key = None;

        let err = cas.create_certificate(&create_request(template, "")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_leaf_chain_and_subject() {
        let (cas, intermediate) = issuing_cas(CasConfig::default()).await;
        let subject = Subject::from(Name {
            common_name: "app.example.com".into(),
            organization: MultiString::from(&["Acme"][..]),
            country: MultiString::from(&["US"][..]),
            ..Name::default()
        });
        let mut template = leaf_template("app.example.com").await;
        subject.set(&mut template);

        let resp = cas.create_certificate(&create_request(template, "")).await.unwrap();

        assert_eq!(resp.certificate.subject_name(), subject);
        assert_eq!(resp.certificate.issuer, intermediate.certificate.subject);
        assert_eq!(resp.certificate_chain.len(), 2);
        assert_eq!(resp.certificate_chain[0], intermediate.certificate);
        assert_eq!(resp.certificate_chain[1], intermediate.certificate_chain[0]);

        let leaf = parse(&resp.certificate);
        let issuer = parse(&resp.certificate_chain[0]);
        assert_eq!(leaf.issuer().to_string(), issuer.subject().to_string());
        assert!(!leaf.is_ca());
        assert!(issuer.is_ca());
    }

    fn der_values<'a, 'b: 'a>(
        attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
    ) -> Vec<String> {
        attrs.map(|attr| attr.as_str().unwrap().to_string()).collect()
    }

    #[tokio::test]
    async fn test_encoded_subject_matches_certificate() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let subject = Subject::from(Name {
            common_name: "app.example.com".into(),
            organization: MultiString::from(&["Acme"][..]),
            organizational_unit: MultiString::from(&["Platform"][..]),
            locality: MultiString::from(&["Portland"][..]),
            province: MultiString::from(&["OR"][..]),
            country: MultiString::from(&["US"][..]),
            ..Name::default()
        });
        let mut template = leaf_template("app.example.com").await;
        subject.set(&mut template);

        let resp = cas.create_certificate(&create_request(template, "")).await.unwrap();
        let cert = &resp.certificate;
        let parsed = parse(cert);
        let der_subject = parsed.subject();

        assert_eq!(der_values(der_subject.iter_country()), cert.subject.country);
        assert_eq!(der_values(der_subject.iter_organization()), cert.subject.organization);
        assert_eq!(
            der_values(der_subject.iter_organizational_unit()),
            cert.subject.organizational_unit
        );
        assert_eq!(der_values(der_subject.iter_locality()), cert.subject.locality);
        assert_eq!(der_values(der_subject.iter_state_or_province()), cert.subject.province);
        assert_eq!(
            der_values(der_subject.iter_common_name()),
            vec![cert.subject.common_name.clone()]
        );
    }

    #[tokio::test]
    async fn test_repeated_name_attribute_is_rejected() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let subject = Subject::from(Name {
            common_name: "app.example.com".into(),
            organization: MultiString::from(&["Acme", "Acme Sub"][..]),
            ..Name::default()
        });
        let mut template = leaf_template("app.example.com").await;
        subject.set(&mut template);

        let err = cas
            .create_certificate(&create_request(template, "req-repeat"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_intermediate_chains_to_parent() {
        let cas = SoftCas::new(CasConfig::default());
        let root = cas.create_certificate_authority(&root_request("Acme Root")).await.unwrap();
        assert!(root.certificate_chain.is_empty());
        assert_eq!(root.certificate.issuer, root.certificate.subject);
        assert!(root.key_material.private_key().is_some());

        let mut req = root_request("Acme Intermediate");
        req.ca_type = CertificateAuthorityType::IntermediateCA;
        req.parent = Some(Box::new(root.clone()));
        let intermediate = cas.create_certificate_authority(&req).await.unwrap();

        assert_eq!(intermediate.certificate_chain, vec![root.certificate.clone()]);
        assert_eq!(intermediate.certificate.issuer, root.certificate.subject);
        assert!(intermediate.certificate.is_ca);

        let parsed = parse(&intermediate.certificate);
        assert_eq!(parsed.issuer().to_string(), parse(&root.certificate).subject().to_string());
    }

    #[tokio::test]
    async fn test_intermediate_without_parent_fails() {
        let cas = SoftCas::new(CasConfig::default());
        let mut req = root_request("Acme Intermediate");
        req.ca_type = CertificateAuthorityType::IntermediateCA;

        let err = cas.create_certificate_authority(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_opaque_signer_chains_and_issues() {
        let config = CasConfig {
            key_material: KeyMaterialMode::Signer,
            ..CasConfig::default()
        };
        let (cas, intermediate) = issuing_cas(config).await;

        assert!(intermediate.key_material.signer().is_some());
        assert!(intermediate.key_material.private_key().is_none());

        let resp = cas
            .create_certificate(&create_request(leaf_template("app.example.com").await, ""))
            .await
            .unwrap();
        let leaf = parse(&resp.certificate);
        assert_eq!(
            leaf.issuer().to_string(),
            parse(&intermediate.certificate).subject().to_string()
        );
    }

    #[tokio::test]
    async fn test_create_key_policy_is_honored() {
        let cas = SoftCas::new(CasConfig::default());
        let mut req = root_request("Ed Root");
        req.create_key = Some(CreateKeyRequest {
            name: "ed-root".into(),
            signature_algorithm: crate::cas::SignatureAlgorithm::PureEd25519,
            ..CreateKeyRequest::default()
        });

        let root = cas.create_certificate_authority(&req).await.unwrap();
        assert_eq!(root.public_key.algorithm, crate::cas::SignatureAlgorithm::PureEd25519);
        assert_eq!(
            root.certificate.signature_algorithm,
            crate::cas::SignatureAlgorithm::PureEd25519
        );
    }

    #[tokio::test]
    async fn test_create_authority_is_idempotent() {
        let cas = SoftCas::new(CasConfig::default());
        let mut req = root_request("Acme Root");
        req.request_id = "ca-1".into();

        let first = cas.create_certificate_authority(&req).await.unwrap();
        let second = cas.create_certificate_authority(&req).await.unwrap();
        assert_eq!(first.certificate, second.certificate);

        req.request_id = "ca-2".into();
        let err = cas.create_certificate_authority(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_key_manager_failure_is_backend_error() {
        let mut kms = MockKeyManager::new();
        kms.expect_create_key().returning(|_| {
            Err(Error::backend_with(
                "key ring unavailable",
                std::io::Error::new(std::io::ErrorKind::Other, "connection refused"),
            ))
        });
        let cas = SoftCas::with_key_manager(CasConfig::default(), Arc::new(kms));

        let err = cas.create_certificate_authority(&root_request("Acme Root")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(
            std::error::Error::source(&err).unwrap().to_string(),
            "connection refused"
        );
    }

    #[tokio::test]
    async fn test_revoke_twice_reports_already_revoked() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let issued = cas
            .create_certificate(&create_request(leaf_template("app.example.com").await, ""))
            .await
            .unwrap();

        let req = RevokeCertificateRequest {
            certificate: issued.certificate.clone(),
            reason: "key leaked".into(),
            reason_code: RevocationReason::KeyCompromise.code(),
            request_id: "revoke-1".into(),
        };
        let revoked = cas.revoke_certificate(&req).await.unwrap();
        assert_eq!(revoked.certificate, issued.certificate);
        assert_eq!(revoked.certificate_chain, issued.certificate_chain);

        let err = cas.revoke_certificate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyRevoked);
    }

    #[tokio::test]
    async fn test_revoke_unknown_certificate() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let req = RevokeCertificateRequest {
            certificate: Certificate {
                serial_number: vec![0x01, 0x02],
                ..Certificate::default()
            },
            reason: String::new(),
            reason_code: 0,
            request_id: String::new(),
        };

        let err = cas.revoke_certificate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_renew_certificate() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let issued = cas
            .create_certificate(&create_request(leaf_template("app.example.com").await, ""))
            .await
            .unwrap();

        let req = RenewCertificateRequest {
            template: issued.certificate.clone(),
            lifetime: Duration::hours(48),
            backdate: Duration::zero(),
            request_id: String::new(),
        };
        let renewed = cas.renew_certificate(&req).await.unwrap();

        assert_ne!(renewed.certificate.serial_number, issued.certificate.serial_number);
        assert_eq!(renewed.certificate.subject, issued.certificate.subject);
        assert_eq!(renewed.certificate.public_key, issued.certificate.public_key);
        assert_eq!(
            renewed.certificate.not_after.unwrap() - renewed.certificate.not_before.unwrap(),
            Duration::hours(48)
        );
    }

    #[tokio::test]
    async fn test_renew_unknown_certificate() {
        let (cas, _) = issuing_cas(CasConfig::default()).await;
        let mut template = leaf_template("app.example.com").await;
        template.serial_number = vec![0x42];

        let req = RenewCertificateRequest {
            template,
            lifetime: Duration::hours(1),
            backdate: Duration::zero(),
            request_id: String::new(),
        };
        let err = cas.renew_certificate(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_get_certificate_authority_returns_root() {
        let (cas, intermediate) = issuing_cas(CasConfig::default()).await;
        let root = intermediate.certificate_chain[0].clone();

        for name in [CasConfig::default().root.name, intermediate.name.clone()] {
            let resp = cas
                .get_certificate_authority(&GetCertificateAuthorityRequest { name })
                .await
                .unwrap();
            assert_eq!(resp.root_certificate, root);
        }

        let err = cas
            .get_certificate_authority(&GetCertificateAuthorityRequest {
                name: "missing".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
