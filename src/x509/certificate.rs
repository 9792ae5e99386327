use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    Ia5String, IsCa, KeyUsagePurpose, SanType, SerialNumber,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cas::types::SignatureAlgorithm;
use crate::error::Error;
use crate::types::Result;
use crate::x509::keys::PublicKey;
use crate::x509::name::{Issuer, Subject};

/// Attribute types carried by [`PkixName`], in encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Country,
    Organization,
    OrganizationalUnit,
    Locality,
    Province,
    StreetAddress,
    PostalCode,
    SerialNumber,
    CommonName,
}

impl AttributeType {
    /// RFC 4514 short name
    pub fn short_name(&self) -> &'static str {
        match self {
            AttributeType::Country => "C",
            AttributeType::Province => "ST",
            AttributeType::Locality => "L",
            AttributeType::StreetAddress => "STREET",
            AttributeType::PostalCode => "POSTALCODE",
            AttributeType::Organization => "O",
            AttributeType::OrganizationalUnit => "OU",
            AttributeType::CommonName => "CN",
            AttributeType::SerialNumber => "SERIALNUMBER",
        }
    }

    fn dn_type(&self) -> DnType {
        match self {
            AttributeType::Country => DnType::CountryName,
            AttributeType::Province => DnType::StateOrProvinceName,
            AttributeType::Locality => DnType::LocalityName,
            AttributeType::Organization => DnType::OrganizationName,
            AttributeType::OrganizationalUnit => DnType::OrganizationalUnitName,
            AttributeType::CommonName => DnType::CommonName,
            AttributeType::StreetAddress => DnType::CustomDnType(vec![2, 5, 4, 9]),
            AttributeType::PostalCode => DnType::CustomDnType(vec![2, 5, 4, 17]),
            AttributeType::SerialNumber => DnType::CustomDnType(vec![2, 5, 4, 5]),
        }
    }
}

/// Native X.501 name of a certificate's subject or issuer.
///
/// Multi-valued attributes keep their order; repeated values of one type are
/// independent attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PkixName {
    pub country: Vec<String>,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub locality: Vec<String>,
    pub province: Vec<String>,
    pub street_address: Vec<String>,
    pub postal_code: Vec<String>,
    pub serial_number: String,
    pub common_name: String,
}

impl PkixName {
    /// Name with only the common name set
    pub fn with_common_name(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }

    /// Whether no attribute is set
    pub fn is_empty(&self) -> bool {
        self.attributes().is_empty()
    }

    /// Flatten the name into `(type, value)` pairs in encoding order
    pub fn attributes(&self) -> Vec<(AttributeType, &str)> {
        let multi = [
            (AttributeType::Country, &self.country),
            (AttributeType::Organization, &self.organization),
            (AttributeType::OrganizationalUnit, &self.organizational_unit),
            (AttributeType::Locality, &self.locality),
            (AttributeType::Province, &self.province),
            (AttributeType::StreetAddress, &self.street_address),
            (AttributeType::PostalCode, &self.postal_code),
        ];

        let mut attrs: Vec<(AttributeType, &str)> = multi
            .into_iter()
            .flat_map(|(ty, values)| values.iter().map(move |v| (ty, v.as_str())))
            .collect();

        if !self.serial_number.is_empty() {
            attrs.push((AttributeType::SerialNumber, &self.serial_number));
        }
        if !self.common_name.is_empty() {
            attrs.push((AttributeType::CommonName, &self.common_name));
        }
        attrs
    }

    /// Build the rcgen distinguished name used for DER encoding.
    ///
    /// rcgen keeps a single value per attribute type, so a name repeating an
    /// attribute cannot be encoded and is rejected.
    pub(crate) fn to_distinguished_name(&self) -> Result<DistinguishedName> {
        let mut dn = DistinguishedName::new();
        let mut seen: Vec<AttributeType> = Vec::new();

        for (ty, value) in self.attributes() {
            if seen.contains(&ty) {
                warn!(
                    "Cannot encode repeated {} attribute '{}' in {}",
                    ty.short_name(),
                    value,
                    self
                );
                return Err(Error::InvalidArgument(format!(
                    "name '{}' repeats the {} attribute, which cannot be encoded",
                    self,
                    ty.short_name()
                )));
            }
            seen.push(ty);
            dn.push(ty.dn_type(), value);
        }
        Ok(dn)
    }
}

impl fmt::Display for PkixName {
    /// RFC 4514 string form, most specific attribute first
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .attributes()
            .iter()
            .rev()
            .map(|(ty, value)| format!("{}={}", ty.short_name(), escape_rdn_value(value)))
            .collect();
        write!(f, "{}", rendered.join(","))
    }
}

fn escape_rdn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);

    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Key usage bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyUsage {
    DigitalSignature,
    ContentCommitment,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    CertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

impl From<KeyUsage> for KeyUsagePurpose {
    fn from(usage: KeyUsage) -> Self {
        match usage {
            KeyUsage::DigitalSignature => KeyUsagePurpose::DigitalSignature,
            KeyUsage::ContentCommitment => KeyUsagePurpose::ContentCommitment,
            KeyUsage::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
            KeyUsage::DataEncipherment => KeyUsagePurpose::DataEncipherment,
            KeyUsage::KeyAgreement => KeyUsagePurpose::KeyAgreement,
            KeyUsage::CertSign => KeyUsagePurpose::KeyCertSign,
            KeyUsage::CrlSign => KeyUsagePurpose::CrlSign,
            KeyUsage::EncipherOnly => KeyUsagePurpose::EncipherOnly,
            KeyUsage::DecipherOnly => KeyUsagePurpose::DecipherOnly,
        }
    }
}

/// Extended key usage purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtKeyUsage {
    Any,
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl From<ExtKeyUsage> for ExtendedKeyUsagePurpose {
    fn from(usage: ExtKeyUsage) -> Self {
        match usage {
            ExtKeyUsage::Any => ExtendedKeyUsagePurpose::Any,
            ExtKeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            ExtKeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            ExtKeyUsage::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
            ExtKeyUsage::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
            ExtKeyUsage::TimeStamping => ExtendedKeyUsagePurpose::TimeStamping,
            ExtKeyUsage::OcspSigning => ExtendedKeyUsagePurpose::OcspSigning,
        }
    }
}

/// X.509 certificate, either an unsigned template or a signed certificate.
///
/// A template is what callers hand to a CAS operation; backends fill in the
/// serial number, validity window, issuer and `raw` when they sign it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Certificate {
    /// Big-endian serial number, empty on templates
    pub serial_number: Vec<u8>,
    pub subject: PkixName,
    pub issuer: PkixName,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    /// Basic constraints CA flag
    pub is_ca: bool,
    pub max_path_len: Option<u8>,
    pub key_usage: Vec<KeyUsage>,
    pub ext_key_usage: Vec<ExtKeyUsage>,
    pub dns_names: Vec<String>,
    pub email_addresses: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub uris: Vec<String>,
    /// Public key being certified
    pub public_key: Option<PublicKey>,
    /// Algorithm the issuer signed with
    pub signature_algorithm: SignatureAlgorithm,
    /// DER encoding, empty until signed
    pub raw: Vec<u8>,
}

impl Certificate {
    /// Template with the given subject
    pub fn template(subject: &Subject) -> Self {
        let mut cert = Self::default();
        subject.set(&mut cert);
        cert
    }

    /// Subject in its JSON-friendly form
    pub fn subject_name(&self) -> Subject {
        Subject::new(&self.subject)
    }

    /// Issuer in its JSON-friendly form
    pub fn issuer_name(&self) -> Issuer {
        Issuer::new(&self.issuer)
    }

    /// Whether a backend has signed this certificate
    pub fn is_signed(&self) -> bool {
        !self.raw.is_empty()
    }

    /// Lower-case hex serial number
    pub fn serial_hex(&self) -> String {
        self.serial_number.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// PEM encoding of the signed certificate
    pub fn to_pem(&self) -> Result<String> {
        if !self.is_signed() {
            return Err(Error::InvalidArgument(
                "certificate template has not been signed".into(),
            ));
        }
        Ok(pem::encode(&pem::Pem::new("CERTIFICATE", self.raw.clone())))
    }

    /// Translate into rcgen parameters for signing
    pub(crate) fn to_params(&self) -> Result<CertificateParams> {
        let mut params = CertificateParams::default();
        params.distinguished_name = self.subject.to_distinguished_name()?;

        if !self.serial_number.is_empty() {
            params.serial_number = Some(SerialNumber::from_slice(&self.serial_number));
        }
        if let Some(not_before) = self.not_before {
            params.not_before = to_offset_date_time(not_before)?;
        }
        if let Some(not_after) = self.not_after {
            params.not_after = to_offset_date_time(not_after)?;
        }

        params.is_ca = match (self.is_ca, self.max_path_len) {
            (true, Some(len)) => IsCa::Ca(BasicConstraints::Constrained(len)),
            (true, None) => IsCa::Ca(BasicConstraints::Unconstrained),
            (false, _) => IsCa::ExplicitNoCa,
        };

        params.key_usages = self.key_usage.iter().copied().map(Into::into).collect();
        params.extended_key_usages = self.ext_key_usage.iter().copied().map(Into::into).collect();

        let mut sans = Vec::new();
        for dns in &self.dns_names {
            sans.push(SanType::DnsName(ia5(dns)?));
        }
        for email in &self.email_addresses {
            sans.push(SanType::Rfc822Name(ia5(email)?));
        }
        for ip in &self.ip_addresses {
            sans.push(SanType::IpAddress(*ip));
        }
        for uri in &self.uris {
            sans.push(SanType::URI(ia5(uri)?));
        }
        params.subject_alt_names = sans;

        Ok(params)
    }
}

fn ia5(value: &str) -> Result<Ia5String> {
    Ia5String::try_from(value)
        .map_err(|e| Error::InvalidArgument(format!("invalid IA5 string '{}': {}", value, e)))
}

fn to_offset_date_time(t: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(t.timestamp())
        .map_err(|e| Error::InvalidArgument(format!("timestamp {} out of range: {}", t, e)))
}
