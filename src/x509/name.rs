//! JSON representation of the X.501 `Name` used in certificate subject and
//! issuer fields.
//!
//! A name decodes from either a bare string, taken as the common name, or a
//! structured object:
//!
//! ```json
//! "example.com"
//! {"commonName": "example.com", "organization": ["Acme", "Acme Sub"]}
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;
use crate::types::Result;
use crate::x509::certificate::{Certificate, PkixName};

/// Ordered list of values for a repeatable attribute.
///
/// Decodes from an array of strings, a single string, or `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MultiString(Vec<String>);

impl MultiString {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl Deref for MultiString {
    type Target = Vec<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MultiString {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<String>> for MultiString {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl From<&[&str]> for MultiString {
    fn from(values: &[&str]) -> Self {
        values.iter().map(|v| v.to_string()).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for MultiString {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'de> Deserialize<'de> for MultiString {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MultiStringVisitor;

        impl<'de> Visitor<'de> for MultiStringVisitor {
            type Value = MultiString;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or an array of strings")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Ok(MultiString(vec![v.to_string()]))
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(value) = seq.next_element::<String>()? {
                    values.push(value);
                }
                Ok(MultiString(values))
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(MultiString::new())
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(MultiString::new())
            }

            fn visit_some<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_any(self)
            }
        }

        deserializer.deserialize_any(MultiStringVisitor)
    }
}

/// X.501 distinguished name in its backend-neutral form
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    #[serde(skip_serializing_if = "MultiString::is_empty")]
    pub country: MultiString,
    #[serde(skip_serializing_if = "MultiString::is_empty")]
    pub organization: MultiString,
    #[serde(rename = "organizationUnit", skip_serializing_if = "MultiString::is_empty")]
    pub organizational_unit: MultiString,
    #[serde(skip_serializing_if = "MultiString::is_empty")]
    pub locality: MultiString,
    #[serde(skip_serializing_if = "MultiString::is_empty")]
    pub province: MultiString,
    #[serde(skip_serializing_if = "MultiString::is_empty")]
    pub street_address: MultiString,
    #[serde(skip_serializing_if = "MultiString::is_empty")]
    pub postal_code: MultiString,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub serial_number: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub common_name: String,
}

/// Structured form of [`Name`]; unknown keys are ignored
#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StructuredName {
    country: MultiString,
    organization: MultiString,
    #[serde(rename = "organizationUnit")]
    organizational_unit: MultiString,
    locality: MultiString,
    province: MultiString,
    street_address: MultiString,
    postal_code: MultiString,
    serial_number: String,
    common_name: String,
}

impl From<StructuredName> for Name {
    fn from(n: StructuredName) -> Self {
        Name {
            country: n.country,
            organization: n.organization,
            organizational_unit: n.organizational_unit,
            locality: n.locality,
            province: n.province,
            street_address: n.street_address,
            postal_code: n.postal_code,
            serial_number: n.serial_number,
            common_name: n.common_name,
        }
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NameVisitor;

        impl<'de> Visitor<'de> for NameVisitor {
            type Value = Name;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a common name string or a name object")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Ok(Name::with_common_name(v))
            }

            fn visit_map<A>(self, map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let structured =
                    StructuredName::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(structured.into())
            }
        }

        deserializer.deserialize_any(NameVisitor)
    }
}

impl Name {
    /// Name carrying only a common name
    pub fn with_common_name(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }

    /// Decode a name from JSON, accepting the bare-string shorthand
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| Error::Malformed(format!("error decoding json: {}", e)))
    }

    /// Decode a name from YAML, accepting the bare-string shorthand
    pub fn from_yaml(data: &str) -> Result<Self> {
        serde_yaml::from_str(data).map_err(|e| Error::Malformed(format!("error decoding yaml: {}", e)))
    }

    /// Encode as a JSON object
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Malformed(format!("error encoding json: {}", e)))
    }

    fn to_pkix(&self) -> PkixName {
        PkixName {
            country: self.country.to_vec(),
            organization: self.organization.to_vec(),
            organizational_unit: self.organizational_unit.to_vec(),
            locality: self.locality.to_vec(),
            province: self.province.to_vec(),
            street_address: self.street_address.to_vec(),
            postal_code: self.postal_code.to_vec(),
            serial_number: self.serial_number.clone(),
            common_name: self.common_name.clone(),
        }
    }
}

impl From<&PkixName> for Name {
    fn from(n: &PkixName) -> Self {
        Name {
            country: n.country.clone().into(),
            organization: n.organization.clone().into(),
            organizational_unit: n.organizational_unit.clone().into(),
            locality: n.locality.clone().into(),
            province: n.province.clone().into(),
            street_address: n.street_address.clone().into(),
            postal_code: n.postal_code.clone().into(),
            serial_number: n.serial_number.clone(),
            common_name: n.common_name.clone(),
        }
    }
}

impl From<&Name> for PkixName {
    fn from(n: &Name) -> Self {
        n.to_pkix()
    }
}

/// Subject of a certificate
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(Name);

impl Subject {
    /// Read a subject from a certificate's native name
    pub fn new(name: &PkixName) -> Self {
        Self(Name::from(name))
    }

    /// Write this subject onto the certificate
    pub fn set(&self, cert: &mut Certificate) {
        cert.subject = self.0.to_pkix();
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Name::from_json(data).map(Self)
    }

    pub fn into_name(self) -> Name {
        self.0
    }
}

impl From<Name> for Subject {
    fn from(name: Name) -> Self {
        Self(name)
    }
}

impl Deref for Subject {
    type Target = Name;

    fn deref(&self) -> &Name {
        &self.0
    }
}

impl DerefMut for Subject {
    fn deref_mut(&mut self) -> &mut Name {
        &mut self.0
    }
}

/// Issuer of a certificate
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Issuer(Name);

impl Issuer {
    /// Read an issuer from a certificate's native name
    pub fn new(name: &PkixName) -> Self {
        Self(Name::from(name))
    }

    /// Write this issuer onto the certificate
    pub fn set(&self, cert: &mut Certificate) {
        cert.issuer = self.0.to_pkix();
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Name::from_json(data).map(Self)
    }

    pub fn into_name(self) -> Name {
        self.0
    }
}

impl From<Name> for Issuer {
    fn from(name: Name) -> Self {
        Self(name)
    }
}

impl Deref for Issuer {
    type Target = Name;

    fn deref(&self) -> &Name {
        &self.0
    }
}

impl DerefMut for Issuer {
    fn deref_mut(&mut self) -> &mut Name {
        &mut self.0
    }
}
