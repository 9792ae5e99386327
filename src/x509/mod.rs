//! Backend-neutral X.509 vocabulary shared by every CAS backend
//!
//! `name` holds the JSON-friendly distinguished-name model, `certificate` the
//! native certificate template and `keys` the key material handed out by
//! authority creation.

pub mod certificate;
pub mod keys;
pub mod name;

pub use certificate::{Certificate, ExtKeyUsage, KeyUsage, PkixName};
pub use keys::{KeyMaterial, PrivateKey, PublicKey, Signer};
pub use name::{Issuer, MultiString, Name, Subject};
