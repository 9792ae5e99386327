//! CAS Core - Certificate Authority Service contract
//!
//! Provides the backend-neutral certificate authority interface, the X.509
//! distinguished-name model shared by its requests, and a software backend

// Foundational layer
pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

// Core layer
pub mod kms;
pub mod x509;

// Service layer
pub mod cas;

// Public key types
pub use crate::cas::{create_cas, CertificateAuthorityService, SoftCas};
pub use crate::config::Settings;
pub use crate::error::{Error, ErrorKind};
pub use crate::types::Result;
pub use crate::x509::{Certificate, Issuer, KeyMaterial, MultiString, Name, Subject};
