use anyhow::{Context, Result};
use cas_core::{
    cas::{CreateCertificateRequest, GetCertificateAuthorityRequest},
    config::Settings,
    create_cas,
    kms::{CreateKeyRequest, KeyManager, SoftKms},
    telemetry,
    x509::{Certificate, Name, Subject},
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Issue a leaf certificate for the subject given as the first argument
/// (a bare common name or a JSON/YAML name object) and print it as PEM.
#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    settings.validate()?;

    // 2. Initialize logging
    telemetry::init_logging(&settings)?;
    info!("Starting {}...", settings.general.app_name);
    let settings = Arc::new(settings);

    // 3. Create the CAS backend
    let cas = create_cas(settings.clone()).await?;
    info!("CAS backend '{}' ready", settings.cas.backend);

    // 4. Decode the requested subject
    let subject_arg = std::env::args().nth(1).unwrap_or_else(|| "localhost".to_string());
    let subject = Subject::from(
        Name::from_yaml(&subject_arg).context("Failed to decode certificate subject")?,
    );

    // 5. Generate the leaf key and template
    let kms = SoftKms::with_default_algorithm(settings.cas.default_key_algorithm);
    let key = kms
        .create_key(&CreateKeyRequest {
            name: subject.common_name.clone(),
            ..CreateKeyRequest::default()
        })
        .await?;

    let mut template = Certificate::template(&subject);
    if !subject.common_name.is_empty() {
        template.dns_names = vec![subject.common_name.clone()];
    }
    template.public_key = Some(key.public_key.clone());

    // 6. Issue the certificate
    let response = cas
        .create_certificate(&CreateCertificateRequest {
            template,
            lifetime: settings.cas.default_lifetime(),
            backdate: settings.cas.default_backdate(),
            request_id: Uuid::new_v4().to_string(),
        })
        .await?;
    info!(
        "Issued certificate {} for {}",
        response.certificate.serial_hex(),
        response.certificate.subject
    );

    // 7. Look up the root of the issuing authority
    let root = cas
        .get_certificate_authority(&GetCertificateAuthorityRequest {
            name: settings.cas.intermediate.name.clone(),
        })
        .await?;

    print!("{}", response.certificate.to_pem()?);
    for cert in &response.certificate_chain {
        print!("{}", cert.to_pem()?);
    }
    print!("{}", key.private_key.to_pem());
    info!("Root certificate:\n{}", root.root_certificate.to_pem()?);

    Ok(())
}
