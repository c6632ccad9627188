//! Object-store credential resolution.
//!
//! Sources are tried in order and the first that yields credentials wins:
//! a named profile, then a properties file holding `accessKey` and
//! `secretKey`, then the ambient default chain (environment, shared config,
//! instance metadata).

use aws_config::profile::ProfileFileCredentialsProvider;
use aws_credential_types::Credentials;
use aws_credential_types::provider::ProvideCredentials;
use std::path::Path;
use tracing::debug;

/// Where the object-store credentials came from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Profile(String),
    PropertiesFile(Credentials),
    Ambient,
}

/// Resolve credentials in priority order.
pub async fn resolve(profile: Option<&str>, properties_file: &Path) -> CredentialSource {
    if let Some(name) = profile {
        let provider = ProfileFileCredentialsProvider::builder()
            .profile_name(name)
            .build();
        match provider.provide_credentials().await {
            Ok(_) => {
                debug!(profile = %name, "Using credentials profile");
                return CredentialSource::Profile(name.to_string());
            }
            Err(e) => debug!(profile = %name, error = %e, "Credentials profile unavailable"),
        }
    }

    match std::fs::read_to_string(properties_file) {
        Ok(contents) => {
            if let Some(credentials) = from_properties(&contents) {
                debug!(path = %properties_file.display(), "Reading access key from properties file");
                return CredentialSource::PropertiesFile(credentials);
            }
            debug!(path = %properties_file.display(), "Properties file has no access key pair");
        }
        Err(_) => {
            debug!(path = %properties_file.display(), "Could not load properties file, using ambient credentials");
        }
    }

    CredentialSource::Ambient
}

/// Build credentials from a properties file body.
pub fn from_properties(contents: &str) -> Option<Credentials> {
    let props = match java_properties::read(contents.as_bytes()) {
        Ok(props) => props,
        Err(e) => {
            debug!(error = %e, "Malformed properties file");
            return None;
        }
    };
    let access_key = props.get("accessKey").filter(|v| !v.is_empty())?;
    let secret_key = props.get("secretKey").filter(|v| !v.is_empty())?;
    Some(Credentials::new(
        access_key.clone(),
        secret_key.clone(),
        None,
        None,
        "kiln-properties-file",
    ))
}
