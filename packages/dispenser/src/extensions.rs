//! Leaf extension profile and the per-request extension set

use std::path::Path;
use std::sync::Arc;

use rcgen::{CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose, SanType};
use serde::{Deserialize, Serialize};

use crate::error::{DispenserError, Result};

/// Key usage bits an issued leaf may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    /// `digitalSignature`
    DigitalSignature,
    /// `nonRepudiation` (content commitment)
    NonRepudiation,
    /// `keyEncipherment`
    KeyEncipherment,
    /// `dataEncipherment`
    DataEncipherment,
    /// `keyAgreement`
    KeyAgreement,
}

impl KeyUsage {
    fn openssl_name(self) -> &'static str {
        match self {
            Self::DigitalSignature => "digitalSignature",
            Self::NonRepudiation => "nonRepudiation",
            Self::KeyEncipherment => "keyEncipherment",
            Self::DataEncipherment => "dataEncipherment",
            Self::KeyAgreement => "keyAgreement",
        }
    }

    fn purpose(self) -> KeyUsagePurpose {
        match self {
            Self::DigitalSignature => KeyUsagePurpose::DigitalSignature,
            Self::NonRepudiation => KeyUsagePurpose::ContentCommitment,
            Self::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
            Self::DataEncipherment => KeyUsagePurpose::DataEncipherment,
            Self::KeyAgreement => KeyUsagePurpose::KeyAgreement,
        }
    }
}

/// Extended key usages an issued leaf may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedKeyUsage {
    /// TLS server authentication
    ServerAuth,
    /// TLS client authentication
    ClientAuth,
    /// Code signing
    CodeSigning,
    /// S/MIME
    EmailProtection,
}

impl ExtendedKeyUsage {
    fn openssl_name(self) -> &'static str {
        match self {
            Self::ServerAuth => "serverAuth",
            Self::ClientAuth => "clientAuth",
            Self::CodeSigning => "codeSigning",
            Self::EmailProtection => "emailProtection",
        }
    }

    fn purpose(self) -> ExtendedKeyUsagePurpose {
        match self {
            Self::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            Self::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            Self::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
            Self::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
        }
    }
}

/// Extension profile shared by every issued leaf, loaded once at startup.
///
/// ```toml
/// key_usage = ["digital_signature", "key_encipherment"]
/// extended_key_usage = ["server_auth"]
/// authority_key_identifier = true
/// basic_constraints_ca_false = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtensionTemplate {
    /// `keyUsage` bits, omitted when empty
    pub key_usage: Vec<KeyUsage>,
    /// `extendedKeyUsage` purposes, omitted when empty
    pub extended_key_usage: Vec<ExtendedKeyUsage>,
    /// Emit `authorityKeyIdentifier = keyid,issuer`
    pub authority_key_identifier: bool,
    /// Emit a critical `basicConstraints = CA:FALSE`
    pub basic_constraints_ca_false: bool,
}

impl Default for ExtensionTemplate {
    fn default() -> Self {
        Self {
            key_usage: vec![
                KeyUsage::DigitalSignature,
                KeyUsage::NonRepudiation,
                KeyUsage::KeyEncipherment,
                KeyUsage::DataEncipherment,
            ],
            extended_key_usage: vec![ExtendedKeyUsage::ServerAuth, ExtendedKeyUsage::ClientAuth],
            authority_key_identifier: true,
            basic_constraints_ca_false: true,
        }
    }
}

impl ExtensionTemplate {
    /// Parse a template from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DispenserError::Config(format!("Invalid extension template: {e}")))
    }

    /// Load a template file. A missing file is an error, not a default.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            DispenserError::Config(format!(
                "Failed to read extension template {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    fn openssl_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.authority_key_identifier {
            lines.push("authorityKeyIdentifier = keyid,issuer".to_string());
        }
        if self.basic_constraints_ca_false {
            lines.push("basicConstraints = critical, CA:FALSE".to_string());
        }
        if !self.extended_key_usage.is_empty() {
            let names: Vec<_> = self.extended_key_usage.iter().map(|u| u.openssl_name()).collect();
            lines.push(format!("extendedKeyUsage = {}", names.join(", ")));
        }
        if !self.key_usage.is_empty() {
            let names: Vec<_> = self.key_usage.iter().map(|u| u.openssl_name()).collect();
            lines.push(format!("keyUsage = {}", names.join(", ")));
        }
        lines
    }
}

/// DNS-type subject alternative names, in the order requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAltNames(Vec<String>);

impl SubjectAltNames {
    /// `None` when there are no names to carry
    pub fn dns(names: &[String]) -> Option<Self> {
        if names.is_empty() {
            None
        } else {
            Some(Self(names.to_vec()))
        }
    }

    /// Names in request order
    pub fn dns_names(&self) -> &[String] {
        &self.0
    }

    /// `DNS:a,DNS:b` as used on a `subjectAltName` config line
    pub fn to_openssl_value(&self) -> String {
        self.0
            .iter()
            .map(|name| format!("DNS:{name}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub(crate) fn to_san_types(&self) -> std::result::Result<Vec<SanType>, rcgen::Error> {
        self.0
            .iter()
            .map(|name| Ok(SanType::DnsName(name.clone().try_into()?)))
            .collect()
    }
}

/// Template plus the SAN list of one request.
///
/// With no SAN the set is inactive: nothing from it is applied to the leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSet {
    template: Arc<ExtensionTemplate>,
    san: Option<SubjectAltNames>,
}

impl ExtensionSet {
    /// Config section requested via `-reqexts` when building the CSR
    pub const REQUEST_SECTION: &'static str = "san_request";
    /// Config section applied via `-extensions` when signing
    pub const SIGNING_SECTION: &'static str = "SAN";

    /// Combine the shared template with the alternates of one request
    pub fn new(template: Arc<ExtensionTemplate>, alternate_domains: &[String]) -> Self {
        Self {
            template,
            san: SubjectAltNames::dns(alternate_domains),
        }
    }

    /// Whether a SAN extension will be requested and copied
    pub fn san_active(&self) -> bool {
        self.san.is_some()
    }

    /// SAN list, `None` without alternates
    pub fn subject_alt_names(&self) -> Option<&SubjectAltNames> {
        self.san.as_ref()
    }

    /// Shared leaf profile
    pub fn template(&self) -> &ExtensionTemplate {
        &self.template
    }

    /// Render the openssl `req`/`x509` config file for this request
    pub fn render_openssl_config(&self) -> String {
        let mut config = String::from("[ req ]\ndistinguished_name = req_distinguished_name\n\n[ req_distinguished_name ]\n");

        if let Some(san) = &self.san {
            let san_line = format!("subjectAltName = {}", san.to_openssl_value());

            config.push_str(&format!("\n[ {} ]\n{san_line}\n", Self::REQUEST_SECTION));

            config.push_str(&format!("\n[ {} ]\n", Self::SIGNING_SECTION));
            for line in self.template.openssl_lines() {
                config.push_str(&line);
                config.push('\n');
            }
            config.push_str(&san_line);
            config.push('\n');
        }

        config
    }

    /// Apply the set to rcgen parameters about to be signed
    pub(crate) fn apply_to(&self, params: &mut CertificateParams) -> std::result::Result<(), rcgen::Error> {
        let Some(san) = &self.san else {
            params.subject_alt_names.clear();
            params.key_usages.clear();
            params.extended_key_usages.clear();
            params.use_authority_key_identifier_extension = false;
            params.is_ca = IsCa::NoCa;
            return Ok(());
        };

        params.subject_alt_names = san.to_san_types()?;
        params.key_usages = self.template.key_usage.iter().map(|u| u.purpose()).collect();
        params.extended_key_usages = self
            .template
            .extended_key_usage
            .iter()
            .map(|u| u.purpose())
            .collect();
        params.use_authority_key_identifier_extension = self.template.authority_key_identifier;
        params.is_ca = if self.template.basic_constraints_ca_false {
            IsCa::ExplicitNoCa
        } else {
            IsCa::NoCa
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn inactive_set_renders_no_extension_sections() {
        let set = ExtensionSet::new(Arc::default(), &[]);
        assert!(!set.san_active());
        let config = set.render_openssl_config();
        assert!(config.contains("[ req ]"));
        assert!(!config.contains("[ SAN ]"));
        assert!(!config.contains("subjectAltName"));
    }

    #[test]
    fn active_set_renders_request_and_signing_sections() {
        let set = ExtensionSet::new(Arc::default(), &names(&["a.test", "b.test"]));
        let config = set.render_openssl_config();

        let expected_signing = "[ SAN ]\n\
            authorityKeyIdentifier = keyid,issuer\n\
            basicConstraints = critical, CA:FALSE\n\
            extendedKeyUsage = serverAuth, clientAuth\n\
            keyUsage = digitalSignature, nonRepudiation, keyEncipherment, dataEncipherment\n\
            subjectAltName = DNS:a.test,DNS:b.test\n";
        assert!(config.ends_with(expected_signing), "config was:\n{config}");
        assert!(config.contains("[ san_request ]\nsubjectAltName = DNS:a.test,DNS:b.test\n"));
    }

    #[test]
    fn template_parses_partial_toml() {
        let template = ExtensionTemplate::from_toml_str(
            "extended_key_usage = [\"server_auth\"]\nauthority_key_identifier = false\n",
        )
        .unwrap();
        assert_eq!(template.extended_key_usage, vec![ExtendedKeyUsage::ServerAuth]);
        assert!(!template.authority_key_identifier);
        assert_eq!(template.key_usage, ExtensionTemplate::default().key_usage);
    }

    #[test]
    fn template_rejects_unknown_usage() {
        let err = ExtensionTemplate::from_toml_str("key_usage = [\"key_cert_sign\"]").unwrap_err();
        assert!(matches!(err, DispenserError::Config(_)));
    }

    #[test]
    fn apply_clears_extensions_when_inactive() {
        let mut params = CertificateParams::new(vec!["stale.test".to_string()]).unwrap();
        params.key_usages.push(KeyUsagePurpose::DigitalSignature);
        ExtensionSet::new(Arc::default(), &[]).apply_to(&mut params).unwrap();
        assert!(params.subject_alt_names.is_empty());
        assert!(params.key_usages.is_empty());
    }

    proptest! {
        #[test]
        fn san_value_keeps_request_order(domains in prop::collection::vec("[a-z]{1,12}\\.test", 1..8)) {
            let san = SubjectAltNames::dns(&domains).unwrap();
            let expected: Vec<String> = domains.iter().map(|d| format!("DNS:{d}")).collect();
            prop_assert_eq!(san.to_openssl_value(), expected.join(","));
        }
    }
}
