//! Fixed subject fields of issued certificates

use rcgen::{DistinguishedName, DnType};

/// Subject country
pub const COUNTRY: &str = "NZ";
/// Subject state or province
pub const STATE: &str = "AKL";
/// Subject organization
pub const ORGANIZATION: &str = "ACME Inc.";

/// Subject of a leaf: the fixed fields plus the primary domain as CN
#[derive(Debug, Clone, Copy)]
pub struct LeafSubject<'a> {
    common_name: &'a str,
}

impl<'a> LeafSubject<'a> {
    /// Fixed fields with `common_name` as CN
    pub fn new(common_name: &'a str) -> Self {
        Self { common_name }
    }

    /// The CN
    pub fn common_name(&self) -> &'a str {
        self.common_name
    }

    /// `-subj` argument, with `/`, `+` and `\` in the CN escaped
    pub fn openssl_subject(&self) -> String {
        let mut cn = String::with_capacity(self.common_name.len());
        for ch in self.common_name.chars() {
            if matches!(ch, '/' | '+' | '\\') {
                cn.push('\\');
            }
            cn.push(ch);
        }
        format!("/C={COUNTRY}/ST={STATE}/O={ORGANIZATION}/CN={cn}")
    }

    /// Same subject as an rcgen name
    pub fn distinguished_name(&self) -> DistinguishedName {
        distinguished_name(self.common_name)
    }
}

/// Distinguished name with the fixed fields and the given CN
pub(crate) fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, COUNTRY);
    dn.push(DnType::StateOrProvinceName, STATE);
    dn.push(DnType::OrganizationName, ORGANIZATION);
    dn.push(DnType::CommonName, common_name);
    dn
}
