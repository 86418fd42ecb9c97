use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::InvalidIdentifier;

static CVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CVE-\d{4}-\d{4,}$").expect("valid CVE pattern"));

/// A validated `CVE-YYYY-NNNN...` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CveId(String);

impl CveId {
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        if is_valid_cve_id(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CveId {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CveId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn is_valid_cve_id(raw: &str) -> bool {
    CVE_PATTERN.is_match(raw)
}

#[cfg(test)]
mod tests {
    use super::{is_valid_cve_id, CveId};

    #[test]
    fn accepts_four_or_more_sequence_digits() {
        assert!(is_valid_cve_id("CVE-2021-44228"));
        assert!(is_valid_cve_id("CVE-1999-0001"));
        assert!(is_valid_cve_id("CVE-2024-1234567"));
    }

    #[test]
    fn rejects_malformed_ids() {
        for raw in [
            "",
            "cve-2021-44228",
            "CVE-21-44228",
            "CVE-2021-123",
            " CVE-2021-44228",
            "CVE-2021-44228 ",
            "CVE-2021-44228\n",
            "GHSA-2021-44228",
        ] {
            assert!(!is_valid_cve_id(raw), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn parse_keeps_the_original_text() {
        let id = CveId::parse("CVE-2023-0042").unwrap();
        assert_eq!(id.as_str(), "CVE-2023-0042");
        assert_eq!(id.to_string(), "CVE-2023-0042");
        assert_eq!(
            CveId::parse("CVE-x").unwrap_err().to_string(),
            "invalid CVE identifier: CVE-x"
        );
    }
}
