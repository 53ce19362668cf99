use crate::error::PortalError;
use std::fmt;
use std::str::FromStr;

/// Dotted numeric schema version such as `1.0.2`.
///
/// Components compare numerically left to right. When one version is a
/// prefix of the other the shorter one sorts first, so `1.0 < 1.0.0`, the
/// same answer the host's `version_compare` gives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion {
    parts: Vec<u64>,
}

impl SchemaVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            parts: vec![major, minor, patch],
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PortalError::InvalidVersion(s.to_string()));
        }
        let parts = trimmed
            .split('.')
            .map(|p| {
                p.parse::<u64>()
                    .map_err(|_| PortalError::InvalidVersion(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parts })
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}
