use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::LoaderError;

/// Host runtime version, as reported by the engine (`v14.17.0`).
///
/// Only major and minor take part in patch-recipe selection; the patch
/// component is kept for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `vMAJOR.MINOR.PATCH`. The leading `v` and the trailing
    /// components are optional; pre-release suffixes are ignored.
    pub fn parse(input: &str) -> Result<Self, LoaderError> {
        let trimmed = input.trim();
        let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let body = body.split(['-', '+']).next().unwrap_or_default();

        let mut parts = body.split('.');
        let mut next = |required: bool| -> Result<u32, LoaderError> {
            match parts.next() {
                Some(part) => part
                    .parse::<u32>()
                    .map_err(|_| LoaderError::InvalidVersion(input.to_string())),
                None if required => Err(LoaderError::InvalidVersion(input.to_string())),
                None => Ok(0),
            }
        };

        let major = next(true)?;
        let minor = next(false)?;
        let patch = next(false)?;
        Ok(Self::new(major, minor, patch))
    }
}

impl FromStr for EngineVersion {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_version() {
        let v = EngineVersion::parse("v14.17.3").unwrap();
        assert_eq!(v, EngineVersion::new(14, 17, 3));
    }

    #[test]
    fn test_parse_without_prefix_and_patch() {
        assert_eq!(EngineVersion::parse("8.9").unwrap(), EngineVersion::new(8, 9, 0));
        assert_eq!(EngineVersion::parse("v20").unwrap(), EngineVersion::new(20, 0, 0));
    }

    #[test]
    fn test_parse_prerelease() {
        let v = EngineVersion::parse("v21.0.0-nightly20231010").unwrap();
        assert_eq!(v, EngineVersion::new(21, 0, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(EngineVersion::parse("").is_err());
        assert!(EngineVersion::parse("vX.1").is_err());
        assert!(EngineVersion::parse("12.beta").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(EngineVersion::new(16, 4, 1).to_string(), "v16.4.1");
    }
}
