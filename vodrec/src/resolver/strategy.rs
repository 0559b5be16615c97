use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::Error;

/// Which manifest sources are consulted, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveStrategy {
    /// Container-driven recovery only.
    #[default]
    Recovery,
    /// GraphQL metadata only.
    Metadata,
    /// Metadata first, recovery on any metadata error.
    MetadataThenRecovery,
}

impl ResolveStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::Metadata => "metadata",
            Self::MetadataThenRecovery => "metadata-then-recovery",
        }
    }

    pub fn uses_metadata(&self) -> bool {
        matches!(self, Self::Metadata | Self::MetadataThenRecovery)
    }

    pub fn uses_recovery(&self) -> bool {
        matches!(self, Self::Recovery | Self::MetadataThenRecovery)
    }
}

impl fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolveStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recovery" => Ok(Self::Recovery),
            "metadata" => Ok(Self::Metadata),
            "metadata-then-recovery" | "metadata_then_recovery" => Ok(Self::MetadataThenRecovery),
            other => Err(Error::config(format!(
                "unknown resolve strategy {other:?} (expected recovery, metadata or metadata-then-recovery)"
            ))),
        }
    }
}
