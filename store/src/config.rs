//! Store configuration

use serde::{Deserialize, Serialize};

/// What to do when the destination holds a file that is not a readable store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptStorePolicy {
    /// Abort with `MergeError::CorruptExistingStore` and leave the file alone
    #[default]
    Fail,
    /// Treat the unreadable file as empty and overwrite it
    Discard,
}

impl std::str::FromStr for CorruptStorePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(CorruptStorePolicy::Fail),
            "discard" => Ok(CorruptStorePolicy::Discard),
            _ => anyhow::bail!("Invalid corrupt store policy: {}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Handling of an existing destination file that fails to decode
    pub on_corrupt: CorruptStorePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            on_corrupt: std::env::var("COVFETCH_ON_CORRUPT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_str() {
        assert_eq!("fail".parse::<CorruptStorePolicy>().unwrap(), CorruptStorePolicy::Fail);
        assert_eq!(
            "Discard".parse::<CorruptStorePolicy>().unwrap(),
            CorruptStorePolicy::Discard
        );
        assert!("overwrite".parse::<CorruptStorePolicy>().is_err());
    }

    #[test]
    fn test_policy_serde_names() {
        let json = serde_json::to_string(&CorruptStorePolicy::Discard).unwrap();
        assert_eq!(json, "\"discard\"");
    }
}
