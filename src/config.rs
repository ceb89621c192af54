// Analysis configuration
//
// Every field has a default, so a config file only needs the keys it changes:
//
//   address_tracking = false
//   batch_threads = 8
//
//   [inter_process_matching]
//   strategy = "auto"
//   tolerance_ns = 1000000

use crate::error::{Result, TraceError};
use crate::matcher::MatchStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How inter-process publishes are matched to callback starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum InterProcessMatching {
    /// Exact middleware source stamp
    #[default]
    SourceStamp,
    /// Earliest unconsumed publish within `tolerance_ns` before the callback
    Proximity { tolerance_ns: u64 },
    /// Source stamp when the take carried one, proximity otherwise
    Auto { tolerance_ns: u64 },
}

impl InterProcessMatching {
    pub fn strategy(self) -> MatchStrategy {
        match self {
            InterProcessMatching::SourceStamp => MatchStrategy::Identity,
            InterProcessMatching::Proximity { tolerance_ns } => {
                MatchStrategy::Proximity { tolerance_ns }
            }
            InterProcessMatching::Auto { tolerance_ns } => {
                MatchStrategy::IdentityOrProximity { tolerance_ns }
            }
        }
    }

    fn tolerance_ns(self) -> Option<u64> {
        match self {
            InterProcessMatching::SourceStamp => None,
            InterProcessMatching::Proximity { tolerance_ns }
            | InterProcessMatching::Auto { tolerance_ns } => Some(tolerance_ns),
        }
    }
}

/// Knobs of the record composers
///
/// # Example
/// ```
/// use rclflow::config::{AnalysisConfig, InterProcessMatching};
///
/// let config = AnalysisConfig::from_toml_str("batch_threads = 2").unwrap();
/// assert_eq!(config.batch_threads, 2);
/// assert_eq!(config.inter_process_matching, InterProcessMatching::SourceStamp);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub inter_process_matching: InterProcessMatching,

    /// Follow intra-process buffer copies back to the published buffer
    pub address_tracking: bool,

    /// Worker threads for batch composition
    pub batch_threads: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            inter_process_matching: InterProcessMatching::SourceStamp,
            address_tracking: true,
            batch_threads: 4,
        }
    }
}

impl AnalysisConfig {
    /// Exact matching only; copied intra-process buffers are not followed
    pub fn strict() -> Self {
        Self {
            inter_process_matching: InterProcessMatching::SourceStamp,
            address_tracking: false,
            ..Self::default()
        }
    }

    /// Falls back to 1ms proximity matching when source stamps are missing
    pub fn permissive() -> Self {
        Self {
            inter_process_matching: InterProcessMatching::Auto {
                tolerance_ns: 1_000_000,
            },
            address_tracking: true,
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| TraceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_threads == 0 {
            return Err(TraceError::Config(
                "batch_threads must be at least 1".to_string(),
            ));
        }

        if self.inter_process_matching.tolerance_ns() == Some(0) {
            return Err(TraceError::Config(
                "tolerance_ns must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
