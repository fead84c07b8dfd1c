//! Targets configuration file
//!
//! A YAML file listing categories of kinds to watch, resolved through
//! discovery into concrete kinds:
//!
//! ```yaml
//! targets:
//!   - category: workloads
//!     kinds: [deployments.apps, statefulsets.apps]
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::client::ClusterClient;
use crate::error::Result;
use crate::object::{GroupKind, GroupResource};

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    targets: Vec<RawTarget>,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    kinds: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Target {
    pub category: Option<String>,
    pub kinds: Vec<GroupKind>,
}

#[derive(Debug, Clone, Default)]
pub struct TargetsConfig {
    pub targets: Vec<Target>,
}

/// Read the targets file, resolving each `resource.group` string to a kind
/// via discovery. Unresolvable kinds are skipped with a warning.
pub fn read_targets(client: &dyn ClusterClient, path: &Path) -> Result<TargetsConfig> {
    let raw: RawConfig = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;

    let mut targets = Vec::new();
    for target in raw.targets {
        let mut kinds = Vec::new();
        for spec in target.kinds {
            match client.resource_to_kind(&GroupResource::parse(&spec)) {
                Ok(kind) => kinds.push(kind),
                Err(e) => {
                    warn!(kind = %spec, error = %e, "failed to parse kind");
                    continue;
                }
            }
        }
        targets.push(Target {
            category: target.category,
            kinds,
        });
    }

    Ok(TargetsConfig { targets })
}
