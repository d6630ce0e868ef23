//! Configuration file

use anyhow::Context as _;
use l2bench_dataplane::{BenchConfig, ForwarderConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk configuration. Every section is optional; command-line flags override it.
///
/// ```json
/// {
///   "interfaces": ["enp3s0f0", "enp3s0f1"],
///   "pingpong": { "min_bytes": 64, "max_bytes": 65536, "iterations": 1000 },
///   "forward": { "pin_cores": true, "first_core": 2 }
/// }
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub interfaces: Vec<String>,
    pub pingpong: BenchConfig,
    pub forward: ForwarderConfig,
}

impl FileConfig {
    /// Load from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_optional(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let config = Self::load(path)?;
                tracing::debug!(path = %path.display(), "loaded config");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2bench_dataplane::Role;

    #[test]
    fn test_sections_are_optional() {
        let config: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(config.interfaces.is_empty());
        assert_eq!(config.pingpong.iterations, 100);
        assert_eq!(config.forward.burst_size, 32);
    }

    #[test]
    fn test_load_from_disk() {
        let path = std::env::temp_dir().join(format!("l2bench-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"interfaces": ["eth0"], "pingpong": {"role": "responder", "iterations": 5}}"#,
        )
        .unwrap();

        let config = FileConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.interfaces, vec!["eth0".to_string()]);
        assert_eq!(config.pingpong.role, Role::Responder);
        assert_eq!(config.pingpong.iterations, 5);
        assert!(FileConfig::load(&path).is_err());
    }
}
