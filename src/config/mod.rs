// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const PROD: &str = "prod";
pub const DEV: &str = "dev";
pub const TEST: &str = "test";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(rename = "listlru")]
    pub listlru: ListLruBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListLruBox {
    pub env: String,
    pub logs: Option<Logs>,
    #[serde(default)]
    pub lru: LruConfig,
    #[serde(default)]
    pub stress: Stress,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

/// Shape of one list instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LruConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_nodes")]
    pub nodes: usize,
    #[serde(default)]
    pub memcg_aware: bool,
    pub shrinker_id: Option<usize>,
}

impl Default for LruConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            nodes: default_nodes(),
            memcg_aware: false,
            shrinker_id: None,
        }
    }
}

fn default_name() -> String {
    "list_lru".to_string()
}

fn default_nodes() -> usize {
    1
}

/// Stress driver workload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Stress {
    /// Worker threads; 0 means one per CPU.
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_memcgs")]
    pub memcgs: usize,
    #[serde(rename = "items_per_thread", default = "default_items_per_thread")]
    pub items_per_thread: usize,
    #[serde(rename = "walk_budget", default = "default_walk_budget")]
    pub walk_budget: usize,
    #[serde(with = "humantime_serde", default = "default_duration")]
    pub duration: Duration,
}

impl Default for Stress {
    fn default() -> Self {
        Self {
            threads: 0,
            memcgs: default_memcgs(),
            items_per_thread: default_items_per_thread(),
            walk_budget: default_walk_budget(),
            duration: default_duration(),
        }
    }
}

fn default_memcgs() -> usize {
    8
}

fn default_items_per_thread() -> usize {
    10_000
}

fn default_walk_budget() -> usize {
    128
}

fn default_duration() -> Duration {
    Duration::from_secs(5)
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Resolve absolute path
        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        // Read file
        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        Self::from_yaml(&data).with_context(|| format!("load config from {:?}", abs_path))
    }

    /// Parses and validates configuration from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data).context("unmarshal yaml")?;

        if cfg.listlru.lru.nodes == 0 {
            anyhow::bail!("lru.nodes must be at least 1");
        }
        if cfg.listlru.lru.memcg_aware && cfg.listlru.stress.memcgs == 0 {
            anyhow::bail!("stress.memcgs must be at least 1 for a memcg-aware lru");
        }

        Ok(cfg)
    }

    pub fn logs(&self) -> Option<&Logs> {
        self.listlru.logs.as_ref()
    }

    pub fn lru(&self) -> &LruConfig {
        &self.listlru.lru
    }

    pub fn stress(&self) -> &Stress {
        &self.listlru.stress
    }

    pub fn is_prod(&self) -> bool {
        self.listlru.env == PROD
    }

    pub fn is_dev(&self) -> bool {
        self.listlru.env == DEV
    }

    pub fn is_test(&self) -> bool {
        self.listlru.env == TEST
    }
}

#[cfg(test)]
pub mod test_config;
