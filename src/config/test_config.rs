use super::{Config, ListLruBox, LruConfig, Stress};
use std::time::Duration;

/// Creates a new test configuration.
pub fn new_test_config() -> Config {
    Config {
        listlru: ListLruBox {
            env: super::TEST.to_string(),
            logs: Some(super::Logs {
                level: Some("debug".to_string()),
            }),
            lru: LruConfig {
                name: "test_lru".to_string(),
                nodes: 2,
                memcg_aware: true,
                shrinker_id: Some(3),
            },
            stress: Stress {
                threads: 2,
                memcgs: 3,
                items_per_thread: 200,
                walk_budget: 16,
                duration: Duration::from_millis(50),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_test_env() {
        let cfg = new_test_config();
        assert!(cfg.is_test());
        assert!(!cfg.is_prod());
        assert_eq!(cfg.lru().nodes, 2);
    }

    #[test]
    fn test_from_yaml_applies_defaults() {
        let cfg = Config::from_yaml(
            r#"
listlru:
  env: dev
  lru:
    memcg_aware: true
"#,
        )
        .unwrap();

        assert!(cfg.is_dev());
        assert_eq!(cfg.lru().name, "list_lru");
        assert_eq!(cfg.lru().nodes, 1);
        assert!(cfg.lru().memcg_aware);
        assert_eq!(cfg.lru().shrinker_id, None);
        assert_eq!(cfg.stress().threads, 0);
        assert_eq!(cfg.stress().duration, Duration::from_secs(5));
    }

    #[test]
    fn test_from_yaml_parses_everything() {
        let cfg = Config::from_yaml(
            r#"
listlru:
  env: prod
  logs:
    level: warn
  lru:
    name: dentry
    nodes: 4
    memcg_aware: true
    shrinker_id: 7
  stress:
    threads: 3
    memcgs: 5
    items_per_thread: 100
    walk_budget: 32
    duration: 250ms
"#,
        )
        .unwrap();

        assert!(cfg.is_prod());
        assert_eq!(cfg.logs().and_then(|l| l.level.as_deref()), Some("warn"));
        assert_eq!(
            cfg.lru(),
            &LruConfig {
                name: "dentry".to_string(),
                nodes: 4,
                memcg_aware: true,
                shrinker_id: Some(7),
            }
        );
        assert_eq!(cfg.stress().memcgs, 5);
        assert_eq!(cfg.stress().walk_budget, 32);
        assert_eq!(cfg.stress().duration, Duration::from_millis(250));
    }

    #[test]
    fn test_from_yaml_rejects_zero_nodes() {
        let err = Config::from_yaml(
            r#"
listlru:
  env: dev
  lru:
    nodes: 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("nodes"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load("/nonexistent/listlru.cfg.yaml").is_err());
    }
}
