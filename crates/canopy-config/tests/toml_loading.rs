//! Integration tests for TOML configuration loading.
//!
//! Uses figment::Jail for safe, sandboxed env var manipulation.

use canopy_config::CanopyConfig;
use canopy_core::enums::{BackoffStrategy, EntityType};
use figment::{
    Figment, Jail,
    providers::{Env, Format, Serialized, Toml},
};
use pretty_assertions::assert_eq;

#[test]
fn loads_retry_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[retry]
max_retries = 5
backoff_strategy = "fixed"
base_delay_ms = 250
max_delay_ms = 5000
rate_limit_delay_ms = 30000
retry_permanent_errors = false
"#,
        )?;

        let config: CanopyConfig = Figment::from(Serialized::defaults(CanopyConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.backoff_strategy, BackoffStrategy::Fixed);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.retry.max_delay_ms, 5000);
        assert_eq!(config.retry.rate_limit_delay_ms, 30000);
        assert!(!config.retry.retry_permanent_errors);
        Ok(())
    });
}

#[test]
fn loads_sync_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[sync]
batch_size = 50
worker_concurrency = 8
poll_interval_ms = 250
claim_timeout_secs = 120
request_timeout_secs = 10
entity_types = ["location", "package"]

[database]
path = "/var/lib/canopy/canopy.db"
"#,
        )?;

        let config: CanopyConfig = Figment::from(Serialized::defaults(CanopyConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.sync.worker_concurrency, 8);
        assert_eq!(config.sync.poll_interval_ms, 250);
        assert_eq!(config.sync.claim_timeout_secs, 120);
        assert_eq!(config.sync.request_timeout_secs, 10);
        assert_eq!(
            config.sync.entity_types,
            vec![EntityType::Location, EntityType::Package]
        );
        assert_eq!(config.database.path, "/var/lib/canopy/canopy.db");
        Ok(())
    });
}

#[test]
fn loads_reconciliation_config_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[reconciliation]
ignore_case = false
ignored_fields = ["LastModified", "ArchivedDate"]
max_discrepancies_per_type = 10
"#,
        )?;

        let config: CanopyConfig = Figment::from(Serialized::defaults(CanopyConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert!(!config.reconciliation.ignore_case);
        assert_eq!(
            config.reconciliation.ignored_fields,
            vec!["LastModified".to_string(), "ArchivedDate".to_string()]
        );
        assert_eq!(config.reconciliation.max_discrepancies_per_type, 10);
        Ok(())
    });
}

#[test]
fn missing_sections_keep_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[general]
default_limit = 50
"#,
        )?;

        let config: CanopyConfig = Figment::from(Serialized::defaults(CanopyConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.general.default_limit, 50);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.sync.batch_size, 25);
        Ok(())
    });
}

#[test]
fn env_overrides_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[retry]
max_retries = 5
"#,
        )?;
        jail.set_env("CANOPY_RETRY__MAX_RETRIES", "9");

        let config: CanopyConfig = Figment::from(Serialized::defaults(CanopyConfig::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("CANOPY_").split("__"))
            .extract()?;

        assert_eq!(config.retry.max_retries, 9);
        Ok(())
    });
}

#[test]
fn project_config_is_picked_up_by_load() {
    Jail::expect_with(|jail| {
        jail.create_dir(".canopy")?;
        jail.create_file(
            ".canopy/config.toml",
            r#"
[sync]
batch_size = 7
"#,
        )?;

        let config = CanopyConfig::load().expect("config loads");
        assert_eq!(config.sync.batch_size, 7);
        Ok(())
    });
}

#[test]
fn invalid_backoff_strategy_fails_extraction() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[retry]
backoff_strategy = "linear"
"#,
        )?;

        let result: Result<CanopyConfig, _> =
            Figment::from(Serialized::defaults(CanopyConfig::default()))
                .merge(Toml::file("config.toml"))
                .extract();
        assert!(result.is_err());
        Ok(())
    });
}
