//! Configuration management for the courier binary.

use crate::{CoreError, CoreResult, Paths};
use courier_crawler::CrawlerConfig;
use courier_domain::{Clock, EventFactory, Topic, UuidGenerator};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVEL_ENV: &str = "COURIER_LOG_LEVEL";
const QUARANTINED_TOPICS_ENV: &str = "COURIER_QUARANTINED_TOPICS";

/// Crawler tuning as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub subscriber_timeout_ms: u64,
    pub max_concurrent_events: usize,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        let defaults = CrawlerConfig::default();
        Self {
            batch_size: defaults.batch_size,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            subscriber_timeout_ms: defaults.subscriber_timeout.as_millis() as u64,
            max_concurrent_events: defaults.max_concurrent_events,
        }
    }
}

impl From<&CrawlerSettings> for CrawlerConfig {
    fn from(settings: &CrawlerSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            subscriber_timeout: Duration::from_millis(settings.subscriber_timeout_ms),
            max_concurrent_events: settings.max_concurrent_events,
        }
    }
}

/// Main courier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// SQLite file; `<base_dir>/courier.db` when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Topics whose new events are stored quarantined.
    #[serde(default)]
    pub quarantined_topics: Vec<Topic>,
    #[serde(default)]
    pub crawler: CrawlerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            database_path: None,
            quarantined_topics: Vec::new(),
            crawler: CrawlerSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from `paths`, falling back to defaults, then
    /// apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `COURIER_LOG_LEVEL` and `COURIER_QUARANTINED_TOPICS` as seen
    /// through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CoreResult<()> {
        if let Some(log_level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_level = log_level.trim().to_string();
        }
        if let Some(raw) = lookup(QUARANTINED_TOPICS_ENV) {
            self.quarantined_topics = parse_topic_list(&raw)?;
        }
        Ok(())
    }

    /// Quarantine policy handed to the event factory.
    pub fn quarantine_set(&self) -> HashSet<Topic> {
        self.quarantined_topics.iter().copied().collect()
    }

    /// Event factory that quarantines the configured topics.
    pub fn event_factory(&self, clock: Arc<dyn Clock>, uuids: Arc<dyn UuidGenerator>) -> EventFactory {
        EventFactory::new(clock, uuids, self.quarantine_set())
    }

    pub fn crawler_config(&self) -> CrawlerConfig {
        CrawlerConfig::from(&self.crawler)
    }

    /// Resolved database location.
    pub fn database_file(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }
}

/// Parse a comma-separated list of topic names. Blank entries are ignored.
fn parse_topic_list(raw: &str) -> CoreResult<Vec<Topic>> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            name.parse::<Topic>()
                .map_err(|e| CoreError::Config(format!("{QUARANTINED_TOPICS_ENV}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_domain::{
        AgencyPayload, CustomClock, EventPayload, FormEstablishmentPayload, TestUuidGenerator,
    };
    use tempfile::tempdir;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.quarantined_topics.is_empty());
        assert_eq!(config.crawler_config().batch_size, 100);
        assert_eq!(config.crawler_config().poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "quarantined_topics": ["FormEstablishmentAdded"],
            "crawler": { "batch_size": 5, "subscriber_timeout_ms": 250 }
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.quarantine_set().contains(&Topic::FormEstablishmentAdded));

        let crawler = config.crawler_config();
        assert_eq!(crawler.batch_size, 5);
        assert_eq!(crawler.subscriber_timeout, Duration::from_millis(250));
        assert_eq!(crawler.max_concurrent_events, 8);
    }

    #[test]
    fn test_config_unknown_topic_in_file_is_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{ "log_level": "info", "quarantined_topics": ["NoSuchTopic"] }"#,
        )
        .unwrap();

        assert!(matches!(
            Config::load_from_file(&config_path),
            Err(CoreError::Json(_))
        ));
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.log_level = "trace".to_string();
        config.quarantined_topics = vec![Topic::AgencyRegistered];
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_no_overrides_keeps_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.apply_overrides(env(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.database_file(&paths), paths.database_file());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                (LOG_LEVEL_ENV, "warn"),
                (
                    QUARANTINED_TOPICS_ENV,
                    "ConventionRejected, MagicLinkRenewalRequested,",
                ),
            ]))
            .unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(
            config.quarantined_topics,
            vec![Topic::ConventionRejected, Topic::MagicLinkRenewalRequested]
        );
    }

    #[test]
    fn test_env_empty_topic_list_clears_quarantine() {
        let mut config = Config {
            quarantined_topics: vec![Topic::AgencyRegistered],
            ..Config::default()
        };
        config
            .apply_overrides(env(&[(QUARANTINED_TOPICS_ENV, "")]))
            .unwrap();
        assert!(config.quarantine_set().is_empty());
    }

    #[test]
    fn test_env_unknown_topic_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(env(&[(QUARANTINED_TOPICS_ENV, "AgencyRegistered,Bogus")]));

        match result {
            Err(CoreError::Config(message)) => assert!(message.contains("Bogus")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/courier-test"));
        let config = Config {
            database_path: Some(PathBuf::from("/var/lib/courier/outbox.db")),
            ..Config::default()
        };
        assert_eq!(
            config.database_file(&paths),
            PathBuf::from("/var/lib/courier/outbox.db")
        );
    }

    #[test]
    fn test_event_factory_quarantines_overridden_topics() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[(QUARANTINED_TOPICS_ENV, "FormEstablishmentAdded")]))
            .unwrap();

        let factory = config.event_factory(
            Arc::new(CustomClock::default()),
            Arc::new(TestUuidGenerator::default()),
        );

        let flagged = factory.create_event(EventPayload::FormEstablishmentAdded(
            FormEstablishmentPayload {
                siret: "12345678901234".to_string(),
                business_name: "Garage".to_string(),
                contact_email: "g@example.com".to_string(),
            },
        ));
        assert!(flagged.was_quarantined());

        let untouched = factory.create_event(EventPayload::AgencyRegistered(AgencyPayload {
            agency_id: "agency-1".to_string(),
            agency_name: "Agence Lyon".to_string(),
        }));
        assert!(!untouched.was_quarantined());
    }
}
