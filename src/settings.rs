use crate::aggregate::{AggregateOptions, IdentityScope, SourceId};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub org: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub api_token: Option<String>,
    pub api_version: Option<String>,
    pub no_verify_ssl: Option<bool>,

    // Aggregation defaults
    pub sources: Option<Vec<String>>,
    pub require_success: Option<bool>,
    pub concurrent: Option<bool>,
    pub source_timeout_secs: Option<u64>,
    pub identity_scope: Option<String>,
}

impl Settings {
    pub fn new(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut s = Config::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                s = s.add_source(File::with_name(path));
            } else {
                s = s.add_source(File::with_name(path).required(true));
            }
        } else {
            s = s.add_source(File::with_name("config").required(false));
        }

        // VCD_HOST -> host, VCD_NO_VERIFY_SSL -> no_verify_ssl, VCD_SOURCES=a,b -> sources
        s = s.add_source(
            Environment::with_prefix("VCD")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("sources"),
        );

        s.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.as_deref().map_or(true, str::is_empty) {
            return Err("Host is required".to_string());
        }
        if self.api_token.as_deref().is_some_and(|t| !t.is_empty()) {
            return Ok(());
        }
        if self.user.as_deref().map_or(true, str::is_empty) {
            return Err("User is required".to_string());
        }
        if self.org.as_deref().map_or(true, str::is_empty) {
            return Err("Org is required".to_string());
        }
        if self.password.as_deref().map_or(true, str::is_empty) {
            return Err("Password or API token is required".to_string());
        }
        Ok(())
    }

    pub fn aggregate_options(&self) -> Result<AggregateOptions, String> {
        let mut options = AggregateOptions::default();
        if let Some(sources) = &self.sources {
            let ids: Vec<SourceId> = sources
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(SourceId::from)
                .collect();
            if !ids.is_empty() {
                options.priority = Some(ids);
            }
        }
        if let Some(require) = self.require_success {
            options.require_success = require;
        }
        if let Some(concurrent) = self.concurrent {
            options.concurrent = concurrent;
        }
        if let Some(secs) = self.source_timeout_secs {
            options.source_timeout = if secs == 0 {
                None
            } else {
                Some(Duration::from_secs(secs))
            };
        }
        if let Some(scope) = &self.identity_scope {
            options.identity = scope.parse::<IdentityScope>()?;
        }
        Ok(options)
    }
}
