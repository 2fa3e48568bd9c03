//! YAML configuration file and its merge with command-line flags.
//!
//! ```yaml
//! profile: staging
//! region: eu-west-1
//! namespace: prod
//! retry:
//!   base_delay_ms: 500
//!   max_retries: 12
//! wait:
//!   max_polls: 100
//! on_unencodable: skip
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admin::WaitPolicy;
use crate::aws::AwsSettings;
use crate::client::MAX_BATCH_WRITE;
use crate::codec::UnencodablePolicy;
use crate::error::{DynoError, Result};
use crate::launcher::FunctionNames;
use crate::orchestrator::TransferSettings;
use crate::retry::RetryPolicy;

/// File looked up in the home directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".dynotool.yaml";

pub const DEFAULT_NAMESPACE: &str = "dev";
pub const DEFAULT_FUNCTION_PREFIX: &str = "dyn-o-tool";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub base_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitConfig {
    pub poll_interval_ms: Option<u64>,
    pub max_polls: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DynotoolConfig {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub namespace: Option<String>,
    pub function_prefix: Option<String>,
    pub retry: RetryConfig,
    pub batch_size: Option<usize>,
    pub page_size: Option<u32>,
    pub wait: WaitConfig,
    pub on_unencodable: Option<UnencodablePolicy>,
}

/// Flag values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub namespace: Option<String>,
    pub max_retries: Option<u32>,
    pub batch_size: Option<usize>,
    pub page_size: Option<u32>,
    pub on_unencodable: Option<UnencodablePolicy>,
}

impl DynotoolConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| DynoError::Config(e.to_string()))
    }

    /// Load an explicit file, or `~/.dynotool.yaml` when it exists, or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| DynoError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_yaml(&text)
            .map_err(|e| DynoError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        self.profile = overrides.profile.or(self.profile);
        self.region = overrides.region.or(self.region);
        self.endpoint_url = overrides.endpoint_url.or(self.endpoint_url);
        self.namespace = overrides.namespace.or(self.namespace);
        self.retry.max_retries = overrides.max_retries.or(self.retry.max_retries);
        self.batch_size = overrides.batch_size.or(self.batch_size);
        self.page_size = overrides.page_size.or(self.page_size);
        self.on_unencodable = overrides.on_unencodable.or(self.on_unencodable);
        self
    }

    pub fn transfer_settings(&self) -> Result<TransferSettings> {
        let batch_size = self.batch_size.unwrap_or(MAX_BATCH_WRITE);
        if batch_size == 0 || batch_size > MAX_BATCH_WRITE {
            return Err(DynoError::Config(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_WRITE, batch_size
            )));
        }
        if self.page_size == Some(0) {
            return Err(DynoError::Config("page_size must be positive".to_string()));
        }

        let defaults = TransferSettings::default();
        let retry = RetryPolicy {
            base_delay: self
                .retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.base_delay),
            max_retries: self.retry.max_retries,
            max_delay: self.retry.max_delay_ms.map(Duration::from_millis),
        };
        let wait = WaitPolicy {
            poll_interval: self
                .wait
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.wait.poll_interval),
            max_polls: self.wait.max_polls.unwrap_or(defaults.wait.max_polls),
        };
        Ok(TransferSettings {
            retry,
            batch_size,
            page_size: self.page_size,
            wait,
            on_unencodable: self.on_unencodable.unwrap_or_default(),
        })
    }

    pub fn aws_settings(&self) -> AwsSettings {
        AwsSettings {
            profile: self.profile.clone(),
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
        }
    }

    pub fn function_names(&self) -> FunctionNames {
        FunctionNames::new(
            self.function_prefix.as_deref().unwrap_or(DEFAULT_FUNCTION_PREFIX),
            self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
        )
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
}
