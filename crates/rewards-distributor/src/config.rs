use std::fs;
use std::path::{Path, PathBuf};

use rewards_core::{ReplayParams, DEFAULT_REDEMPTION_PRICE_REFRESH_SECS, DEFAULT_TICK_SPACING};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{DistributorError, DistributorResult};

/// Distributor configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DistributorConfig {
    /// Data sources
    #[validate]
    pub endpoints: EndpointsConfig,

    /// Campaign definition
    #[validate]
    pub campaign: CampaignConfig,

    /// Replay tuning
    #[validate]
    pub replay: ReplayConfig,

    /// Retry configuration for every remote call
    #[serde(default)]
    #[validate]
    pub retry: RetryConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EndpointsConfig {
    /// Ethereum JSON-RPC endpoint, used for block timestamps
    #[validate(url)]
    pub rpc_url: String,

    /// Subgraph of the debt protocol (safes, owners, rates, redemption prices)
    #[validate(url)]
    pub geb_subgraph_url: String,

    /// Subgraph of the concentrated liquidity pool
    #[validate(url)]
    pub uniswap_subgraph_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CampaignConfig {
    /// First block of the campaign
    #[validate(range(min = 1))]
    pub start_block: u64,

    /// Last block of the campaign
    #[validate(range(min = 1))]
    pub end_block: u64,

    /// Rewards distributed over the whole campaign
    pub reward_amount: f64,

    /// Pool whose liquidity is rewarded
    #[validate(length(equal = 42))]
    pub pool_address: String,

    /// Collateral type whose accumulated rate scales debt
    #[serde(default = "default_collateral_type")]
    #[validate(length(min = 1))]
    pub collateral_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReplayConfig {
    /// Negative debts no further below zero than this are clamped to zero.
    /// Required: the right value depends on the campaign.
    pub debt_dust_tolerance: f64,

    /// Maximum age of the cached redemption price, in seconds
    #[serde(default = "default_refresh_secs")]
    #[validate(range(min = 1))]
    pub redemption_price_refresh_secs: u64,

    /// Tick spacing of the pool
    #[serde(default = "default_tick_spacing")]
    #[validate(range(min = 1, max = 16384))]
    pub tick_spacing: i32,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Maximum number of retries for failed requests
    #[validate(range(min = 1, max = 50))]
    pub max_retries: u32,

    /// Base delay between retries in milliseconds
    #[validate(range(min = 1))]
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// One address per line, excluded from the campaign
    pub exclusion_list: Option<PathBuf>,

    /// `proxy,owner` lines replacing the owner of a proxy account
    pub owner_overrides: Option<PathBuf>,

    /// Directory receiving the dumps and `rewards.csv`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines instead of human readable ones
    #[serde(default)]
    pub json_logs: bool,
}

impl DistributorConfig {
    /// Load configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> DistributorResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DistributorError::InvalidConfig(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: DistributorConfig = toml::from_str(&content).map_err(|e| {
            DistributorError::InvalidConfig(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> DistributorResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate field ranges, then the rules spanning several fields
    pub fn validate(&self) -> DistributorResult<()> {
        Validate::validate(self)?;

        if self.campaign.end_block <= self.campaign.start_block {
            return Err(invalid_parameter(
                "end_block",
                &self.campaign.end_block.to_string(),
                &format!("greater than start_block ({})", self.campaign.start_block),
            ));
        }

        if !self.campaign.reward_amount.is_finite() || self.campaign.reward_amount <= 0.0 {
            return Err(invalid_parameter(
                "reward_amount",
                &self.campaign.reward_amount.to_string(),
                "greater than 0",
            ));
        }

        if !self.campaign.pool_address.starts_with("0x") {
            return Err(invalid_parameter(
                "pool_address",
                &self.campaign.pool_address,
                "a 0x-prefixed address",
            ));
        }

        let tolerance = self.replay.debt_dust_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(invalid_parameter(
                "debt_dust_tolerance",
                &tolerance.to_string(),
                "a non-negative number",
            ));
        }

        self.retry.validate_backoff()?;

        Ok(())
    }

    /// Directory receiving the exports
    pub fn output_dir(&self) -> &Path {
        &self.paths.output_dir
    }

    /// Replay parameters for the campaign, given the on-chain starting state
    pub fn replay_params(
        &self,
        campaign_start: u64,
        campaign_end: u64,
        initial_accumulated_rate: f64,
        initial_sqrt_price: f64,
    ) -> ReplayParams {
        ReplayParams::new(
            campaign_start,
            campaign_end,
            self.campaign.reward_amount,
            initial_accumulated_rate,
            initial_sqrt_price,
            self.replay.debt_dust_tolerance,
        )
        .with_refresh_secs(self.replay.redemption_price_refresh_secs)
        .with_tick_spacing(self.replay.tick_spacing)
    }
}

impl RetryConfig {
    fn validate_backoff(&self) -> DistributorResult<()> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(invalid_parameter(
                "max_delay_ms",
                &self.max_delay_ms.to_string(),
                &format!("greater than or equal to base_delay_ms ({})", self.base_delay_ms),
            ));
        }

        if !(self.backoff_multiplier > 1.0) {
            return Err(invalid_parameter(
                "backoff_multiplier",
                &self.backoff_multiplier.to_string(),
                "greater than 1.0",
            ));
        }

        Ok(())
    }

    /// Calculate delay for retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return self.base_delay_ms;
        }

        let exponential_delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (exponential_delay as u64).min(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            exclusion_list: None,
            owner_overrides: None,
            output_dir: default_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn invalid_parameter(name: &str, value: &str, expected: &str) -> DistributorError {
    DistributorError::InvalidConfig(format!("{name} = {value}, expected {expected}"))
}

fn default_collateral_type() -> String {
    "ETH-A".to_string()
}

fn default_refresh_secs() -> u64 {
    DEFAULT_REDEMPTION_PRICE_REFRESH_SECS
}

fn default_tick_spacing() -> i32 {
    DEFAULT_TICK_SPACING
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[endpoints]
rpc_url = "http://localhost:8545"
geb_subgraph_url = "http://localhost:8000/subgraphs/name/geb"
uniswap_subgraph_url = "http://localhost:8000/subgraphs/name/uniswap"

[campaign]
start_block = 12000000
end_block = 12100000
reward_amount = 1000.0
pool_address = "0xcf7e21b96a7dae8e1663b5a266fd812cbe973e70"

[replay]
debt_dust_tolerance = 0.02
"#;

    fn config() -> DistributorConfig {
        toml::from_str(MINIMAL).unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.campaign.collateral_type, "ETH-A");
        assert_eq!(config.replay.redemption_price_refresh_secs, 86_400);
        assert_eq!(config.replay.tick_spacing, 10);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.paths.output_dir, PathBuf::from("."));
        assert_eq!(config.logging.log_level, "info");
        assert!(!config.logging.json_logs);
    }

    #[test]
    fn test_dust_tolerance_is_required() {
        let without = MINIMAL.replace("debt_dust_tolerance = 0.02", "");
        assert!(toml::from_str::<DistributorConfig>(&without).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = config();
        config.campaign.end_block = config.campaign.start_block;
        assert!(config.validate().is_err());

        let mut config = self::config();
        config.campaign.reward_amount = 0.0;
        assert!(config.validate().is_err());

        let mut config = self::config();
        config.replay.debt_dust_tolerance = -1.0;
        assert!(config.validate().is_err());

        let mut config = self::config();
        config.endpoints.rpc_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(DistributorError::Validation(_))));

        let mut config = self::config();
        config.retry.backoff_multiplier = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_delay_calculation() {
        let retry_config = RetryConfig::default();

        assert_eq!(retry_config.delay_for_attempt(0), 1000);
        assert_eq!(retry_config.delay_for_attempt(1), 2000);
        assert_eq!(retry_config.delay_for_attempt(2), 4000);

        // Should cap at max_delay_ms
        assert_eq!(retry_config.delay_for_attempt(10), 30_000);
    }

    #[test]
    fn test_replay_params_carry_tuning() {
        let mut config = config();
        config.replay.tick_spacing = 60;
        config.replay.redemption_price_refresh_secs = 3600;

        let params = config.replay_params(100, 200, 1.2, 5e28);
        assert_eq!(params.total_budget, 1000.0);
        assert_eq!(params.tick_spacing, 60);
        assert_eq!(params.redemption_price_refresh_secs, 3600);
        assert_eq!(params.debt_dust_tolerance, 0.02);
        assert!(params.validate().is_ok());
    }
}
