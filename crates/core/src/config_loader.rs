use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from the default path, merging built-in
    /// defaults, TOML, and `PAPER_TRADE_`-prefixed environment variables
    /// (nested keys separated by `__`, e.g. `PAPER_TRADE_EXCHANGE__SYMBOL`).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PAPER_TRADE_").split("__"))
            .extract()?;

        Ok(config)
    }
}
