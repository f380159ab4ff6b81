use crate::config::AllocConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads engine configuration by merging TOML, environment variables, and JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AllocConfig> {
        let config: AllocConfig = Figment::new()
            .merge(Toml::file("config/Alloc.toml"))
            .merge(Env::prefixed("ALLOC_"))
            .join(Json::file("config/Alloc.json"))
            .extract()?;

        Ok(config)
    }

    /// Loads engine configuration with a specific profile.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(profile: &str) -> Result<AllocConfig> {
        let config: AllocConfig = Figment::new()
            .merge(Toml::file("config/Alloc.toml"))
            .merge(Toml::file(format!("config/Alloc.{profile}.toml")))
            .merge(Env::prefixed("ALLOC_"))
            .join(Json::file("config/Alloc.json"))
            .extract()?;

        Ok(config)
    }
}
