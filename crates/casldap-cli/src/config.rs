//! CLI configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

use casldap_core::LdapSettings;
use casldap_db::DatabaseConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub ldap: LdapSettings,
    #[serde(default)]
    pub database: DatabaseConfig,
}

type Builder = config::ConfigBuilder<config::builder::DefaultState>;

fn defaults() -> Result<Builder> {
    Ok(config::Config::builder()
        .set_default("ldap.timeout_secs", 10)?
        .set_default("ldap.pool.strategy", "round_robin")?
        .set_default("ldap.pool.active", true)?
        .set_default("ldap.pool.exhaust", 5)?)
}

impl Settings {
    /// Load settings from `config/default`, `config/local`, an optional
    /// extra file, then `CASLDAP__` environment variables.
    pub fn load(extra: Option<&Path>) -> Result<Self> {
        let mut builder = defaults()?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        if let Some(path) = extra {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            // e.g. CASLDAP__LDAP__SERVERS=ldap1,ldap2
            .add_source(
                config::Environment::with_prefix("CASLDAP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ldap.servers")
                    .with_list_parse_key("ldap.attributes")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Settings from a TOML document on top of the defaults.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config = defaults()?
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
