//! Process-level settings.
//!
//! Defaults, then an optional `dynscpi.toml` in the working directory, then `DYNSCPI_*`
//! environment variables. `DYNSCPI_DEBUG_STREAM` accepts `true`, `1` or `t` in any case.

use std::{path::PathBuf, time::Duration};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const CONFIG_FILE: &str = "dynscpi.toml";
pub const ENV_PREFIX: &str = "DYNSCPI_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Echo every command and response on the `dynscpi::stream` target.
    #[serde(default, deserialize_with = "truthy")]
    pub debug_stream: bool,
    pub query_retries: u32,
    pub retry_delay_ms: u64,
    /// Ask `*OPC?` before every query and only proceed once the instrument reports `1`.
    pub opc_gate: bool,
    pub timeout_ms: u64,
    /// Extra shared specification directories, searched after the built-in one.
    pub spec_dirs: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_stream: false,
            query_retries: 5,
            retry_delay_ms: 500,
            opc_gate: false,
            timeout_ms: 2000,
            spec_dirs: Vec::new(),
        }
    }
}

impl Settings {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Reads the file and the environment once. A value that does not parse is an error, not
    /// a silent fallback to the defaults.
    pub fn load() -> Result<Self> {
        Ok(Self::figment().extract()?)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn truthy<'de, D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i == 1,
        Flag::Text(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "t"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use figment::Jail;

    #[test]
    fn defaults_without_sources() {
        Jail::expect_with(|_jail| {
            assert_eq!(Settings::load().unwrap(), Settings::default());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "query_retries = 2\nopc_gate = true")?;
            jail.set_env("DYNSCPI_QUERY_RETRIES", "7");
            jail.set_env("DYNSCPI_DEBUG_STREAM", "T");
            let settings = Settings::load().unwrap();
            assert_eq!(settings.query_retries, 7);
            assert!(settings.opc_gate);
            assert!(settings.debug_stream);
            Ok(())
        });
    }

    #[test]
    fn unknown_debug_words_are_false() {
        Jail::expect_with(|jail| {
            jail.set_env("DYNSCPI_DEBUG_STREAM", "verbose");
            assert!(!Settings::load().unwrap().debug_stream);
            Ok(())
        });
    }

    #[test]
    fn unparsable_values_are_errors() {
        Jail::expect_with(|jail| {
            jail.set_env("DYNSCPI_DEBUG_STREAM", "1");
            jail.set_env("DYNSCPI_QUERY_RETRIES", "many");
            match Settings::load() {
                Err(Error::Config(e)) => assert!(e.to_string().contains("query_retries")),
                other => panic!("unexpected {:?}", other),
            }
            Ok(())
        });
    }

    #[test]
    fn broken_config_file_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "timeout_ms = \"soon\"")?;
            assert!(matches!(Settings::load(), Err(Error::Config(_))));
            Ok(())
        });
    }
}
