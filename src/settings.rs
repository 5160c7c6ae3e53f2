use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub port: u16,
    #[serde(default)]
    pub db: Option<String>,
    /// Required as `X-Api-Key` on raw ledger submissions when set.
    #[serde(default)]
    pub api_key: Option<String>,
}
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RegistrySettings {
    pub owner: String,
    #[serde(default)]
    pub oracles: Vec<String>,
}
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ScoringSettings {
    /// Remote scoring service; the in-process engine is used without one.
    #[serde(default)]
    pub endpoint: Option<String>,
}
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LedgerSettings {
    pub local: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Identity the bridge submits as when a request names none.
    pub oracle: String,
}
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub registry: RegistrySettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    pub ledger: LedgerSettings,
}

pub enum LedgerChoice {
    Local,
    Remote { endpoint: String, api_key: String },
    Demo,
}

impl Settings {
    /// Defaults, then the optional file, then `ORACLE_*` variables
    /// (`ORACLE_LEDGER__ENDPOINT` sets `ledger.endpoint`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server.port", 8081)?
            .set_default("registry.owner", "owner")?
            .set_default("registry.oracles", Vec::<String>::new())?
            .set_default("ledger.local", true)?
            .set_default("ledger.oracle", "oracle")?;
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("ORACLE").separator("__"))
            .build()
            .context("couldn't read configuration")?
            .try_deserialize::<Settings>()
            .context("invalid configuration")?;
        Ok(settings)
    }
    pub fn ledger_choice(&self) -> LedgerChoice {
        if self.ledger.local {
            return LedgerChoice::Local;
        }
        match (&self.ledger.endpoint, &self.ledger.api_key) {
            (Some(endpoint), Some(api_key)) if !endpoint.is_empty() && !api_key.is_empty() => {
                LedgerChoice::Remote {
                    endpoint: endpoint.clone(),
                    api_key: api_key.clone(),
                }
            }
            _ => LedgerChoice::Demo,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_use_local_ledger() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.server.db, None);
        assert_eq!(settings.registry.owner, "owner");
        assert!(settings.registry.oracles.is_empty());
        assert_eq!(settings.scoring, ScoringSettings::default());
        assert_eq!(settings.ledger.oracle, "oracle");
        assert!(matches!(settings.ledger_choice(), LedgerChoice::Local));
    }

    #[test]
    fn file_overrides_defaults() {
        let path =
            std::env::temp_dir().join(format!("oracle-settings-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[server]\nport = 9000\n[scoring]\nendpoint = \"http://127.0.0.1:5000\"\n[ledger]\nlocal = false\n",
        )
        .unwrap();
        let settings = Settings::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(
            settings.scoring.endpoint.as_deref(),
            Some("http://127.0.0.1:5000")
        );
        assert_eq!(settings.registry.owner, "owner");
        assert!(matches!(settings.ledger_choice(), LedgerChoice::Demo));
    }

    #[test]
    fn missing_credentials_fall_back_to_demo() {
        let mut settings = Settings::load(None).unwrap();
        settings.ledger.local = false;
        assert!(matches!(settings.ledger_choice(), LedgerChoice::Demo));
        settings.ledger.endpoint = Some("http://127.0.0.1:9000".to_string());
        assert!(matches!(settings.ledger_choice(), LedgerChoice::Demo));
        settings.ledger.api_key = Some("secret".to_string());
        assert!(matches!(
            settings.ledger_choice(),
            LedgerChoice::Remote { ref endpoint, .. } if endpoint == "http://127.0.0.1:9000"
        ));
    }
}
