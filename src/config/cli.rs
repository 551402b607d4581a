use crate::domain::model::{Params, UpdateOptions};
use crate::utils::error::{Result, UpdateError};
use crate::utils::validation::{validate_path, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "entity-update")]
#[command(about = "Validate and persist an entity update described by a TOML config")]
pub struct CliConfig {
    #[arg(long, short = 'c', help = "Path to the update TOML config")]
    pub config: String,

    #[arg(long, help = "JSON file holding the submitted params")]
    pub params: Option<String>,

    #[arg(long = "param", value_name = "KEY=VALUE", help = "Extra param, repeatable")]
    pub param: Vec<String>,

    #[arg(long, help = "Stop at the first invalid form")]
    pub short_circuit: bool,

    #[arg(long, help = "Persist without flushing the entity manager")]
    pub no_flush: bool,

    #[arg(long, help = "Delete the entity found by the id param instead of updating it")]
    pub delete: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

impl CliConfig {
    /// Params from `--params`, overridden by every `--param`.
    pub fn load_params(&self) -> Result<Params> {
        let mut params = match &self.params {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                let value: Value = serde_json::from_str(&content)?;
                if !value.is_object() {
                    return Err(UpdateError::InvalidConfigValueError {
                        field: "params".to_string(),
                        value: path.clone(),
                        reason: "Params file must contain a JSON object".to_string(),
                    });
                }
                Params::create(value)
            }
            None => Params::new(),
        };

        for pair in &self.param {
            let (key, value) = parse_param(pair)?;
            params.insert(key, value);
        }
        Ok(params)
    }

    /// Command line flags switch options on; they never switch configured ones off.
    pub fn merge_options(&self, configured: UpdateOptions) -> UpdateOptions {
        UpdateOptions {
            short_circuit: configured.short_circuit || self.short_circuit,
            no_flush: configured.no_flush || self.no_flush,
        }
    }
}

/// `key=value`; the value is read as JSON when it parses, as a string otherwise.
pub fn parse_param(pair: &str) -> Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| UpdateError::InvalidConfigValueError {
            field: "param".to_string(),
            value: pair.to_string(),
            reason: "Expected KEY=VALUE".to_string(),
        })?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("config", &self.config)?;
        if let Some(params) = &self.params {
            validate_path("params", params)?;
        }
        for pair in &self.param {
            parse_param(pair)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("id=7").unwrap(), ("id".to_string(), json!(7)));
        assert_eq!(
            parse_param("name=Ada Lovelace").unwrap(),
            ("name".to_string(), json!("Ada Lovelace"))
        );
        assert_eq!(
            parse_param("address={\"street\":\"Main\"}").unwrap().1,
            json!({"street": "Main"})
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_load_params_merges_file_and_flags() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"id": "7", "name": "Ada"}"#).unwrap();

        let cli = CliConfig::parse_from([
            "entity-update",
            "--config",
            "update.toml",
            "--params",
            file.path().to_str().unwrap(),
            "--param",
            "name=Grace",
            "--short-circuit",
        ]);

        let params = cli.load_params().unwrap();
        assert_eq!(params.get_str("id"), Some("7"));
        assert_eq!(params.get_str("name"), Some("Grace"));
        assert!(cli.validate().is_ok());

        let options = cli.merge_options(UpdateOptions::no_flush());
        assert!(options.short_circuit);
        assert!(options.no_flush);
    }
}
