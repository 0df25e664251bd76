use std::error::Error as StdError;

use serde::Deserializer;
use serde::de::Error;
use serde::{Deserialize, Serialize};

/// Where ingested alignment hits live between the accumulation pass and
/// finalization. `Disk` spills hits to a JSON-lines file under `temp_dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HitStorageMode {
    Memory,
    Disk,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuantParams {
    /// Reaction catalog file: `reaction \t [EC] \t gene ...`, one per line.
    pub reactions_database: String,
    /// Pathway catalog file, structured or flat (see `pathways_structured`).
    pub pathways_database: String,
    #[serde(default)]
    pub pathways_structured: bool,
    /// Flat pathway members may themselves be pathway ids; resolve them.
    #[serde(default)]
    pub recurse_flat_pathways: bool,

    /// Optional reference-id mapping table: `reference \t gene \t length \t taxon`.
    #[serde(default)]
    pub id_mapping: Option<String>,

    #[serde(default = "default_threads", deserialize_with = "string_or_number_to_u32")]
    pub threads: u32,

    /// Total sequenced reads, used for the UNMAPPED row. 0 means unknown.
    #[serde(default, deserialize_with = "string_or_number_to_u64")]
    pub total_reads: u64,

    /// Normalize reference lengths against the average read length instead of
    /// taking them as-is.
    #[serde(default)]
    pub read_length_normalization: bool,
    #[serde(default, deserialize_with = "string_or_number_to_u32")]
    pub average_read_length: u32,

    #[serde(default = "default_storage")]
    pub hit_storage: HitStorageMode,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,

    /// External pathway-pruning command. None disables pruning.
    #[serde(default)]
    pub pruner_command: Option<String>,

    /// External significance-filter command. None keeps every pathway.
    #[serde(default)]
    pub significance_command: Option<String>,
    #[serde(
        default = "default_significance_probability",
        deserialize_with = "string_or_number_to_f64"
    )]
    pub significance_probability: f64,
    #[serde(default, deserialize_with = "string_or_number_to_u32")]
    pub significance_bin: u32,
}

fn default_threads() -> u32 {
    1
}

fn default_storage() -> HitStorageMode {
    HitStorageMode::Memory
}

fn default_temp_dir() -> String {
    ".".to_string()
}

fn default_significance_probability() -> f64 {
    0.9
}

impl QuantParams {
    /// Reads a JSON string and converts it into a `QuantParams` struct.
    /// Extra fields in the JSON are ignored; numeric fields accept either
    /// JSON numbers or number-like strings.
    pub fn from_json_str(json_str: &str) -> Result<Self, Box<dyn StdError>> {
        let params = serde_json::from_str(json_str)?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.reactions_database.trim().is_empty() {
            return Err("reactions_database path is empty".to_string());
        }
        if self.pathways_database.trim().is_empty() {
            return Err("pathways_database path is empty".to_string());
        }
        if self.threads == 0 {
            return Err("threads must be at least 1".to_string());
        }
        if self.read_length_normalization && self.average_read_length == 0 {
            return Err(
                "read_length_normalization requires a non-zero average_read_length".to_string(),
            );
        }
        if !(0.0..=1.0).contains(&self.significance_probability) {
            return Err(format!(
                "significance_probability must be within [0, 1]: {}",
                self.significance_probability
            ));
        }
        Ok(())
    }
}

fn string_or_number_to_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = Deserialize::deserialize(deserializer)?;
    match val {
        serde_json::Value::Number(num) => num
            .as_u64()
            .map(|n| n as u32)
            .ok_or_else(|| Error::custom("Invalid number")),
        serde_json::Value::String(s) => {
            if s.trim().is_empty() {
                Ok(0)
            } else {
                Ok(s.parse::<u32>().unwrap_or(0))
            }
        }
        _ => Ok(0),
    }
}

fn string_or_number_to_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = Deserialize::deserialize(deserializer)?;
    match val {
        serde_json::Value::Number(num) => {
            num.as_u64().ok_or_else(|| Error::custom("Invalid number"))
        }
        serde_json::Value::String(s) => {
            if s.trim().is_empty() {
                Ok(0)
            } else {
                Ok(s.parse::<u64>().unwrap_or(0))
            }
        }
        _ => Ok(0),
    }
}

fn string_or_number_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = Deserialize::deserialize(deserializer)?;
    match val {
        serde_json::Value::Number(num) => {
            num.as_f64().ok_or_else(|| Error::custom("Invalid number"))
        }
        serde_json::Value::String(s) => {
            if s.trim().is_empty() {
                Ok(0.0)
            } else {
                Ok(s.parse::<f64>().unwrap_or(0.0))
            }
        }
        _ => Ok(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static JSON_STR: &str = r#"
        {
            "reactions_database": "data/reactions.tsv",
            "pathways_database": "data/pathways.tsv",
            "pathways_structured": true,
            "threads": "4",
            "total_reads": 100000,
            "hit_storage": "disk",
            "temp_dir": "/tmp/metaquant",
            "pruner_command": "minpath",
            "significance_probability": 0.95,
            "significance_bin": 1
        }
        "#;

    #[test]
    fn test_params_from_json() {
        let params = QuantParams::from_json_str(JSON_STR).unwrap();
        assert_eq!(params.reactions_database, "data/reactions.tsv");
        assert!(params.pathways_structured);
        assert_eq!(params.threads, 4);
        assert_eq!(params.total_reads, 100000);
        assert_eq!(params.hit_storage, HitStorageMode::Disk);
        assert_eq!(params.pruner_command.as_deref(), Some("minpath"));
        assert_eq!(params.significance_probability, 0.95);
        assert_eq!(params.significance_bin, 1);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_read_json_into_params() {
        let json = std::fs::read_to_string("tests/data/test_params.json").unwrap();

        let params = QuantParams::from_json_str(&json).unwrap();
        assert_eq!(params.threads, 2);
        assert_eq!(params.total_reads, 1000);
        assert!(params.pathways_structured);
    }

    #[test]
    fn test_defaults() {
        let params = QuantParams::from_json_str(
            r#"{"reactions_database": "r.tsv", "pathways_database": "p.tsv"}"#,
        )
        .unwrap();
        assert_eq!(params.threads, 1);
        assert_eq!(params.hit_storage, HitStorageMode::Memory);
        assert!(!params.pathways_structured);
        assert!(params.pruner_command.is_none());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_read_length_normalization_without_length() {
        let params = QuantParams::from_json_str(
            r#"{
                "reactions_database": "r.tsv",
                "pathways_database": "p.tsv",
                "read_length_normalization": true
            }"#,
        )
        .unwrap();
        assert!(params.validate().is_err());
    }
}
