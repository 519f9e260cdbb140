//! Application configuration file.
//!
//! The file is a JSON document with `paths`, `features` and `filters`
//! sections. `features.batch_size`, `features.preview_mode` and
//! `features.execute_query` are required; unknown keys anywhere are
//! ignored.

use crate::error::DbForgeError;
use crate::filter::FilterSet;
use crate::pipeline::{GenerationConfig, PreviewExtension};
use crate::sql::{InsertMode, derive_table_name, validate_table_name};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// DBF file to convert
    #[serde(default)]
    pub dbf_path: Option<PathBuf>,
    /// Directory receiving the preview file
    #[serde(default = "default_sql_output")]
    pub sql_output: PathBuf,
}

fn default_sql_output() -> PathBuf {
    PathBuf::from(".")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dbf_path: None,
            sql_output: default_sql_output(),
        }
    }
}

/// Run options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesConfig {
    pub batch_size: usize,
    pub preview_mode: bool,
    pub execute_query: bool,
    #[serde(default)]
    pub preview_ext: PreviewExtension,
    #[serde(default)]
    pub insert_mode: InsertMode,
    #[serde(default)]
    pub max_records: Option<usize>,
    /// Overrides the table name derived from the DBF file name
    #[serde(default)]
    pub target_table_name: Option<String>,
}

impl FeaturesConfig {
    /// The pipeline options described by this section.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            batch_size: self.batch_size,
            preview_mode: self.preview_mode,
            execute_query: self.execute_query,
            preview_ext: self.preview_ext,
            insert_mode: self.insert_mode,
            max_records: self.max_records,
        }
    }
}

/// The whole configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    pub features: FeaturesConfig,
    #[serde(default)]
    pub filters: FilterSet,
}

impl AppConfig {
    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    /// I/O errors for an unreadable file, configuration errors for malformed
    /// JSON, missing required options or unknown filter operators.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| DbForgeError::Io {
            context: format!("failed to read configuration file '{}'", path.display()),
            source: e,
        })?;
        let config = Self::from_json_str(&contents)?;
        tracing::debug!("Loaded configuration from '{}'", path.display());
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DbForgeError::configuration(format!("invalid configuration: {}", e)))
    }

    /// Checks the run options and the explicit table name, if any.
    ///
    /// Filter conditions are checked later against the DBF schema.
    pub fn validate(&self) -> Result<()> {
        self.features.generation_config().validate()?;
        if let Some(table) = &self.features.target_table_name {
            validate_table_name(table)?;
        }
        Ok(())
    }

    /// Configured DBF path.
    ///
    /// # Errors
    /// Returns a configuration error when no path was configured.
    pub fn dbf_path(&self) -> Result<&Path> {
        self.paths
            .dbf_path
            .as_deref()
            .ok_or_else(|| DbForgeError::configuration("no DBF file configured (paths.dbf_path)"))
    }

    /// Target table: `target_table_name` when set, else derived from the DBF
    /// file name.
    pub fn table_name(&self) -> Result<String> {
        match &self.features.target_table_name {
            Some(name) => {
                validate_table_name(name)?;
                Ok(name.clone())
            }
            None => derive_table_name(self.dbf_path()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Operator;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "paths": { "dbf_path": "data/CANCFDI.DBF", "sql_output": "out" },
        "features": { "batch_size": 500, "preview_mode": true, "execute_query": false,
                      "preview_ext": "sql", "max_records": 4000, "legacy_flag": "ignored" },
        "filters": { "enabled": true, "conditions": [
            { "field": "F_EMISION", "operator": "between",
              "value": "2021-01-01", "value2": "2021-12-31" },
            { "field": "STATUS", "value": "A" } ] }
    }"#;

    #[test]
    fn test_parse_full_document() {
        let config = AppConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.paths.dbf_path, Some(PathBuf::from("data/CANCFDI.DBF")));
        assert_eq!(config.paths.sql_output, PathBuf::from("out"));
        assert_eq!(config.features.batch_size, 500);
        assert_eq!(config.features.preview_ext, PreviewExtension::Sql);
        assert_eq!(config.features.insert_mode, InsertMode::Batch);
        assert_eq!(config.features.max_records, Some(4000));
        assert_eq!(config.filters.conditions.len(), 2);
        assert_eq!(config.filters.conditions[1].operator, Operator::Eq);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_for_optional_options() {
        let config = AppConfig::from_json_str(
            r#"{"features": {"batch_size": 10, "preview_mode": false, "execute_query": true}}"#,
        )
        .unwrap();
        assert_eq!(config.features.preview_ext, PreviewExtension::Txt);
        assert_eq!(config.paths.sql_output, PathBuf::from("."));
        assert!(!config.filters.enabled);
        assert!(config.dbf_path().is_err());
    }

    #[test]
    fn test_missing_required_option_fails_fast() {
        let err = AppConfig::from_json_str(
            r#"{"features": {"batch_size": 10, "preview_mode": true}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DbForgeError::Configuration { .. }));
        assert!(err.to_string().contains("execute_query"));
    }

    #[test]
    fn test_unknown_operator_fails_at_load() {
        let json = SAMPLE.replace("\"between\"", "\"like\"");
        let err = AppConfig::from_json_str(&json).unwrap_err();
        assert!(matches!(err, DbForgeError::Configuration { .. }));
    }

    #[test]
    fn test_invalid_preview_extension_rejected() {
        let json = SAMPLE.replace("\"sql\"", "\"csv\"");
        assert!(AppConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size_and_bad_table() {
        let mut config = AppConfig::from_json_str(SAMPLE).unwrap();
        config.features.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::from_json_str(SAMPLE).unwrap();
        config.features.target_table_name = Some("vales; drop".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_table_name_resolution() {
        let mut config = AppConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.table_name().unwrap(), "cancfdi");

        config.features.target_table_name = Some("public.cancelados".to_string());
        assert_eq!(config.table_name().unwrap(), "public.cancelados");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.features.batch_size, 500);

        let err = AppConfig::load(Path::new("/nonexistent/dbforge.json")).unwrap_err();
        assert!(matches!(err, DbForgeError::Io { .. }));
    }
}
