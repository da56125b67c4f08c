use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "ehr.db";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EhrConfig {
    /// SQLite file holding the Patients and Labs tables
    pub database: Option<String>,
    /// Default patients TSV for `ingest`
    pub patients: Option<String>,
    /// Default labs TSV for `ingest`
    pub labs: Option<String>,
}

impl EhrConfig {
    /// Flag value wins, then the config file, then `ehr.db`
    pub fn database_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.database.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("ehr.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<EhrConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: EhrConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &EhrConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ehr.toml");
        assert!(load_config(Some(path.as_path())).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ehr.toml");
        let config = EhrConfig {
            database: Some("data/ehr.db".into()),
            patients: Some("PatientCorePopulatedTable.txt".into()),
            labs: None,
        };

        write_config(&path, &config, false).unwrap();
        assert_eq!(load_config(Some(path.as_path())).unwrap(), Some(config.clone()));

        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &EhrConfig::default(), true).unwrap();
        assert_eq!(load_config(Some(path.as_path())).unwrap(), Some(EhrConfig::default()));
    }

    #[test]
    fn test_database_path_precedence() {
        let config = EhrConfig {
            database: Some("from_config.db".into()),
            ..Default::default()
        };
        assert_eq!(config.database_path(Some(Path::new("flag.db"))), PathBuf::from("flag.db"));
        assert_eq!(config.database_path(None), PathBuf::from("from_config.db"));
        assert_eq!(EhrConfig::default().database_path(None), PathBuf::from(DEFAULT_DATABASE));
    }

    #[test]
    fn test_ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("ehr.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }
}
