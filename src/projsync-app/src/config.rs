// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "projsync.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Returns the default search paths for `projsync.toml`
/// (current directory, then XDG config, then /etc).
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("projsync").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/projsync").join(CONFIG_FILE_NAME));
    paths
}

/// Extract and deserialize a named section from TOML text.
///
/// Returns `Ok(None)` when the section is absent.
fn parse_section<T: DeserializeOwned>(
    path: &Path,
    content: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let table: toml::Table = toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // Re-serialize the section then parse as T so all serde defaults apply.
    let section_toml = toml::to_string(section)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    let cfg = toml::from_str::<T>(&section_toml)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    Ok(Some(cfg))
}

fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    parse_section(path, &content, key)
}

/// Trait for loading configuration from a `projsync.toml` section.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key in `projsync.toml` (e.g. `"projsync-server"`).
    fn section_key() -> &'static str;

    /// Parse the section out of already loaded TOML text.
    fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let path = PathBuf::from("<inline>");
        parse_section::<Self>(&path, content, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(path, format!("missing [{}] section", Self::section_key()))
        })
    }

    /// Load the section from a specific file path.
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// does not contain the expected `[<section_key>]` header.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Search default paths and load the first file that contains the
    /// expected section.
    ///
    /// Returns `(config, path_where_found)` or `(Default::default(), None)`
    /// when no config file is found.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(&path, Self::section_key())? {
                    return Ok((cfg, Some(path)));
                }
            }
        }
        Ok((Self::default(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Section {
        name: String,
        retries: u32,
    }

    impl ConfigFile for Section {
        fn section_key() -> &'static str {
            "demo"
        }
    }

    #[test]
    fn test_section_defaults_apply() {
        let cfg = Section::load_from_str("[demo]\nname = \"hall\"\n").unwrap();
        assert_eq!(cfg.name, "hall");
        assert_eq!(cfg.retries, 0);
    }

    #[test]
    fn test_missing_section() {
        let err = Section::load_from_str("[other]\nname = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("missing [demo] section"));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = Section::load_from_str("[demo\nname = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_, _)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("projsync-app-{}.toml", std::process::id()));
        std::fs::write(&path, "[demo]\nretries = 3\n").unwrap();
        let cfg = Section::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cfg.retries, 3);

        assert!(matches!(
            Section::load_from_file(&path),
            Err(ConfigError::ReadError(_, _))
        ));
    }

    #[test]
    fn test_search_paths_start_in_cwd() {
        let paths = config_search_paths();
        assert_eq!(paths[0], PathBuf::from(CONFIG_FILE_NAME));
        assert_eq!(paths.last(), Some(&PathBuf::from("/etc/projsync/projsync.toml")));
    }
}
