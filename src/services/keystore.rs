//! `.env`-style key store for API keys and webhook secrets.

use std::path::{Path, PathBuf};

use crate::error::KeyStoreError;
use crate::utils::mask_secret;

/// File name of the key store inside the data directory.
pub const KEY_FILE: &str = ".env";

/// A `KEY=value` file that can be read and edited in place.
///
/// Lines that do not belong to the key being written (comments, blank lines,
/// other keys) are left untouched.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Key store inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(KEY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, KeyStoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v))
    }

    /// All entries in file order, with their raw values.
    pub fn list(&self) -> Result<Vec<(String, String)>, KeyStoreError> {
        self.entries()
    }

    /// All entries with values masked for display.
    pub fn list_masked(&self) -> Result<Vec<(String, String)>, KeyStoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|(k, v)| {
                let masked = mask_secret(&v);
                (k, masked)
            })
            .collect())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), KeyStoreError> {
        validate_key(key)?;

        let line = format!("{key}={}", quote_value(value));
        let mut lines = self.read_lines()?;
        let mut replaced = false;
        for existing in lines.iter_mut() {
            if line_key(existing) == Some(key) {
                *existing = line.clone();
                replaced = true;
            }
        }
        if !replaced {
            lines.push(line);
        }

        self.write_lines(&lines)?;
        tracing::debug!(key, path = %self.path.display(), "stored key");
        Ok(())
    }

    /// Remove a key. Returns whether it was present.
    pub fn remove(&self, key: &str) -> Result<bool, KeyStoreError> {
        let lines = self.read_lines()?;
        let before = lines.len();
        let kept: Vec<String> = lines
            .into_iter()
            .filter(|l| line_key(l) != Some(key))
            .collect();

        if kept.len() == before {
            return Ok(false);
        }
        self.write_lines(&kept)?;
        Ok(true)
    }

    fn entries(&self) -> Result<Vec<(String, String)>, KeyStoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for item in dotenvy::from_path_iter(&self.path)? {
            entries.push(item?);
        }
        Ok(entries)
    }

    fn read_lines(&self) -> Result<Vec<String>, KeyStoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(content.lines().map(str::to_string).collect())
    }

    fn write_lines(&self, lines: &[String]) -> Result<(), KeyStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), KeyStoreError> {
    let mut chars = key.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(KeyStoreError::InvalidKey(key.to_string()))
    }
}

/// Key defined by a line, ignoring comments and an `export ` prefix.
fn line_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    line.split_once('=').map(|(k, _)| k.trim())
}

fn quote_value(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_.:/+=@,".contains(c));
    if plain {
        value.to_string()
    } else if !value.contains('\'') {
        // Single quotes are taken literally, with no substitution.
        format!("'{value}'")
    } else {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("\"{escaped}\"")
    }
}
