// Local configuration store. A module-scoped file of flat key/value strings
// holding the API token and the key -> deposition-id mapping that lets
// repeated runs of the same script reuse the same deposition.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Persistent key/value store scoped by a module name (`zenodo` or
/// `zenodo:sandbox`). Values are kept in a JSON object at
/// `<config_dir>/zenodo/<module>.json`; an environment variable of the form
/// `MODULE_KEY` (uppercased, with `:` and `-` mapped to `_`) takes
/// precedence over the file on reads.
pub struct ConfigStore {
    module: String,
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(module: &str) -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("zenodo");
        let file = format!("{}.json", module.replace(':', "-"));
        ConfigStore {
            module: module.to_string(),
            path: dir.join(file),
        }
    }

    /// Store backed by an explicit file path instead of the default
    /// configuration directory.
    pub fn with_path(module: &str, path: PathBuf) -> Self {
        ConfigStore {
            module: module.to_string(),
            path,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// The environment variable consulted for `key`, e.g. `api_token` under
    /// module `zenodo:sandbox` maps to `ZENODO_SANDBOX_API_TOKEN`.
    pub fn env_key(&self, key: &str) -> String {
        format!("{}_{}", self.module, key)
            .to_uppercase()
            .replace([':', '-'], "_")
    }

    /// Look up a key, preferring the corresponding environment variable
    /// over the store file.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Ok(value) = std::env::var(self.env_key(key)) {
            if !value.is_empty() {
                return Some(value);
            }
        }
        self.read().ok().and_then(|map| map.get(key).cloned())
    }

    /// Write a key to the store file, creating the file and its parent
    /// directory on first use.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read().unwrap_or_default();
        map.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(&map)?;
        fs::write(&self.path, body)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("malformed config store {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::with_path("zenodo", dir.path().join("zenodo.json"));
        assert_eq!(store.get("my-dataset"), None);
        store.set("my-dataset", "12345").unwrap();
        assert_eq!(store.get("my-dataset").as_deref(), Some("12345"));
    }

    #[test]
    fn set_preserves_other_keys() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::with_path("zenodo", dir.path().join("zenodo.json"));
        store.set("first", "1").unwrap();
        store.set("second", "2").unwrap();
        assert_eq!(store.get("first").as_deref(), Some("1"));
        assert_eq!(store.get("second").as_deref(), Some("2"));
    }

    #[test]
    fn env_key_normalizes_module_and_key() {
        let store = ConfigStore::with_path("zenodo:sandbox", PathBuf::from("unused.json"));
        assert_eq!(store.env_key("api_token"), "ZENODO_SANDBOX_API_TOKEN");
        let store = ConfigStore::with_path("zenodo", PathBuf::from("unused.json"));
        assert_eq!(store.env_key("my-dataset"), "ZENODO_MY_DATASET");
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::with_path(
            "zenodo-test-override",
            dir.path().join("zenodo-test-override.json"),
        );
        store.set("api_token", "from-file").unwrap();
        std::env::set_var("ZENODO_TEST_OVERRIDE_API_TOKEN", "from-env");
        assert_eq!(store.get("api_token").as_deref(), Some("from-env"));
        std::env::remove_var("ZENODO_TEST_OVERRIDE_API_TOKEN");
        assert_eq!(store.get("api_token").as_deref(), Some("from-file"));
    }
}
