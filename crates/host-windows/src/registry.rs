//! Registry access seam. Paths are full paths starting with a root key name,
//! e.g. `HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Cryptography`.

use janus_core::{Error, Result};
use serde::{Deserialize, Serialize};

pub const REG_SZ: u32 = 1;
pub const REG_EXPAND_SZ: u32 = 2;
pub const REG_BINARY: u32 = 3;
pub const REG_DWORD: u32 = 4;
pub const REG_MULTI_SZ: u32 = 7;
pub const REG_QWORD: u32 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKey {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
    Users,
    CurrentConfig,
}

impl RootKey {
    const ALL: [(&'static str, RootKey); 5] = [
        ("HKEY_LOCAL_MACHINE", RootKey::LocalMachine),
        ("HKEY_CURRENT_USER", RootKey::CurrentUser),
        ("HKEY_CLASSES_ROOT", RootKey::ClassesRoot),
        ("HKEY_USERS", RootKey::Users),
        ("HKEY_CURRENT_CONFIG", RootKey::CurrentConfig),
    ];
}

/// Splits a full registry path into its root key and sub path.
pub fn split_root(path: &str) -> Result<(RootKey, &str)> {
    for (name, root) in RootKey::ALL {
        if let Some(rest) = path.strip_prefix(name) {
            if rest.is_empty() || rest.starts_with('\\') {
                return Ok((root, rest.trim_start_matches('\\')));
            }
        }
    }
    Err(Error::Registry(format!("invalid registry path: {path}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistryData {
    Text(String),
    Number(u64),
    Lines(Vec<String>),
    Bytes(Vec<u8>),
}

/// One named value, in the `{name, data, type}` layout registry backups use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryValue {
    pub name: String,
    pub data: RegistryData,
    #[serde(rename = "type")]
    pub value_type: u32,
}

impl RegistryValue {
    pub fn string(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            data: RegistryData::Text(value.to_string()),
            value_type: REG_SZ,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            RegistryData::Text(text) => Some(text),
            _ => None,
        }
    }
}

pub trait RegistryAccess: Send + Sync {
    fn subkeys(&self, path: &str) -> Result<Vec<String>>;

    /// `Ok(None)` when the value does not exist.
    fn read_string(&self, path: &str, name: &str) -> Result<Option<String>>;

    fn write_value(&self, path: &str, value: &RegistryValue) -> Result<()>;

    fn write_string(&self, path: &str, name: &str, value: &str) -> Result<()> {
        self.write_value(path, &RegistryValue::string(name, value))
    }

    /// Returns false when the value was already absent.
    fn delete_value(&self, path: &str, name: &str) -> Result<bool>;

    /// Empty when the key does not exist.
    fn enumerate_values(&self, path: &str) -> Result<Vec<RegistryValue>>;

    /// Whether the key can be opened for writing.
    fn can_write(&self, path: &str) -> bool;
}

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryRegistry;

#[cfg(any(test, feature = "test-support"))]
mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use parking_lot::Mutex;

    /// In-memory registry that counts every mutating call.
    #[derive(Debug, Default)]
    pub struct MemoryRegistry {
        keys: Mutex<BTreeMap<String, BTreeMap<String, RegistryValue>>>,
        writes: AtomicUsize,
        deletes: AtomicUsize,
        read_only: AtomicBool,
    }

    impl MemoryRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_string(self, path: &str, name: &str, value: &str) -> Self {
            self.seed(path, RegistryValue::string(name, value));
            self
        }

        /// Creates a key with no values.
        pub fn with_key(self, path: &str) -> Self {
            self.keys.lock().entry(path.to_string()).or_default();
            self
        }

        pub fn seed(&self, path: &str, value: RegistryValue) {
            self.keys
                .lock()
                .entry(path.to_string())
                .or_default()
                .insert(value.name.clone(), value);
        }

        pub fn set_read_only(&self, read_only: bool) {
            self.read_only.store(read_only, Ordering::SeqCst);
        }

        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        pub fn deletes(&self) -> usize {
            self.deletes.load(Ordering::SeqCst)
        }

        fn check_writable(&self, path: &str) -> Result<()> {
            if self.read_only.load(Ordering::SeqCst) {
                return Err(Error::Permission(format!("registry write denied: {path}")));
            }
            Ok(())
        }
    }

    impl RegistryAccess for MemoryRegistry {
        fn subkeys(&self, path: &str) -> Result<Vec<String>> {
            split_root(path)?;
            let prefix = format!("{path}\\");
            let keys = self.keys.lock();
            let mut children: Vec<String> = keys
                .keys()
                .filter_map(|key| key.strip_prefix(&prefix))
                .filter_map(|rest| rest.split('\\').next())
                .map(str::to_string)
                .collect();
            children.dedup();
            Ok(children)
        }

        fn read_string(&self, path: &str, name: &str) -> Result<Option<String>> {
            let keys = self.keys.lock();
            Ok(keys
                .get(path)
                .and_then(|values| values.get(name))
                .and_then(|value| value.as_text().map(str::to_string)))
        }

        fn write_value(&self, path: &str, value: &RegistryValue) -> Result<()> {
            split_root(path)?;
            self.check_writable(path)?;
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.seed(path, value.clone());
            Ok(())
        }

        fn delete_value(&self, path: &str, name: &str) -> Result<bool> {
            self.check_writable(path)?;
            self.deletes.fetch_add(1, Ordering::SeqCst);
            let mut keys = self.keys.lock();
            Ok(keys
                .get_mut(path)
                .map(|values| values.remove(name).is_some())
                .unwrap_or(false))
        }

        fn enumerate_values(&self, path: &str) -> Result<Vec<RegistryValue>> {
            let keys = self.keys.lock();
            Ok(keys
                .get(path)
                .map(|values| values.values().cloned().collect())
                .unwrap_or_default())
        }

        fn can_write(&self, _path: &str) -> bool {
            !self.read_only.load(Ordering::SeqCst)
        }
    }
}
