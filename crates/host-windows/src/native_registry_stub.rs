use crate::registry::{RegistryAccess, RegistryValue};
use janus_core::{Error, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRegistry;

fn unsupported<T>() -> Result<T> {
    Err(Error::PlatformNotSupported(
        "registry access requires Windows".to_string(),
    ))
}

impl RegistryAccess for NativeRegistry {
    fn subkeys(&self, _path: &str) -> Result<Vec<String>> {
        unsupported()
    }

    fn read_string(&self, _path: &str, _name: &str) -> Result<Option<String>> {
        unsupported()
    }

    fn write_value(&self, _path: &str, _value: &RegistryValue) -> Result<()> {
        unsupported()
    }

    fn delete_value(&self, _path: &str, _name: &str) -> Result<bool> {
        unsupported()
    }

    fn enumerate_values(&self, _path: &str) -> Result<Vec<RegistryValue>> {
        unsupported()
    }

    fn can_write(&self, _path: &str) -> bool {
        false
    }
}
