use crate::registry::{
    split_root, RegistryAccess, RegistryData, RegistryValue, RootKey, REG_BINARY, REG_DWORD,
    REG_EXPAND_SZ, REG_MULTI_SZ, REG_QWORD, REG_SZ,
};
use janus_core::{Error, Result};
use std::io;
use winreg::enums::{
    RegType, HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE,
    HKEY_USERS, KEY_READ, KEY_WRITE,
};
use winreg::types::{FromRegValue, ToRegValue};
use winreg::{RegKey, RegValue};

/// The live registry, through winreg.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRegistry;

fn root_key(root: RootKey) -> RegKey {
    match root {
        RootKey::LocalMachine => RegKey::predef(HKEY_LOCAL_MACHINE),
        RootKey::CurrentUser => RegKey::predef(HKEY_CURRENT_USER),
        RootKey::ClassesRoot => RegKey::predef(HKEY_CLASSES_ROOT),
        RootKey::Users => RegKey::predef(HKEY_USERS),
        RootKey::CurrentConfig => RegKey::predef(HKEY_CURRENT_CONFIG),
    }
}

fn map_io(path: &str, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            Error::Permission(format!("registry access denied: {path}"))
        }
        _ => Error::Registry(format!("{path}: {err}")),
    }
}

fn open(path: &str, flags: u32) -> io::Result<RegKey> {
    let (root, sub) = split_root(path)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    root_key(root).open_subkey_with_flags(sub, flags)
}

fn reg_type(code: u32) -> RegType {
    match code {
        REG_EXPAND_SZ => RegType::REG_EXPAND_SZ,
        REG_BINARY => RegType::REG_BINARY,
        REG_DWORD => RegType::REG_DWORD,
        REG_MULTI_SZ => RegType::REG_MULTI_SZ,
        REG_QWORD => RegType::REG_QWORD,
        _ => RegType::REG_SZ,
    }
}

fn decode(name: String, raw: &RegValue) -> RegistryValue {
    let value_type = raw.vtype.clone() as u32;
    let data = match value_type {
        REG_SZ | REG_EXPAND_SZ => String::from_reg_value(raw).map(RegistryData::Text),
        REG_MULTI_SZ => Vec::<String>::from_reg_value(raw).map(RegistryData::Lines),
        REG_DWORD => u32::from_reg_value(raw).map(|v| RegistryData::Number(u64::from(v))),
        REG_QWORD => u64::from_reg_value(raw).map(RegistryData::Number),
        _ => Ok(RegistryData::Bytes(raw.bytes.clone())),
    }
    .unwrap_or_else(|_| RegistryData::Bytes(raw.bytes.clone()));
    RegistryValue {
        name,
        data,
        value_type,
    }
}

fn encode(value: &RegistryValue) -> Result<RegValue> {
    let bytes = match (&value.data, value.value_type) {
        (RegistryData::Text(text), _) => text.to_reg_value().bytes,
        (RegistryData::Number(n), REG_DWORD) => u32::try_from(*n)
            .map_err(|_| Error::Registry(format!("{} does not fit a DWORD", value.name)))?
            .to_reg_value()
            .bytes,
        (RegistryData::Number(n), _) => n.to_reg_value().bytes,
        (RegistryData::Lines(lines), REG_BINARY) if lines.is_empty() => Vec::new(),
        (RegistryData::Lines(lines), _) => lines.to_reg_value().bytes,
        (RegistryData::Bytes(bytes), _) => bytes.clone(),
    };
    Ok(RegValue {
        bytes,
        vtype: reg_type(value.value_type),
    })
}

impl RegistryAccess for NativeRegistry {
    fn subkeys(&self, path: &str) -> Result<Vec<String>> {
        let key = open(path, KEY_READ).map_err(|e| map_io(path, e))?;
        Ok(key.enum_keys().filter_map(|k| k.ok()).collect())
    }

    fn read_string(&self, path: &str, name: &str) -> Result<Option<String>> {
        let key = match open(path, KEY_READ) {
            Ok(key) => key,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(map_io(path, e)),
        };
        match key.get_value::<String, _>(name) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(path, e)),
        }
    }

    fn write_value(&self, path: &str, value: &RegistryValue) -> Result<()> {
        let key = open(path, KEY_WRITE).map_err(|e| map_io(path, e))?;
        let raw = encode(value)?;
        key.set_raw_value(&value.name, &raw)
            .map_err(|e| map_io(path, e))?;
        tracing::info!(path, name = %value.name, "registry value written");
        Ok(())
    }

    fn delete_value(&self, path: &str, name: &str) -> Result<bool> {
        let key = open(path, KEY_WRITE).map_err(|e| map_io(path, e))?;
        match key.delete_value(name) {
            Ok(()) => {
                tracing::info!(path, name, "registry value deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(path, e)),
        }
    }

    fn enumerate_values(&self, path: &str) -> Result<Vec<RegistryValue>> {
        let key = match open(path, KEY_READ) {
            Ok(key) => key,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(map_io(path, e)),
        };
        Ok(key
            .enum_values()
            .filter_map(|v| v.ok())
            .map(|(name, raw)| decode(name, &raw))
            .collect())
    }

    fn can_write(&self, path: &str) -> bool {
        open(path, KEY_WRITE).is_ok()
    }
}
