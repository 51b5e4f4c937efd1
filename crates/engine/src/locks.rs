//! Per-resource mutation locks. Acquisition is all-or-nothing and never
//! waits: a held resource is reported as busy.

use janus_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashSet;

pub fn mac_resource(adapter_id: &str) -> String {
    format!("mac:{adapter_id}")
}

pub const MACHINE_IDENTITY_RESOURCE: &str = "machine_identity";

#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<String>>,
}

/// Releases its resources on drop.
#[derive(Debug)]
pub struct ResourceGuard<'a> {
    table: &'a LockTable,
    resources: Vec<String>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, resources: &[String]) -> Result<ResourceGuard<'_>> {
        let mut held = self.held.lock();
        if let Some(busy) = resources.iter().find(|r| held.contains(*r)) {
            return Err(Error::ResourceBusy(busy.clone()));
        }
        let mut unique = Vec::with_capacity(resources.len());
        for resource in resources {
            if held.insert(resource.clone()) {
                unique.push(resource.clone());
            }
        }
        Ok(ResourceGuard {
            table: self,
            resources: unique,
        })
    }

    pub fn is_held(&self, resource: &str) -> bool {
        self.held.lock().contains(resource)
    }
}

impl Drop for ResourceGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.table.held.lock();
        for resource in &self.resources {
            held.remove(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_of_same_resource_is_busy() {
        let table = LockTable::new();
        let guard = table.acquire(&[mac_resource("eth0")]).unwrap();
        let err = table
            .acquire(&[mac_resource("wlan0"), mac_resource("eth0")])
            .unwrap_err();
        assert!(matches!(err, Error::ResourceBusy(ref r) if r == "mac:eth0"));
        // the failed attempt took nothing
        assert!(!table.is_held("mac:wlan0"));

        drop(guard);
        assert!(!table.is_held("mac:eth0"));
        assert!(table.acquire(&[mac_resource("eth0")]).is_ok());
    }

    #[test]
    fn duplicates_within_one_request_are_fine() {
        let table = LockTable::new();
        let keys = vec![
            MACHINE_IDENTITY_RESOURCE.to_string(),
            MACHINE_IDENTITY_RESOURCE.to_string(),
        ];
        let guard = table.acquire(&keys).unwrap();
        assert!(table.is_held(MACHINE_IDENTITY_RESOURCE));
        drop(guard);
        assert!(!table.is_held(MACHINE_IDENTITY_RESOURCE));
    }
}
