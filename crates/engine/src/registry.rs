//! Platform capability registry: binds the engine and permission checker
//! for the running OS.

use janus_core::{Capabilities, FingerprintEngine, PermissionChecker, Platform, Result};
use janus_host_macos::MacEngine;
use janus_host_windows::{RegistryBackupStore, WindowsEngine};
use std::path::Path;
use std::sync::Arc;

/// The implementations chosen for one platform.
#[derive(Clone)]
pub struct Binding {
    pub platform: Platform,
    pub capabilities: Capabilities,
    pub engine: Arc<dyn FingerprintEngine>,
    pub permissions: Arc<dyn PermissionChecker>,
    /// Windows only.
    pub registry_backups: Option<RegistryBackupStore>,
}

impl Binding {
    pub fn new(
        platform: Platform,
        engine: Arc<dyn FingerprintEngine>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            platform,
            capabilities: Capabilities::for_platform(platform),
            engine,
            permissions,
            registry_backups: None,
        }
    }

    pub fn with_registry_backups(mut self, store: RegistryBackupStore) -> Self {
        self.registry_backups = Some(store);
        self
    }
}

/// Detects the host OS and binds its native implementations.
/// Registry-key snapshots land under `backup_dir` on Windows.
pub fn select(backup_dir: &Path) -> Result<Binding> {
    let platform = Platform::detect()?;
    tracing::debug!(%platform, "platform detected");
    bind(platform, backup_dir)
}

pub fn bind(platform: Platform, backup_dir: &Path) -> Result<Binding> {
    match platform {
        Platform::Windows => {
            let engine = WindowsEngine::native();
            let store = RegistryBackupStore::new(backup_dir, engine.registry())?;
            let permissions = engine.permissions();
            let engine = engine.with_registry_backups(store.clone());
            Ok(Binding::new(platform, Arc::new(engine), permissions).with_registry_backups(store))
        }
        Platform::MacOs => {
            let engine = MacEngine::native();
            let permissions = engine.permissions();
            Ok(Binding::new(platform, Arc::new(engine), permissions))
        }
    }
}
