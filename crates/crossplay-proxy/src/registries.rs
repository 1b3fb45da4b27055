use anyhow::{anyhow, Result};
use crossplay_registry::{RegistryKey, RegistrySnapshot};
use crossplay_schema::VersionPairing;
use crossplay_types::ProtocolVersion;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Registry snapshots of every supported revision, plus the pairings built from them.
pub struct Registries {
    snapshots: HashMap<ProtocolVersion, RegistrySnapshot>,
    pairings: Mutex<HashMap<(ProtocolVersion, ProtocolVersion), Arc<VersionPairing>>>,
}

impl Registries {
    /// Load `<root>/<protocol>/` for each version and add the compiled-in registries.
    pub fn load(root: &Path, versions: &[ProtocolVersion]) -> Result<Self> {
        let mut snapshots = HashMap::new();
        for &version in versions {
            let mut snapshot = RegistrySnapshot::load_dir(root, version)?;
            for registry in crossplay_protocol_defs::builtin_registries() {
                snapshot.insert(registry);
            }
            info!("Protocol {}: {} registries", version, snapshot.len());
            snapshots.insert(version, snapshot);
        }
        Ok(Self {
            snapshots,
            pairings: Mutex::new(HashMap::new()),
        })
    }

    pub fn snapshot(&self, version: ProtocolVersion) -> Option<&RegistrySnapshot> {
        self.snapshots.get(&version)
    }

    /// Write the snapshot registries (not the compiled-in ones) in the snapshot format.
    pub fn dump(&self, root: &Path) -> Result<()> {
        let builtin: Vec<RegistryKey> = crossplay_protocol_defs::builtin_registries()
            .iter()
            .map(|r| r.registry_key().clone())
            .collect();
        let mut versions: Vec<_> = self.snapshots.keys().copied().collect();
        versions.sort();
        for version in versions {
            let Some(snapshot) = self.snapshots.get(&version) else {
                continue;
            };
            let mut on_disk = RegistrySnapshot::new(version);
            for registry in snapshot.iter().filter(|r| !builtin.contains(r.registry_key())) {
                on_disk.insert(registry.clone());
            }
            on_disk.dump(root)?;
        }
        Ok(())
    }

    /// The pairing for a server/client combination, built on first use.
    pub fn pairing(
        &self,
        server: ProtocolVersion,
        client: ProtocolVersion,
    ) -> Result<Arc<VersionPairing>> {
        let mut pairings = self.pairings.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pairing) = pairings.get(&(server, client)) {
            return Ok(pairing.clone());
        }
        let server_snapshot = self
            .snapshot(server)
            .ok_or_else(|| anyhow!("No registries for protocol {}", server))?;
        let client_snapshot = self
            .snapshot(client)
            .ok_or_else(|| anyhow!("No registries for protocol {}", client))?;
        let pairing = Arc::new(VersionPairing::new(server_snapshot, client_snapshot)?);
        debug!("Built pairing server={} client={}", server, client);
        pairings.insert((server, client), pairing.clone());
        Ok(pairing)
    }
}
