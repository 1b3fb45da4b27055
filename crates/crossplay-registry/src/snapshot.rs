use crate::dynamic::{DynamicEntry, DynamicRegistry};
use crate::registry::{NamedIdSpace, RegistryError, RegistryKey, RegistryResult};
use crate::table::{BlockState, IndexedTable};
use crossplay_types::{Identifier, ProtocolVersion};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const HEADER: &str = "id name";
const EXTENSION: &str = "txt";

/// All registries of one protocol revision, keyed by registry name.
#[derive(Clone)]
pub struct RegistrySnapshot {
    version: ProtocolVersion,
    registries: BTreeMap<RegistryKey, Arc<dyn NamedIdSpace>>,
}

impl RegistrySnapshot {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            registries: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn insert(&mut self, registry: Arc<dyn NamedIdSpace>) {
        self.registries
            .insert(registry.registry_key().clone(), registry);
    }

    pub fn get(&self, key: &RegistryKey) -> Option<&Arc<dyn NamedIdSpace>> {
        self.registries.get(key)
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn NamedIdSpace>> {
        self.registries.values()
    }

    /// Shared handles to every registry, for building remap tables.
    pub fn spaces(&self) -> Vec<Arc<dyn NamedIdSpace>> {
        self.registries.values().cloned().collect()
    }

    /// Load `<root>/<protocol>/**/*.txt`. A missing version directory yields an empty snapshot.
    pub fn load_dir(root: &Path, version: ProtocolVersion) -> RegistryResult<Self> {
        let dir = root.join(version.number().to_string());
        let mut snapshot = Self::new(version);
        if !dir.is_dir() {
            warn!(
                "No registry snapshot for protocol {} at {}, its ids cannot be remapped",
                version,
                dir.display()
            );
            return Ok(snapshot);
        }

        let mut files = Vec::new();
        collect_files(&dir, &mut files)?;
        files.sort();
        for path in files {
            let relative = path
                .strip_prefix(&dir)
                .unwrap_or(&path)
                .with_extension("");
            let stem = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let key = RegistryKey::new(stem);
            let text = fs::read_to_string(&path)?;
            let names = parse_table(&path, &text)?;
            let registry = build_registry(&path, key.clone(), names)?;
            debug!("Loaded {} ({} entries) from {}", key, registry.entry_count(), path.display());
            snapshot.insert(registry);
        }
        info!(
            "Loaded {} registries for protocol {}",
            snapshot.len(),
            version
        );
        Ok(snapshot)
    }

    /// Write every registry to `<root>/<protocol>/<registry path>.txt`.
    pub fn dump(&self, root: &Path) -> RegistryResult<()> {
        let dir = root.join(self.version.number().to_string());
        for registry in self.registries.values() {
            let path = dir
                .join(registry.registry_key().file_stem())
                .with_extension(EXTENSION);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = BufWriter::new(fs::File::create(&path)?);
            write_table(&mut out, registry.as_ref())?;
            out.flush()?;
        }
        info!(
            "Dumped {} registries for protocol {} to {}",
            self.registries.len(),
            self.version,
            dir.display()
        );
        Ok(())
    }
}

impl std::fmt::Debug for RegistrySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySnapshot")
            .field("version", &self.version)
            .field("registries", &self.registries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Write one registry as a flat `rawId name` table.
pub fn write_table(out: &mut impl Write, registry: &dyn NamedIdSpace) -> RegistryResult<()> {
    writeln!(out, "{}", HEADER)?;
    for raw_id in 0..registry.entry_count() as u32 {
        writeln!(out, "{} {}", raw_id, registry.name_at(raw_id)?)?;
    }
    Ok(())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}

fn malformed(path: &Path, line: usize, message: impl Into<String>) -> RegistryError {
    RegistryError::Snapshot {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}

/// Parse the dump format. Raw IDs must be dense and ascending from zero.
fn parse_table<'a>(path: &Path, text: &'a str) -> RegistryResult<Vec<(usize, &'a str)>> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    match lines.next() {
        Some((_, HEADER)) => {}
        Some((line, other)) => {
            return Err(malformed(path, line, format!("expected header `{}`, found `{}`", HEADER, other)))
        }
        None => return Err(malformed(path, 1, "empty registry file")),
    }

    let mut names = Vec::new();
    for (line, content) in lines {
        let (id, name) = content
            .split_once(' ')
            .ok_or_else(|| malformed(path, line, "expected `<raw id> <name>`"))?;
        let id: usize = id
            .parse()
            .map_err(|_| malformed(path, line, format!("invalid raw id `{}`", id)))?;
        if id != names.len() {
            return Err(malformed(
                path,
                line,
                format!("raw id {} out of sequence, expected {}", id, names.len()),
            ));
        }
        names.push((line, name.trim()));
    }
    Ok(names)
}

fn build_registry(
    path: &Path,
    key: RegistryKey,
    names: Vec<(usize, &str)>,
) -> RegistryResult<Arc<dyn NamedIdSpace>> {
    if key == RegistryKey::BLOCK_STATE {
        let states = names
            .into_iter()
            .map(|(line, name)| BlockState::parse(name).map_err(|e| malformed(path, line, e)))
            .collect::<RegistryResult<Vec<_>>>()?;
        return Ok(Arc::new(IndexedTable::new(key, states)?));
    }
    let entries = names
        .into_iter()
        .map(|(line, name)| {
            name.parse::<Identifier>()
                .map(DynamicEntry::named)
                .map_err(|e| malformed(path, line, e))
        })
        .collect::<RegistryResult<Vec<_>>>()?;
    Ok(Arc::new(DynamicRegistry::new(key, entries)?))
}
