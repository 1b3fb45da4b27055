use crate::registry::{out_of_range, Registry, RegistryError, RegistryKey, RegistryResult};
use crossplay_types::{canonical_name, Identifier};
use std::collections::HashMap;

/// One entry of a data-driven registry, as read from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicEntry {
    pub id: Identifier,
}

impl DynamicEntry {
    pub fn named(id: Identifier) -> Self {
        Self { id }
    }
}

/// A registry whose contents are only known at runtime, loaded from a snapshot.
/// Entry order is the order received, which defines the raw IDs.
#[derive(Debug, Clone)]
pub struct DynamicRegistry {
    key: RegistryKey,
    entries: Vec<DynamicEntry>,
    by_name: HashMap<String, u32>,
}

impl DynamicRegistry {
    pub fn new(key: RegistryKey, entries: Vec<DynamicEntry>) -> RegistryResult<Self> {
        let mut by_name = HashMap::with_capacity(entries.len());
        for (raw_id, entry) in entries.iter().enumerate() {
            let name = entry.id.short().into_owned();
            if by_name.insert(name.clone(), raw_id as u32).is_some() {
                return Err(RegistryError::DuplicateName {
                    registry: key,
                    name,
                });
            }
        }
        Ok(Self {
            key,
            entries,
            by_name,
        })
    }

    /// Build a registry from entry names only.
    pub fn from_names<I, S>(key: RegistryKey, names: I) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = Vec::new();
        for name in names {
            let name = name.as_ref();
            let id = name.parse::<Identifier>().map_err(|message| RegistryError::Snapshot {
                path: key.file_stem().into(),
                line: entries.len() + 1,
                message,
            })?;
            entries.push(DynamicEntry::named(id));
        }
        Self::new(key, entries)
    }

    pub fn entries(&self) -> &[DynamicEntry] {
        &self.entries
    }
}

impl Registry for DynamicRegistry {
    type Value = DynamicEntry;

    fn key(&self) -> &RegistryKey {
        &self.key
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn raw_id_of(&self, value: &DynamicEntry) -> RegistryResult<u32> {
        self.by_name
            .get(&*value.id.short())
            .copied()
            .ok_or_else(|| RegistryError::NotFound {
                registry: self.key.clone(),
            })
    }

    fn value_at(&self, raw_id: u32) -> RegistryResult<&DynamicEntry> {
        self.entries
            .get(raw_id as usize)
            .ok_or_else(|| out_of_range(&self.key, raw_id as i64, self.entries.len()))
    }

    fn name_of(&self, value: &DynamicEntry) -> String {
        value.id.short().into_owned()
    }

    fn raw_id_by_name(&self, name: &str) -> Option<u32> {
        self.by_name.get(canonical_name(name)).copied()
    }
}
