use crossplay_types::canonical_name;
use std::borrow::Cow;
use std::path::PathBuf;
use thiserror::Error;

/// Names an ID space, e.g. "minecraft:block_state" or a server-pushed "minecraft:worldgen/biome".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistryKey(Cow<'static, str>);

impl RegistryKey {
    pub const BLOCK_STATE: RegistryKey = RegistryKey::from_static("minecraft:block_state");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Build a key from a possibly unqualified name; bare names get the default namespace.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.contains(':') {
            Self(Cow::Owned(name))
        } else {
            Self(Cow::Owned(format!("minecraft:{}", name)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative file path (without extension) used by snapshots and dumps.
    pub fn file_stem(&self) -> &str {
        canonical_name(&self.0)
    }
}

impl std::fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("raw id {raw_id} out of range for {registry} (size {size})")]
    OutOfRange {
        registry: RegistryKey,
        raw_id: i64,
        size: usize,
    },
    #[error("value not present in {registry}")]
    NotFound { registry: RegistryKey },
    #[error("duplicate name `{name}` in {registry}")]
    DuplicateName { registry: RegistryKey, name: String },
    #[error("{}:{line}: {message}", path.display())]
    Snapshot {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

pub(crate) fn out_of_range(registry: &RegistryKey, raw_id: i64, size: usize) -> RegistryError {
    RegistryError::OutOfRange {
        registry: registry.clone(),
        raw_id,
        size,
    }
}

/// A read-only, ID-indexed value space. Raw IDs are dense: `0..len()`.
pub trait Registry: Send + Sync {
    type Value;

    fn key(&self) -> &RegistryKey;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw ID of a value, by value identity.
    fn raw_id_of(&self, value: &Self::Value) -> RegistryResult<u32>;

    /// Value stored under a raw ID. Out-of-range IDs are an error, never clamped.
    fn value_at(&self, raw_id: u32) -> RegistryResult<&Self::Value>;

    /// Canonical name of a value: namespace-qualified, shortened for the default namespace.
    fn name_of(&self, value: &Self::Value) -> String;

    /// Raw ID of the value with the given canonical name.
    ///
    /// The default walks the registry; implementations keep an index.
    fn raw_id_by_name(&self, name: &str) -> Option<u32> {
        let name = canonical_name(name);
        (0..self.len() as u32).find(|&raw_id| {
            self.value_at(raw_id)
                .map(|value| canonical_name(&self.name_of(value)) == name)
                .unwrap_or(false)
        })
    }

    /// Values in ascending raw-ID order. Each call starts over.
    fn iter(&self) -> RegistryIter<'_, Self>
    where
        Self: Sized,
    {
        RegistryIter {
            registry: self,
            next: 0,
        }
    }

    fn named(&self, raw_id: u32) -> RegistryResult<NamedValue<'_, Self::Value>> {
        let value = self.value_at(raw_id)?;
        Ok(NamedValue {
            raw_id,
            value,
            name: self.name_of(value),
        })
    }
}

/// A registry value together with its canonical name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue<'a, V> {
    pub raw_id: u32,
    pub value: &'a V,
    pub name: String,
}

impl<V> NamedValue<'_, V> {
    /// Two values from different revisions are the same value when this matches.
    pub fn same_as<W>(&self, other: &NamedValue<'_, W>) -> bool {
        canonical_name(&self.name) == canonical_name(&other.name)
    }
}

pub struct RegistryIter<'a, R> {
    registry: &'a R,
    next: u32,
}

impl<'a, R: Registry> Iterator for RegistryIter<'a, R> {
    type Item = &'a R::Value;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next as usize >= self.registry.len() {
            return None;
        }
        let value = self.registry.value_at(self.next).ok()?;
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.registry.len().saturating_sub(self.next as usize);
        (left, Some(left))
    }
}

/// Type-erased view of a registry: raw IDs and names only.
///
/// This is all the remapper, the codec engine and the dump tooling need, so they never
/// care which concrete registry kind they are looking at.
pub trait NamedIdSpace: Send + Sync {
    fn registry_key(&self) -> &RegistryKey;

    fn entry_count(&self) -> usize;

    fn name_at(&self, raw_id: u32) -> RegistryResult<String>;

    fn id_by_name(&self, name: &str) -> Option<u32>;
}

impl<R: Registry> NamedIdSpace for R {
    fn registry_key(&self) -> &RegistryKey {
        self.key()
    }

    fn entry_count(&self) -> usize {
        self.len()
    }

    fn name_at(&self, raw_id: u32) -> RegistryResult<String> {
        let value = self.value_at(raw_id)?;
        Ok(self.name_of(value))
    }

    fn id_by_name(&self, name: &str) -> Option<u32> {
        self.raw_id_by_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_key_new() {
        assert_eq!(RegistryKey::new("item").as_str(), "minecraft:item");
        assert_eq!(RegistryKey::new("mymod:thing").as_str(), "mymod:thing");
        assert_eq!(RegistryKey::new("worldgen/biome").file_stem(), "worldgen/biome");
        assert_eq!(RegistryKey::BLOCK_STATE, RegistryKey::new("block_state"));
    }

    #[test]
    fn test_named_value_matching() {
        let a = NamedValue {
            raw_id: 5,
            value: &(),
            name: "minecraft:stone".to_string(),
        };
        let b = NamedValue {
            raw_id: 1,
            value: &0u8,
            name: "stone".to_string(),
        };
        assert!(a.same_as(&b));
    }
}
