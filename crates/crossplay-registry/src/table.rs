use crate::registry::{out_of_range, Registry, RegistryError, RegistryKey, RegistryResult};
use crossplay_types::{canonical_name, Identifier};
use std::collections::HashMap;
use std::hash::Hash;

/// A value that can live in an [`IndexedTable`].
pub trait TableEntry: Clone + Eq + Hash + Send + Sync {
    fn canonical_name(&self) -> String;
}

/// A block state: a block plus its property assignments, e.g. `oak_log[axis=y]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockState {
    pub block: Identifier,
    /// Property name/value pairs in the block's declaration order.
    pub properties: Vec<(String, String)>,
}

impl BlockState {
    pub fn new(block: Identifier) -> Self {
        Self {
            block,
            properties: Vec::new(),
        }
    }

    pub fn with(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((property.into(), value.into()));
        self
    }

    /// Parse the string form produced by `Display`: `name` or `name[k=v,k=v]`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (block, props) = match s.split_once('[') {
            Some((block, rest)) => {
                let props = rest
                    .strip_suffix(']')
                    .ok_or_else(|| format!("unterminated property list in {}", s))?;
                (block, Some(props))
            }
            None => (s, None),
        };
        let mut state = BlockState::new(block.parse()?);
        if let Some(props) = props {
            for prop in props.split(',').filter(|p| !p.is_empty()) {
                let (k, v) = prop
                    .split_once('=')
                    .ok_or_else(|| format!("malformed property `{}` in {}", prop, s))?;
                state = state.with(k, v);
            }
        }
        Ok(state)
    }
}

impl std::fmt::Display for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.block.short())?;
        if self.properties.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, (k, v)) in self.properties.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str("]")
    }
}

impl TableEntry for BlockState {
    fn canonical_name(&self) -> String {
        self.to_string()
    }
}

impl TableEntry for Identifier {
    fn canonical_name(&self) -> String {
        self.short().into_owned()
    }
}

/// An index-keyed table, such as the block-state ID table of one protocol revision.
#[derive(Debug, Clone)]
pub struct IndexedTable<T: TableEntry> {
    key: RegistryKey,
    values: Vec<T>,
    by_value: HashMap<T, u32>,
    by_name: HashMap<String, u32>,
}

impl<T: TableEntry> IndexedTable<T> {
    /// Build a table; position in `values` becomes the raw ID.
    pub fn new(key: RegistryKey, values: Vec<T>) -> RegistryResult<Self> {
        let mut by_value = HashMap::with_capacity(values.len());
        let mut by_name = HashMap::with_capacity(values.len());
        for (raw_id, value) in values.iter().enumerate() {
            let name = value.canonical_name();
            if by_name.insert(name.clone(), raw_id as u32).is_some() {
                return Err(RegistryError::DuplicateName {
                    registry: key,
                    name,
                });
            }
            by_value.insert(value.clone(), raw_id as u32);
        }
        Ok(Self {
            key,
            values,
            by_value,
            by_name,
        })
    }
}

impl<T: TableEntry> Registry for IndexedTable<T> {
    type Value = T;

    fn key(&self) -> &RegistryKey {
        &self.key
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn raw_id_of(&self, value: &T) -> RegistryResult<u32> {
        self.by_value
            .get(value)
            .copied()
            .ok_or_else(|| RegistryError::NotFound {
                registry: self.key.clone(),
            })
    }

    fn value_at(&self, raw_id: u32) -> RegistryResult<&T> {
        self.values
            .get(raw_id as usize)
            .ok_or_else(|| out_of_range(&self.key, raw_id as i64, self.values.len()))
    }

    fn name_of(&self, value: &T) -> String {
        value.canonical_name()
    }

    fn raw_id_by_name(&self, name: &str) -> Option<u32> {
        self.by_name.get(canonical_name(name)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks() -> IndexedTable<BlockState> {
        IndexedTable::new(
            RegistryKey::BLOCK_STATE,
            vec![
                BlockState::new(Identifier::minecraft("air")),
                BlockState::new(Identifier::minecraft("stone")),
                BlockState::new(Identifier::minecraft("oak_log")).with("axis", "x"),
                BlockState::new(Identifier::minecraft("oak_log")).with("axis", "y"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_block_state_display_and_parse() {
        let state = BlockState::new(Identifier::minecraft("oak_stairs"))
            .with("facing", "north")
            .with("half", "top");
        let s = state.to_string();
        assert_eq!(s, "oak_stairs[facing=north,half=top]");
        assert_eq!(BlockState::parse(&s).unwrap(), state);
        assert_eq!(
            BlockState::parse("minecraft:stone").unwrap(),
            BlockState::new(Identifier::minecraft("stone"))
        );
        assert!(BlockState::parse("stone[axis=y").is_err());
        assert!(BlockState::parse("stone[axis]").is_err());
    }

    #[test]
    fn test_table_lookups() {
        let table = blocks();
        assert_eq!(table.len(), 4);
        let log_y = BlockState::new(Identifier::minecraft("oak_log")).with("axis", "y");
        assert_eq!(table.raw_id_of(&log_y).unwrap(), 3);
        assert_eq!(table.value_at(3).unwrap(), &log_y);
        assert_eq!(table.raw_id_by_name("minecraft:stone"), Some(1));
        assert_eq!(table.raw_id_by_name("oak_log[axis=x]"), Some(2));
        assert_eq!(table.raw_id_by_name("dirt"), None);
    }

    #[test]
    fn test_value_at_out_of_range_is_error() {
        let table = blocks();
        assert!(matches!(
            table.value_at(4),
            Err(RegistryError::OutOfRange { raw_id: 4, size: 4, .. })
        ));
    }

    #[test]
    fn test_raw_id_of_missing_value() {
        let table = blocks();
        let dirt = BlockState::new(Identifier::minecraft("dirt"));
        assert!(matches!(table.raw_id_of(&dirt), Err(RegistryError::NotFound { .. })));
    }

    #[test]
    fn test_iter_is_ordered_and_restartable() {
        let table = blocks();
        let first: Vec<String> = table.iter().map(|v| v.to_string()).collect();
        let second: Vec<String> = table.iter().map(|v| v.to_string()).collect();
        assert_eq!(first, vec!["air", "stone", "oak_log[axis=x]", "oak_log[axis=y]"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = IndexedTable::new(
            RegistryKey::BLOCK_STATE,
            vec![
                BlockState::new(Identifier::minecraft("stone")),
                BlockState::new(Identifier::minecraft("stone")),
            ],
        );
        assert!(matches!(result, Err(RegistryError::DuplicateName { .. })));
    }
}
