use crate::registry::{out_of_range, NamedIdSpace, RegistryKey, RegistryResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of moving a raw ID from one revision's numbering to another's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remapped {
    Known(u32),
    /// The value does not exist in the target revision.
    Unknown,
}

/// Map `source_raw_id` from `source` to the raw ID `target` uses for the value of the same name.
///
/// Matching is by canonical name only; raw-ID numbering carries no meaning across revisions.
pub fn remap(
    source: &dyn NamedIdSpace,
    target: &dyn NamedIdSpace,
    source_raw_id: u32,
) -> RegistryResult<Remapped> {
    let name = source.name_at(source_raw_id)?;
    Ok(target
        .id_by_name(&name)
        .map_or(Remapped::Unknown, Remapped::Known))
}

/// A precomputed source-to-target table for one registry, built at negotiation time.
#[derive(Debug, Clone)]
pub struct IdRemap {
    key: RegistryKey,
    table: Vec<Option<u32>>,
}

impl IdRemap {
    pub fn between(source: &dyn NamedIdSpace, target: &dyn NamedIdSpace) -> RegistryResult<Self> {
        let table = (0..source.entry_count() as u32)
            .map(|raw_id| {
                remap(source, target, raw_id).map(|r| match r {
                    Remapped::Known(id) => Some(id),
                    Remapped::Unknown => None,
                })
            })
            .collect::<RegistryResult<Vec<_>>>()?;
        let remap = Self {
            key: source.registry_key().clone(),
            table,
        };
        debug!(
            "Built remap for {}: {} entries, {} without counterpart",
            remap.key,
            remap.table.len(),
            remap.unknown_count()
        );
        Ok(remap)
    }

    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    pub fn get(&self, raw_id: i32) -> RegistryResult<Remapped> {
        let slot = usize::try_from(raw_id)
            .ok()
            .and_then(|i| self.table.get(i))
            .ok_or_else(|| out_of_range(&self.key, raw_id as i64, self.table.len()))?;
        Ok(slot.map_or(Remapped::Unknown, Remapped::Known))
    }

    pub fn unknown_count(&self) -> usize {
        self.table.iter().filter(|slot| slot.is_none()).count()
    }
}

/// Translates raw identifier values while a packet is decoded.
pub trait IdTranslator: Send + Sync {
    fn translate(&self, registry: &RegistryKey, raw_id: i32) -> RegistryResult<Remapped>;
}

/// Leaves every ID as it is. Used when both sides speak the same revision.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl IdTranslator for Identity {
    fn translate(&self, registry: &RegistryKey, raw_id: i32) -> RegistryResult<Remapped> {
        u32::try_from(raw_id)
            .map(Remapped::Known)
            .map_err(|_| out_of_range(registry, raw_id as i64, 0))
    }
}

/// Remap tables for every registry of one direction of a version pairing.
///
/// An ID of a registry without a table has no known counterpart, unless the set was made
/// with [`RemapSet::passthrough`] for two sides that speak the same revision.
#[derive(Debug, Clone, Default)]
pub struct RemapSet {
    tables: HashMap<RegistryKey, IdRemap>,
    passthrough: bool,
}

impl RemapSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set that leaves IDs of untabled registries as they are.
    pub fn passthrough() -> Self {
        Self {
            tables: HashMap::new(),
            passthrough: true,
        }
    }

    /// Pair up registries by key and build a table for each pair.
    pub fn build(
        sources: &[Arc<dyn NamedIdSpace>],
        targets: &[Arc<dyn NamedIdSpace>],
    ) -> RegistryResult<Self> {
        let mut set = Self::new();
        for source in sources {
            let key = source.registry_key();
            match targets.iter().find(|t| t.registry_key() == key) {
                Some(target) => set.insert(IdRemap::between(source.as_ref(), target.as_ref())?),
                None => warn!("No target registry for {}, its ids have no counterpart", key),
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, remap: IdRemap) {
        self.tables.insert(remap.key().clone(), remap);
    }

    pub fn get(&self, key: &RegistryKey) -> Option<&IdRemap> {
        self.tables.get(key)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl IdTranslator for RemapSet {
    fn translate(&self, registry: &RegistryKey, raw_id: i32) -> RegistryResult<Remapped> {
        match self.tables.get(registry) {
            Some(table) => table.get(raw_id),
            None if self.passthrough => Identity.translate(registry, raw_id),
            None => Ok(Remapped::Unknown),
        }
    }
}

impl<T: IdTranslator + ?Sized> IdTranslator for Arc<T> {
    fn translate(&self, registry: &RegistryKey, raw_id: i32) -> RegistryResult<Remapped> {
        (**self).translate(registry, raw_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockState, DynamicRegistry, IndexedTable, Registry, RegistryError};
    use crossplay_types::Identifier;
    use proptest::prelude::*;

    fn states(names: &[&str]) -> IndexedTable<BlockState> {
        IndexedTable::new(
            RegistryKey::BLOCK_STATE,
            names
                .iter()
                .map(|n| BlockState::parse(n).unwrap())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_remap_by_name() {
        let source = states(&["air", "granite", "stone"]);
        let target = states(&["air", "stone", "granite", "diorite"]);
        assert_eq!(remap(&source, &target, 2).unwrap(), Remapped::Known(1));
        assert_eq!(remap(&source, &target, 1).unwrap(), Remapped::Known(2));
        assert_eq!(remap(&source, &target, 0).unwrap(), Remapped::Known(0));
    }

    #[test]
    fn test_missing_value_is_unknown() {
        let source = states(&["air", "granite", "diorite", "andesite", "dirt", "minecraft:stone"]);
        assert_eq!(source.raw_id_by_name("minecraft:stone"), Some(5));
        let target = states(&["air", "granite", "diorite", "andesite", "dirt"]);
        assert_eq!(remap(&source, &target, 5).unwrap(), Remapped::Unknown);
    }

    #[test]
    fn test_out_of_range_source_is_error() {
        let source = states(&["air"]);
        let target = states(&["air"]);
        assert!(matches!(
            remap(&source, &target, 1),
            Err(RegistryError::OutOfRange { .. })
        ));
        let table = IdRemap::between(&source, &target).unwrap();
        assert!(table.get(-1).is_err());
        assert!(table.get(1).is_err());
        assert_eq!(table.get(0).unwrap(), Remapped::Known(0));
    }

    #[test]
    fn test_remap_across_registry_kinds() {
        let source = states(&["air", "stone"]);
        let target = DynamicRegistry::from_names(
            RegistryKey::BLOCK_STATE,
            ["minecraft:stone", "minecraft:air"],
        )
        .unwrap();
        assert_eq!(remap(&source, &target, 0).unwrap(), Remapped::Known(1));
    }

    #[test]
    fn test_unmapped_registry_has_no_counterpart() {
        let source: Arc<dyn NamedIdSpace> = Arc::new(states(&["air", "stone"]));
        let target: Arc<dyn NamedIdSpace> = Arc::new(states(&["stone", "air"]));
        let set = RemapSet::build(&[source], &[target]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.translate(&RegistryKey::BLOCK_STATE, 1).unwrap(),
            Remapped::Known(0)
        );
        let item = RegistryKey::new("item");
        assert_eq!(set.translate(&item, 42).unwrap(), Remapped::Unknown);
    }

    #[test]
    fn test_registry_missing_on_one_side_has_no_counterpart() {
        let source: Arc<dyn NamedIdSpace> = Arc::new(states(&["air", "stone", "granite"]));
        let set = RemapSet::build(&[source], &[]).unwrap();
        assert!(set.is_empty());
        assert_eq!(
            set.translate(&RegistryKey::BLOCK_STATE, 2).unwrap(),
            Remapped::Unknown
        );
    }

    #[test]
    fn test_passthrough_set_keeps_ids() {
        let set = RemapSet::passthrough();
        let item = RegistryKey::new("item");
        assert_eq!(set.translate(&item, 42).unwrap(), Remapped::Known(42));
        assert!(set.translate(&item, -3).is_err());
    }

    #[test]
    fn test_unknown_count() {
        let source = states(&["air", "stone", "grass_block"]);
        let target = states(&["air"]);
        let table = IdRemap::between(&source, &target).unwrap();
        assert_eq!(table.unknown_count(), 2);
    }

    proptest! {
        #[test]
        fn test_value_at_raw_id_of_roundtrip(names in prop::collection::hash_set("[a-z_]{1,12}", 1..48)) {
            let names: Vec<String> = names.into_iter().collect();
            let table = IndexedTable::new(
                RegistryKey::new("item"),
                names.iter().map(|n| Identifier::minecraft(n.as_str())).collect(),
            ).unwrap();
            for value in table.iter() {
                let raw_id = table.raw_id_of(value).unwrap();
                prop_assert_eq!(table.value_at(raw_id).unwrap(), value);
            }
        }

        #[test]
        fn test_dynamic_registry_roundtrip(
            names in prop::collection::hash_set("[a-z_]{1,12}", 1..48),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let reg =
                DynamicRegistry::from_names(RegistryKey::new("worldgen/biome"), &names).unwrap();
            for (raw_id, value) in reg.iter().enumerate() {
                prop_assert_eq!(reg.raw_id_of(value).unwrap(), raw_id as u32);
                prop_assert_eq!(reg.value_at(raw_id as u32).unwrap(), value);
                prop_assert_eq!(reg.raw_id_by_name(&reg.name_of(value)), Some(raw_id as u32));
            }
        }

        #[test]
        fn test_remap_is_name_stable(
            names in prop::collection::hash_set("[a-z_]{1,12}", 1..48),
            order in prop::collection::vec(any::<u32>(), 48),
        ) {
            let source_names: Vec<String> = names.into_iter().collect();
            let mut target_names: Vec<(u32, String)> = source_names
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, n)| (order[i], n))
                .collect();
            target_names.sort();
            let source = DynamicRegistry::from_names(RegistryKey::new("item"), &source_names).unwrap();
            let target = DynamicRegistry::from_names(
                RegistryKey::new("item"),
                target_names.iter().map(|(_, n)| n),
            ).unwrap();
            for name in &source_names {
                let source_id = source.raw_id_by_name(name).unwrap();
                prop_assert_eq!(
                    remap(&source, &target, source_id).unwrap(),
                    Remapped::Known(target.raw_id_by_name(name).unwrap())
                );
            }
        }
    }
}
