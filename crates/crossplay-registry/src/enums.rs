use crate::registry::{out_of_range, Registry, RegistryKey, RegistryResult};
use crossplay_types::canonical_name;
use std::marker::PhantomData;

/// A closed enumeration sent over the wire as its ordinal.
pub trait NetworkEnum: Copy + Eq + Send + Sync + 'static {
    /// All values, in ordinal order.
    const VALUES: &'static [Self];

    fn name(self) -> &'static str;

    fn ordinal(self) -> usize;
}

/// Declare a [`NetworkEnum`] together with the wire names of its values.
#[macro_export]
macro_rules! network_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident => $wire:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),*
        }

        impl $crate::NetworkEnum for $name {
            const VALUES: &'static [Self] = &[$($name::$variant),*];

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),*
                }
            }

            fn ordinal(self) -> usize {
                self as usize
            }
        }
    };
}

/// Registry view over a [`NetworkEnum`]: raw ID is the ordinal, name is the wire name.
pub struct EnumRegistry<E: NetworkEnum> {
    key: RegistryKey,
    _marker: PhantomData<E>,
}

impl<E: NetworkEnum> EnumRegistry<E> {
    pub fn new(key: RegistryKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }
}

impl<E: NetworkEnum> Registry for EnumRegistry<E> {
    type Value = E;

    fn key(&self) -> &RegistryKey {
        &self.key
    }

    fn len(&self) -> usize {
        E::VALUES.len()
    }

    fn raw_id_of(&self, value: &E) -> RegistryResult<u32> {
        Ok(value.ordinal() as u32)
    }

    fn value_at(&self, raw_id: u32) -> RegistryResult<&E> {
        E::VALUES
            .get(raw_id as usize)
            .ok_or_else(|| out_of_range(&self.key, raw_id as i64, E::VALUES.len()))
    }

    fn name_of(&self, value: &E) -> String {
        value.name().to_string()
    }

    fn raw_id_by_name(&self, name: &str) -> Option<u32> {
        let name = canonical_name(name);
        E::VALUES
            .iter()
            .find(|v| v.name() == name)
            .map(|v| v.ordinal() as u32)
    }
}
