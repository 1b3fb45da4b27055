pub mod dynamic;
pub mod enums;
pub mod registry;
pub mod remap;
pub mod snapshot;
pub mod table;

pub use dynamic::{DynamicEntry, DynamicRegistry};
pub use enums::{EnumRegistry, NetworkEnum};
pub use registry::*;
pub use remap::*;
pub use snapshot::RegistrySnapshot;
pub use table::{BlockState, IndexedTable, TableEntry};
