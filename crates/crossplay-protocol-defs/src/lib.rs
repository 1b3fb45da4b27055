//! Packet schemas and built-in registries for the protocol revisions crossplay supports.

pub mod configuration;
pub mod enums;
pub mod login;
pub mod play;

use crossplay_schema::{SchemaCatalog, SchemaError};
use crossplay_types::ProtocolVersion;

pub use enums::{builtin_registries, BossBarColor, BossBarDivision};

pub const SUPPORTED_VERSIONS: &[ProtocolVersion] = &[
    ProtocolVersion::V1_19_4,
    ProtocolVersion::V1_20,
    ProtocolVersion::V1_20_2,
];

/// Maximum length of a JSON chat component string.
pub const MAX_CHAT_LEN: usize = 262_144;

/// Build and validate the schema catalog for every supported revision.
pub fn catalog() -> Result<SchemaCatalog, SchemaError> {
    SchemaCatalog::builder(SUPPORTED_VERSIONS)
        .packets(login::packets())
        .packets(configuration::packets())
        .packets(play::packets())
        .build()
}
