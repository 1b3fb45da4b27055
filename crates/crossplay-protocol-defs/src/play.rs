use crate::enums::{BOSS_BAR_COLOR, BOSS_BAR_DIVISION};
use crate::MAX_CHAT_LEN;
use crossplay_protocol_core::ConnectionState;
use crossplay_registry::RegistryKey;
use crossplay_schema::{field, FieldType, PacketSchema, Value, Variant, VariantGroup};
use crossplay_types::{Direction, ProtocolVersion, VersionRange};

const BEFORE_CONFIGURATION: VersionRange = VersionRange::until(ProtocolVersion::V1_20);
const WITH_CONFIGURATION: VersionRange = VersionRange::since(ProtocolVersion::V1_20_2);

// Clientbound (until 763, since 764)
pub const BLOCK_UPDATE: (i32, i32) = (0x0A, 0x09);
pub const BOSS_BAR: (i32, i32) = (0x0B, 0x0A);
pub const PLUGIN_MESSAGE: (i32, i32) = (0x17, 0x18);
pub const DISCONNECT: (i32, i32) = (0x1A, 0x1B);
pub const KEEP_ALIVE: (i32, i32) = (0x23, 0x24);
pub const PING: (i32, i32) = (0x32, 0x33);
pub const START_CONFIGURATION: i32 = 0x65;

// Serverbound (until 763, since 764)
pub const PLUGIN_MESSAGE_SB: (i32, i32) = (0x0D, 0x0F);
pub const KEEP_ALIVE_SB: (i32, i32) = (0x12, 0x14);
pub const CONFIGURATION_ACKNOWLEDGED: i32 = 0x0B;

/// Channel the server announces its brand on.
pub const BRAND_CHANNEL: &str = "minecraft:brand";

/// Block state sent in place of one the target revision does not have.
const AIR: i32 = 0;

fn packet(kind: &'static str, direction: Direction, (old, new): (i32, i32)) -> PacketSchema {
    PacketSchema::new(kind, ConnectionState::Play, direction)
        .id(BEFORE_CONFIGURATION, old)
        .id(WITH_CONFIGURATION, new)
}

fn chat() -> FieldType {
    FieldType::String {
        max_len: MAX_CHAT_LEN,
    }
}

/// Bit 1 (play music) also sets bit 2 (create fog).
fn widen_boss_bar_flags(args: &[&Value]) -> Value {
    let flags = args[0].as_int().unwrap_or(0);
    Value::Int(flags | ((flags & 0x02) << 1))
}

fn boss_bar_flags() -> crossplay_schema::FieldDescriptor {
    field("flags", FieldType::UnsignedByte).introduced(&["flags"], widen_boss_bar_flags)
}

fn boss_bar_action() -> VariantGroup {
    let color = || field("color", FieldType::id(BOSS_BAR_COLOR));
    let division = || field("division", FieldType::id(BOSS_BAR_DIVISION));
    VariantGroup::new(FieldType::VarInt)
        .variant(Variant::new(
            0,
            "add",
            vec![
                field("title", chat()),
                field("health", FieldType::Float),
                color(),
                division(),
                boss_bar_flags(),
            ],
        ))
        .variant(Variant::new(1, "remove", vec![]))
        .variant(Variant::new(
            2,
            "update_health",
            vec![field("health", FieldType::Float)],
        ))
        .variant(Variant::new(3, "update_title", vec![field("title", chat())]))
        .variant(Variant::new(4, "update_style", vec![color(), division()]))
        .variant(Variant::new(5, "update_flags", vec![boss_bar_flags()]))
}

pub fn packets() -> Vec<PacketSchema> {
    use Direction::{Clientbound, Serverbound};
    vec![
        packet("block_update", Clientbound, BLOCK_UPDATE)
            .field(field("location", FieldType::Position))
            .field(field(
                "block_state",
                FieldType::best_effort_id(RegistryKey::BLOCK_STATE, AIR),
            )),
        packet("boss_bar", Clientbound, BOSS_BAR)
            .field(field("uuid", FieldType::Uuid))
            .field(field("action", boss_bar_action().into())),
        packet("plugin_message", Clientbound, PLUGIN_MESSAGE)
            .field(field("channel", FieldType::string()))
            .field(field("data", FieldType::Remaining)),
        packet("disconnect", Clientbound, DISCONNECT).field(field("reason", chat())),
        packet("keep_alive", Clientbound, KEEP_ALIVE).field(field("id", FieldType::Long)),
        packet("ping", Clientbound, PING).field(field("id", FieldType::Int)),
        PacketSchema::new("start_configuration", ConnectionState::Play, Clientbound)
            .id(WITH_CONFIGURATION, START_CONFIGURATION),
        packet("plugin_message", Serverbound, PLUGIN_MESSAGE_SB)
            .field(field("channel", FieldType::string()))
            .field(field("data", FieldType::Remaining)),
        packet("keep_alive", Serverbound, KEEP_ALIVE_SB).field(field("id", FieldType::Long)),
        PacketSchema::new("configuration_acknowledged", ConnectionState::Play, Serverbound)
            .id(WITH_CONFIGURATION, CONFIGURATION_ACKNOWLEDGED),
    ]
}
