use crate::MAX_CHAT_LEN;
use crossplay_protocol_core::ConnectionState;
use crossplay_schema::{field, FieldType, PacketSchema};
use crossplay_types::{Direction, ProtocolVersion, VersionRange};

// Clientbound
pub const PLUGIN_MESSAGE: i32 = 0x00;
pub const DISCONNECT: i32 = 0x01;
pub const FINISH: i32 = 0x02;
pub const KEEP_ALIVE: i32 = 0x03;
pub const PING: i32 = 0x04;

// Serverbound
pub const PLUGIN_MESSAGE_SB: i32 = 0x01;
pub const FINISH_ACK: i32 = 0x02;
pub const KEEP_ALIVE_SB: i32 = 0x03;
pub const PONG: i32 = 0x04;

const CONFIGURATION: VersionRange = VersionRange::since(ProtocolVersion::V1_20_2);

fn packet(kind: &'static str, direction: Direction, id: i32) -> PacketSchema {
    PacketSchema::new(kind, ConnectionState::Configuration, direction).id(CONFIGURATION, id)
}

pub fn packets() -> Vec<PacketSchema> {
    use Direction::{Clientbound, Serverbound};
    vec![
        packet("plugin_message", Clientbound, PLUGIN_MESSAGE)
            .field(field("channel", FieldType::string()))
            .field(field("data", FieldType::Remaining)),
        packet("disconnect", Clientbound, DISCONNECT).field(field(
            "reason",
            FieldType::String {
                max_len: MAX_CHAT_LEN,
            },
        )),
        packet("finish_configuration", Clientbound, FINISH),
        packet("keep_alive", Clientbound, KEEP_ALIVE).field(field("id", FieldType::Long)),
        packet("ping", Clientbound, PING).field(field("id", FieldType::Int)),
        packet("plugin_message", Serverbound, PLUGIN_MESSAGE_SB)
            .field(field("channel", FieldType::string()))
            .field(field("data", FieldType::Remaining)),
        packet("finish_configuration", Serverbound, FINISH_ACK),
        packet("keep_alive", Serverbound, KEEP_ALIVE_SB).field(field("id", FieldType::Long)),
        packet("pong", Serverbound, PONG).field(field("id", FieldType::Int)),
    ]
}

#[cfg(test)]
mod tests {
    use crate::catalog;
    use crossplay_protocol_core::ConnectionState;
    use crossplay_types::{Direction, ProtocolVersion};

    #[test]
    fn test_configuration_exists_only_from_764() {
        let catalog = catalog().unwrap();
        let finish = catalog
            .get(ConnectionState::Configuration, Direction::Clientbound, "finish_configuration")
            .unwrap();
        assert_eq!(finish.id_for(ProtocolVersion::V1_20_2), Some(0x02));
        assert!(!finish.exists_in(ProtocolVersion::V1_20));
        assert!(catalog
            .lookup(
                ConnectionState::Configuration,
                Direction::Serverbound,
                ProtocolVersion::V1_19_4,
                0x02
            )
            .is_none());
    }
}
