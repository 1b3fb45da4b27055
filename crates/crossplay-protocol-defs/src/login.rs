use crate::MAX_CHAT_LEN;
use crossplay_protocol_core::ConnectionState;
use crossplay_schema::{field, FieldType, PacketSchema, Value};
use crossplay_types::{Direction, ProtocolVersion, VersionRange};
use uuid::Uuid;

// Clientbound
pub const DISCONNECT: i32 = 0x00;
pub const ENCRYPTION_REQUEST: i32 = 0x01;
pub const LOGIN_SUCCESS: i32 = 0x02;
pub const SET_COMPRESSION: i32 = 0x03;
pub const PLUGIN_REQUEST: i32 = 0x04;

// Serverbound
pub const LOGIN_START: i32 = 0x00;
pub const ENCRYPTION_RESPONSE: i32 = 0x01;
pub const PLUGIN_RESPONSE: i32 = 0x02;
pub const LOGIN_ACKNOWLEDGED: i32 = 0x03;

const MAX_USERNAME_LEN: usize = 16;
const MAX_SERVER_ID_LEN: usize = 20;

const OPTIONAL_UUID: VersionRange = VersionRange::until(ProtocolVersion::V1_20);
const REQUIRED_UUID: VersionRange = VersionRange::since(ProtocolVersion::V1_20_2);

fn clientbound(kind: &'static str, id: i32) -> PacketSchema {
    PacketSchema::new(kind, ConnectionState::Login, Direction::Clientbound)
        .id(VersionRange::ALL, id)
}

fn serverbound(kind: &'static str, id: i32) -> PacketSchema {
    PacketSchema::new(kind, ConnectionState::Login, Direction::Serverbound)
        .id(VersionRange::ALL, id)
}

fn some_uuid(args: &[&Value]) -> Value {
    Value::Optional(Some(Box::new(args[0].clone())))
}

fn uuid_or_nil(args: &[&Value]) -> Value {
    match args[0] {
        Value::Optional(Some(uuid)) => (**uuid).clone(),
        _ => Value::Uuid(Uuid::nil()),
    }
}

pub fn packets() -> Vec<PacketSchema> {
    vec![
        clientbound("disconnect", DISCONNECT).field(field(
            "reason",
            FieldType::String {
                max_len: MAX_CHAT_LEN,
            },
        )),
        clientbound("encryption_request", ENCRYPTION_REQUEST)
            .field(field(
                "server_id",
                FieldType::String {
                    max_len: MAX_SERVER_ID_LEN,
                },
            ))
            .field(field("public_key", FieldType::ByteArray))
            .field(field("verify_token", FieldType::ByteArray)),
        clientbound("login_success", LOGIN_SUCCESS)
            .field(field("uuid", FieldType::Uuid))
            .field(field(
                "username",
                FieldType::String {
                    max_len: MAX_USERNAME_LEN,
                },
            ))
            .field(field(
                "properties",
                FieldType::list(FieldType::Record(vec![
                    field("name", FieldType::string()),
                    field("value", FieldType::string()),
                    field("signature", FieldType::optional(FieldType::string())),
                ])),
            )),
        clientbound("set_compression", SET_COMPRESSION)
            .field(field("threshold", FieldType::VarInt)),
        clientbound("plugin_request", PLUGIN_REQUEST)
            .field(field("message_id", FieldType::VarInt))
            .field(field("channel", FieldType::string()))
            .field(field("data", FieldType::Remaining)),
        // Before 764 the UUID was optional; each layout is derived from the other.
        serverbound("login_start", LOGIN_START)
            .field(field(
                "name",
                FieldType::String {
                    max_len: MAX_USERNAME_LEN,
                },
            ))
            .field(
                field("player_uuid", FieldType::optional(FieldType::Uuid))
                    .versions(OPTIONAL_UUID)
                    .introduced(&["uuid"], some_uuid),
            )
            .field(
                field("uuid", FieldType::Uuid)
                    .versions(REQUIRED_UUID)
                    .introduced(&["player_uuid"], uuid_or_nil),
            ),
        serverbound("encryption_response", ENCRYPTION_RESPONSE)
            .field(field("shared_secret", FieldType::ByteArray))
            .field(field("verify_token", FieldType::ByteArray)),
        serverbound("plugin_response", PLUGIN_RESPONSE)
            .field(field("message_id", FieldType::VarInt))
            .field(field("data", FieldType::optional(FieldType::Remaining))),
        PacketSchema::new("login_acknowledged", ConnectionState::Login, Direction::Serverbound)
            .id(REQUIRED_UUID, LOGIN_ACKNOWLEDGED),
    ]
}
