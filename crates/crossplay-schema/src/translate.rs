use crate::catalog::SchemaCatalog;
use crate::error::{TranslateError, TranslateResult};
use crate::schema::PacketSchema;
use crate::value::Record;
use bytes::{Buf, Bytes, BytesMut};
use crossplay_protocol_core::{codec, ConnectionState};
use crossplay_registry::{RegistryResult, RegistrySnapshot, RemapSet};
use crossplay_types::{Direction, ProtocolVersion};
use std::sync::Arc;
use tracing::{debug, trace};

/// The protocol revisions on both sides of a connection and the ID tables between them.
///
/// Built once per distinct pairing and shared by every connection that uses it.
#[derive(Debug)]
pub struct VersionPairing {
    pub server: ProtocolVersion,
    pub client: ProtocolVersion,
    /// Server numbering to client numbering.
    clientbound: RemapSet,
    /// Client numbering to server numbering.
    serverbound: RemapSet,
}

impl VersionPairing {
    pub fn new(server: &RegistrySnapshot, client: &RegistrySnapshot) -> RegistryResult<Self> {
        if server.version() == client.version() {
            return Ok(Self::identity(server.version()));
        }
        let clientbound = RemapSet::build(&server.spaces(), &client.spaces())?;
        let serverbound = RemapSet::build(&client.spaces(), &server.spaces())?;
        debug!(
            "Paired server {} with client {}: {} remapped registries",
            server.version(),
            client.version(),
            clientbound.len()
        );
        Ok(Self {
            server: server.version(),
            client: client.version(),
            clientbound,
            serverbound,
        })
    }

    /// Both sides speak `version`; IDs pass through unchanged.
    pub fn identity(version: ProtocolVersion) -> Self {
        Self {
            server: version,
            client: version,
            clientbound: RemapSet::passthrough(),
            serverbound: RemapSet::passthrough(),
        }
    }

    /// Source and target revision for packets travelling in `direction`.
    pub fn versions(&self, direction: Direction) -> (ProtocolVersion, ProtocolVersion) {
        match direction {
            Direction::Clientbound => (self.server, self.client),
            Direction::Serverbound => (self.client, self.server),
        }
    }

    pub fn ids(&self, direction: Direction) -> &RemapSet {
        match direction {
            Direction::Clientbound => &self.clientbound,
            Direction::Serverbound => &self.serverbound,
        }
    }
}

/// What became of one frame body.
#[derive(Debug)]
pub enum Outcome {
    /// Decoded and re-encoded for the receiving side.
    Translated {
        kind: &'static str,
        record: Record,
        body: BytesMut,
    },
    /// No schema, but both sides speak the same revision.
    Passthrough(Bytes),
    /// Cannot be represented on the receiving side.
    Dropped,
}

/// A frame body read on the sending side, not yet written for the receiver.
#[derive(Debug)]
pub enum Decoded<'a> {
    Packet {
        schema: &'a PacketSchema,
        id: i32,
        record: Record,
    },
    Passthrough(Bytes),
    Dropped,
}

#[derive(Clone)]
pub struct Translator {
    catalog: Arc<SchemaCatalog>,
    pairing: Arc<VersionPairing>,
}

impl Translator {
    pub fn new(catalog: Arc<SchemaCatalog>, pairing: Arc<VersionPairing>) -> Self {
        Self { catalog, pairing }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn pairing(&self) -> &VersionPairing {
        &self.pairing
    }

    /// Translate one frame body (packet ID then payload) travelling in `direction`.
    pub fn translate(
        &self,
        direction: Direction,
        state: ConnectionState,
        buf: &mut Bytes,
    ) -> TranslateResult<Outcome> {
        let decoded = self.decode(direction, state, buf)?;
        self.encode(direction, decoded)
    }

    /// Read a frame body with the sending side's schema. Consumes `buf` entirely.
    pub fn decode(
        &self,
        direction: Direction,
        state: ConnectionState,
        buf: &mut Bytes,
    ) -> TranslateResult<Decoded<'_>> {
        let frame = buf.clone();
        let id = codec::read_varint(buf).map_err(|e| TranslateError::from(e).within("packet id"))?;
        let (from, to) = self.pairing.versions(direction);

        let Some(schema) = self.catalog.lookup(state, direction, from, id) else {
            buf.advance(buf.remaining());
            if from == to {
                return Ok(Decoded::Passthrough(frame));
            }
            trace!(
                "Dropping {}/{} packet {:#04x}: no schema for protocol {}",
                state,
                direction,
                id,
                from
            );
            return Ok(Decoded::Dropped);
        };

        let record = schema.decode(buf, from, self.pairing.ids(direction))?;
        Ok(Decoded::Packet { schema, id, record })
    }

    /// Write a decoded frame for the receiving side.
    pub fn encode(&self, direction: Direction, decoded: Decoded<'_>) -> TranslateResult<Outcome> {
        let (schema, id, record) = match decoded {
            Decoded::Packet { schema, id, record } => (schema, id, record),
            Decoded::Passthrough(frame) => return Ok(Outcome::Passthrough(frame)),
            Decoded::Dropped => return Ok(Outcome::Dropped),
        };
        let (_, to) = self.pairing.versions(direction);
        let Some(target_id) = schema.id_for(to) else {
            debug!("Dropping {}: does not exist in protocol {}", schema.kind, to);
            return Ok(Outcome::Dropped);
        };
        let mut body = BytesMut::new();
        codec::write_varint(&mut body, target_id);
        schema.encode(&record, to, &mut body)?;
        trace!("{} {} {:#04x} -> {:#04x}", direction, schema.kind, id, target_id);
        Ok(Outcome::Translated {
            kind: schema.kind,
            record,
            body,
        })
    }

    /// Encode a packet originated by the proxy itself for the side receiving `direction`.
    pub fn encode_for(
        &self,
        direction: Direction,
        state: ConnectionState,
        kind: &str,
        record: &Record,
    ) -> Option<TranslateResult<BytesMut>> {
        let (_, to) = self.pairing.versions(direction);
        self.catalog.encode(state, direction, kind, record, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{field, FieldType};
    use crate::value::Value;
    use crossplay_registry::{BlockState, IndexedTable, RegistryKey};
    use crossplay_types::{Identifier, VersionRange};
    use proptest::prelude::*;

    const OLD: ProtocolVersion = ProtocolVersion::V1_19_4;
    const NEW: ProtocolVersion = ProtocolVersion::V1_20_2;

    fn widen(args: &[&Value]) -> Value {
        let flags = args[0].as_int().unwrap_or(0);
        Value::Int(flags | ((flags & 2) << 1))
    }

    fn untitled(_: &[&Value]) -> Value {
        Value::from("")
    }

    fn catalog() -> Arc<SchemaCatalog> {
        let packet = PacketSchema::new("marker", ConnectionState::Play, Direction::Clientbound)
            .id(VersionRange::until(OLD), 0x10)
            .id(VersionRange::since(NEW), 0x12)
            .field(field("entity", FieldType::VarInt))
            .field(field("flags", FieldType::UnsignedByte).introduced(&["flags"], widen))
            .field(
                field("title", FieldType::string())
                    .versions(VersionRange::since(NEW))
                    .introduced(&[], untitled),
            )
            .field(field("block", FieldType::best_effort_id(RegistryKey::BLOCK_STATE, 0)));
        let legacy = PacketSchema::new("legacy", ConnectionState::Play, Direction::Clientbound)
            .id(VersionRange::until(OLD), 0x11);
        Arc::new(
            SchemaCatalog::builder(&[OLD, NEW])
                .packet(packet)
                .packet(legacy)
                .build()
                .unwrap(),
        )
    }

    fn snapshot(version: ProtocolVersion, blocks: &[&str]) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::new(version);
        let table = IndexedTable::new(
            RegistryKey::BLOCK_STATE,
            blocks
                .iter()
                .map(|b| BlockState::new(Identifier::minecraft(*b)))
                .collect(),
        )
        .unwrap();
        snapshot.insert(Arc::new(table));
        snapshot
    }

    fn translator() -> Translator {
        let server = snapshot(OLD, &["air", "stone", "dirt"]);
        let client = snapshot(NEW, &["air", "dirt", "stone"]);
        Translator::new(catalog(), Arc::new(VersionPairing::new(&server, &client).unwrap()))
    }

    #[test]
    fn test_translate_clientbound() {
        let translator = translator();
        let mut buf = Bytes::from_static(&[0x10, 5, 0b10, 2]);
        match translator
            .translate(Direction::Clientbound, ConnectionState::Play, &mut buf)
            .unwrap()
        {
            Outcome::Translated { kind, record, body } => {
                assert_eq!(kind, "marker");
                assert_eq!(record.int("flags"), Some(0b110));
                assert_eq!(record.int("block"), Some(1));
                assert_eq!(&body[..], &[0x12, 5, 0b110, 0, 1]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_kind_missing_in_target_is_dropped() {
        let translator = translator();
        let mut buf = Bytes::from_static(&[0x11]);
        assert!(matches!(
            translator
                .translate(Direction::Clientbound, ConnectionState::Play, &mut buf)
                .unwrap(),
            Outcome::Dropped
        ));
    }

    #[test]
    fn test_unknown_packet_passthrough_only_for_same_version() {
        let translator = translator();
        let mut buf = Bytes::from_static(&[0x7a, 1, 2, 3]);
        assert!(matches!(
            translator
                .translate(Direction::Clientbound, ConnectionState::Play, &mut buf)
                .unwrap(),
            Outcome::Dropped
        ));
        assert!(buf.is_empty());

        let same = Translator::new(catalog(), Arc::new(VersionPairing::identity(NEW)));
        let mut buf = Bytes::from_static(&[0x7a, 1, 2, 3]);
        match same
            .translate(Direction::Clientbound, ConnectionState::Play, &mut buf)
            .unwrap()
        {
            Outcome::Passthrough(frame) => assert_eq!(&frame[..], &[0x7a, 1, 2, 3]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_for_uses_receiver_version() {
        let translator = translator();
        let record = Record::new()
            .with("entity", 1)
            .with("flags", 0)
            .with("block", 2);
        let body = translator
            .encode_for(Direction::Clientbound, ConnectionState::Play, "marker", &record)
            .unwrap()
            .unwrap();
        assert_eq!(&body[..], &[0x12, 1, 0, 0, 2]);
        assert!(translator
            .encode_for(Direction::Clientbound, ConnectionState::Play, "legacy", &record)
            .is_none());
    }

    proptest! {
        #[test]
        fn test_cross_version_roundtrip(entity in 0i32..1_000_000, flags in any::<u8>(), block in 0u8..3) {
            let catalog = catalog();
            let schema = catalog.get(ConnectionState::Play, Direction::Clientbound, "marker").unwrap();
            let ids = crossplay_registry::Identity;

            let mut old = BytesMut::new();
            codec::write_varint(&mut old, entity);
            old.extend_from_slice(&[flags, block]);

            let first = schema.decode(&mut old.freeze(), OLD, &ids).unwrap();
            let mut new = BytesMut::new();
            schema.encode(&first, NEW, &mut new).unwrap();
            let second = schema.decode(&mut new.clone().freeze(), NEW, &ids).unwrap();
            prop_assert_eq!(&second, &first);

            let mut again = BytesMut::new();
            schema.encode(&second, NEW, &mut again).unwrap();
            prop_assert_eq!(again, new);
        }

        #[test]
        fn test_computations_are_pure(flags in any::<u8>()) {
            let value = Value::Int(flags as i64);
            prop_assert_eq!(widen(&[&value]), widen(&[&value]));
            prop_assert_eq!(widen(&[&widen(&[&value])]), widen(&[&value]));
        }
    }
}
