use anyhow::Result;
use bytes::Bytes;
use crossplay_diagnostics::{decode_capture, Containment, FaultScope};
use crossplay_protocol_core::ConnectionState;
use crossplay_schema::{Outcome, TranslateError, Translator};
use crossplay_types::Direction;

/// Translation for one direction of one connection, run inside the fault containment.
pub struct Pipeline {
    direction: Direction,
    translator: Translator,
    containment: Containment,
    scope: FaultScope,
}

impl Pipeline {
    pub fn new(direction: Direction, translator: Translator, containment: Containment) -> Self {
        Self {
            direction,
            translator,
            containment,
            scope: FaultScope::new(),
        }
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Translate one frame body.
    ///
    /// The frame is wrapped as a whole, and the decode and encode stages are wrapped again
    /// inside it, all in one scope. `Ok(None)` means the packet faulted and the fault was
    /// swallowed; the caller sends nothing and carries on.
    pub fn process(
        &mut self,
        state: ConnectionState,
        mut frame: Bytes,
    ) -> Result<Option<Outcome>, TranslateError> {
        let direction = self.direction;
        let translator = &self.translator;
        let containment = &self.containment;
        let frame_stage = |scope: &mut FaultScope,
                           buf: &mut Bytes|
         -> Result<Option<Outcome>, TranslateError> {
            let decoded = containment.wrap(scope, direction, buf, |_, buf| {
                translator.decode(direction, state, buf)
            })?;
            let Some(decoded) = decoded else {
                return Ok(None);
            };
            containment.wrap(scope, direction, buf, |_, _| {
                translator.encode(direction, decoded)
            })
        };
        let outcome = containment.wrap(&mut self.scope, direction, &mut frame, frame_stage)?;
        Ok(outcome.flatten())
    }

    /// Feed a frame body from a report's capture line through the clientbound path, as if
    /// the server had just sent it.
    pub fn inject_inbound(
        &mut self,
        state: ConnectionState,
        capture: &str,
    ) -> Result<Option<Outcome>> {
        anyhow::ensure!(
            self.direction == Direction::Clientbound,
            "captures are replayed on the clientbound pipeline"
        );
        let frame = Bytes::from(decode_capture(capture)?);
        Ok(self.process(state, frame)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use crossplay_diagnostics::{
        ContainmentMode, DiagnosticSink, PacketReport, ReportContext, CAPTURE_PREFIX,
    };
    use crossplay_protocol_core::codec::{write_uuid, write_varint};
    use crossplay_registry::RegistrySnapshot;
    use crossplay_schema::{field, FieldType, PacketSchema, SchemaCatalog, VersionPairing};
    use crossplay_types::{ProtocolVersion, VersionRange};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Collect(Mutex<Vec<PacketReport>>);

    impl DiagnosticSink for Collect {
        fn emit(&self, report: PacketReport) {
            self.0.lock().unwrap().push(report);
        }
    }

    fn pipeline(mode: ContainmentMode, sink: Arc<Collect>) -> Pipeline {
        pipeline_with(crossplay_protocol_defs::catalog().unwrap(), mode, sink)
    }

    fn pipeline_with(
        catalog: SchemaCatalog,
        mode: ContainmentMode,
        sink: Arc<Collect>,
    ) -> Pipeline {
        let mut server = RegistrySnapshot::new(ProtocolVersion::V1_20);
        let mut client = RegistrySnapshot::new(ProtocolVersion::V1_20_2);
        for registry in crossplay_protocol_defs::builtin_registries() {
            server.insert(registry.clone());
            client.insert(registry);
        }
        let translator = Translator::new(
            Arc::new(catalog),
            Arc::new(VersionPairing::new(&server, &client).unwrap()),
        );
        let containment = Containment::new(
            mode,
            ReportContext {
                server: ProtocolVersion::V1_20,
                client: ProtocolVersion::V1_20_2,
                peer: Arc::new("vanilla".to_string()),
            },
            sink,
        );
        Pipeline::new(Direction::Clientbound, translator, containment)
    }

    /// A boss bar packet with an action the schema does not know.
    fn bad_boss_bar() -> Bytes {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 0x0B);
        write_uuid(&mut buf, &Default::default());
        write_varint(&mut buf, 99);
        buf.extend_from_slice(&[1, 2, 3]);
        buf.freeze()
    }

    #[test]
    fn test_fault_aborts_with_one_report() {
        let sink = Arc::new(Collect::default());
        let mut pipeline = pipeline(ContainmentMode::Abort, sink.clone());
        let err = pipeline
            .process(ConnectionState::Play, bad_boss_bar())
            .unwrap_err();
        assert!(matches!(err, TranslateError::UnknownVariant { tag: 99, .. }));
        // Seen by the decode stage and the frame wrapper, reported once.
        assert_eq!(sink.0.lock().unwrap().len(), 1);
        assert!(pipeline.scope.is_idle());
        assert!(!pipeline.scope.reported());
    }

    #[test]
    fn test_encode_fault_reported_once() {
        // `level` narrows to a byte on the newer side, so 300 decodes but cannot be written.
        let catalog = SchemaCatalog::builder(&[ProtocolVersion::V1_20, ProtocolVersion::V1_20_2])
            .packet(
                PacketSchema::new("level", ConnectionState::Play, Direction::Clientbound)
                    .id(VersionRange::ALL, 0x30)
                    .field(
                        field("level", FieldType::VarInt)
                            .versions(VersionRange::until(ProtocolVersion::V1_20)),
                    )
                    .field(
                        field("level", FieldType::UnsignedByte)
                            .versions(VersionRange::since(ProtocolVersion::V1_20_2)),
                    ),
            )
            .build()
            .unwrap();
        let sink = Arc::new(Collect::default());
        let mut pipeline = pipeline_with(catalog, ContainmentMode::Abort, sink.clone());
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 0x30);
        write_varint(&mut buf, 300);
        let err = pipeline
            .process(ConnectionState::Play, buf.freeze())
            .unwrap_err();
        assert!(matches!(err, TranslateError::OutOfRange { value: 300, .. }));
        let reports = sink.0.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].lines.contains(&format!("Error: {}", err)));
        assert!(pipeline.scope.is_idle());
    }

    #[test]
    fn test_tolerant_mode_continues() {
        let sink = Arc::new(Collect::default());
        let mut pipeline = pipeline(ContainmentMode::Tolerant, sink.clone());
        assert!(pipeline
            .process(ConnectionState::Play, bad_boss_bar())
            .unwrap()
            .is_none());
        let keep_alive = Bytes::from_static(&[0x23, 0, 0, 0, 0, 0, 0, 0, 42]);
        let outcome = pipeline.process(ConnectionState::Play, keep_alive).unwrap();
        let Some(Outcome::Translated { body, .. }) = outcome else {
            panic!("expected translation");
        };
        assert_eq!(&body[..], &[0x24, 0, 0, 0, 0, 0, 0, 0, 42]);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_replayed_capture_reproduces_fault() {
        let sink = Arc::new(Collect::default());
        let mut pipeline = pipeline(ContainmentMode::Tolerant, sink.clone());
        pipeline
            .process(ConnectionState::Play, bad_boss_bar())
            .unwrap();
        let line = sink.0.lock().unwrap()[0].render().pop().unwrap();
        assert!(line.starts_with(CAPTURE_PREFIX));

        let replayed = pipeline.inject_inbound(ConnectionState::Play, &line).unwrap();
        assert!(replayed.is_none());
        let reports = sink.0.lock().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].capture, bad_boss_bar());
    }
}
