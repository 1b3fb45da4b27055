use crate::report::{DiagnosticSink, PacketReport, PeerIdentity};
use crate::scope::FaultScope;
use bytes::{Buf, Bytes};
use crossplay_types::{Direction, ProtocolVersion};
use std::fmt::Display;
use std::sync::Arc;
use tracing::warn;

const BANNER: &str =
    "!!!!!!!! Unexpected packet translation error, please file a report with the lines below !!!!!!!!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainmentMode {
    /// Re-raise the fault after reporting; the connection is torn down.
    #[default]
    Abort,
    /// Swallow the fault after reporting and carry on with the next packet.
    Tolerant,
}

impl ContainmentMode {
    pub fn from_tolerant(tolerant: bool) -> Self {
        if tolerant {
            ContainmentMode::Tolerant
        } else {
            ContainmentMode::Abort
        }
    }
}

/// Connection facts written into every report.
#[derive(Clone)]
pub struct ReportContext {
    pub server: ProtocolVersion,
    pub client: ProtocolVersion,
    pub peer: Arc<dyn PeerIdentity>,
}

/// Wraps pipeline stages so that a fault is reported once, the input is fully consumed,
/// and the fault is then re-raised or swallowed according to the mode.
#[derive(Clone)]
pub struct Containment {
    mode: ContainmentMode,
    context: ReportContext,
    sink: Arc<dyn DiagnosticSink>,
}

impl Containment {
    pub fn new(mode: ContainmentMode, context: ReportContext, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            mode,
            context,
            sink,
        }
    }

    pub fn mode(&self) -> ContainmentMode {
        self.mode
    }

    /// Run `stage` on `buf` inside `scope`.
    ///
    /// `Ok(None)` means a fault was swallowed in tolerant mode. Nested calls sharing the
    /// same scope report a fault only at the innermost wrapper that sees it.
    pub fn wrap<T, E, F>(
        &self,
        scope: &mut FaultScope,
        direction: Direction,
        buf: &mut Bytes,
        stage: F,
    ) -> Result<Option<T>, E>
    where
        E: Display,
        F: FnOnce(&mut FaultScope, &mut Bytes) -> Result<T, E>,
    {
        let mut guard = scope.enter(buf);
        let err = match stage(&mut *guard, buf) {
            Ok(value) => return Ok(Some(value)),
            Err(err) => err,
        };

        let discarded = buf.remaining();
        if guard.mark_reported() {
            let capture = guard.capture().cloned().unwrap_or_default();
            self.sink
                .emit(self.report(direction, &err, discarded, capture));
        }
        buf.advance(discarded);

        match self.mode {
            ContainmentMode::Tolerant => {
                warn!("Ignoring {} packet error: {}", direction, err);
                Ok(None)
            }
            ContainmentMode::Abort => Err(err),
        }
    }

    fn report(
        &self,
        direction: Direction,
        err: &dyn Display,
        discarded: usize,
        capture: Bytes,
    ) -> PacketReport {
        PacketReport {
            lines: vec![
                BANNER.to_string(),
                format!("crossplay version: {}", env!("CARGO_PKG_VERSION")),
                format!("Server version: {}", self.context.server),
                format!("Client version: {}", self.context.client),
                format!("Server brand: {}", self.context.peer.peer_identity()),
                format!("Direction: {}", direction),
                format!("Error: {}", err),
                format!("Discarded {} unread bytes of {}", discarded, capture.len()),
            ],
            capture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::decode_capture;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<PacketReport>>);

    impl DiagnosticSink for Collect {
        fn emit(&self, report: PacketReport) {
            self.0.lock().unwrap().push(report);
        }
    }

    impl Collect {
        fn count(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    fn containment(mode: ContainmentMode, sink: Arc<Collect>) -> Containment {
        Containment::new(
            mode,
            ReportContext {
                server: ProtocolVersion::V1_20,
                client: ProtocolVersion::V1_20_2,
                peer: Arc::new("Paper".to_string()),
            },
            sink,
        )
    }

    fn failing_stage(_: &mut FaultScope, buf: &mut Bytes) -> Result<(), String> {
        buf.advance(1);
        Err("bad field".to_string())
    }

    #[test]
    fn test_fault_at_depth_three_reports_once() {
        let sink = Arc::new(Collect::default());
        let contain = containment(ContainmentMode::Abort, sink.clone());
        let mut scope = FaultScope::new();

        let mut packet = Bytes::from_static(&[0x0a, 1, 2, 3]);
        let result = contain.wrap(&mut scope, Direction::Clientbound, &mut packet, |scope, buf| {
            contain.wrap(scope, Direction::Clientbound, buf, |scope, buf| {
                assert_eq!(scope.depth(), 2);
                contain.wrap(scope, Direction::Clientbound, buf, failing_stage)
            })
        });
        assert_eq!(result.unwrap_err(), "bad field");
        assert_eq!(sink.count(), 1);
        assert!(packet.is_empty());
        assert!(scope.is_idle());
        assert!(!scope.reported());

        let mut next = Bytes::from_static(&[0x0b, 9]);
        let result = contain.wrap(&mut scope, Direction::Clientbound, &mut next, failing_stage);
        assert!(result.is_err());
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn test_report_contents() {
        let sink = Arc::new(Collect::default());
        let contain = containment(ContainmentMode::Abort, sink.clone());
        let mut scope = FaultScope::new();
        let mut packet = Bytes::from_static(&[0x0a, 1, 2, 3]);
        let _ = contain.wrap(&mut scope, Direction::Serverbound, &mut packet, failing_stage);

        let reports = sink.0.lock().unwrap();
        let report = &reports[0];
        assert_eq!(report.lines[0], BANNER);
        assert!(report.lines.contains(&"Server version: 763 (1.20.1)".to_string()));
        assert!(report.lines.contains(&"Client version: 764 (1.20.2)".to_string()));
        assert!(report.lines.contains(&"Server brand: Paper".to_string()));
        assert!(report.lines.contains(&"Direction: serverbound".to_string()));
        assert!(report.lines.contains(&"Error: bad field".to_string()));
        assert!(report.lines.contains(&"Discarded 3 unread bytes of 4".to_string()));
        // The capture is the whole packet, not what was left of it.
        let rendered = report.render();
        assert_eq!(
            decode_capture(rendered.last().unwrap()).unwrap(),
            vec![0x0a, 1, 2, 3]
        );
    }

    #[test]
    fn test_tolerant_mode_swallows() {
        let sink = Arc::new(Collect::default());
        let contain = containment(ContainmentMode::Tolerant, sink.clone());
        let mut scope = FaultScope::new();

        let mut packet = Bytes::from_static(&[1, 2, 3]);
        let result = contain.wrap(&mut scope, Direction::Clientbound, &mut packet, |scope, buf| {
            contain.wrap(scope, Direction::Clientbound, buf, failing_stage)
        });
        assert!(matches!(result, Ok(Some(None))));
        assert_eq!(sink.count(), 1);
        assert!(packet.is_empty());

        let mut packet = Bytes::from_static(&[4, 5]);
        let result: Result<Option<u8>, String> =
            contain.wrap(&mut scope, Direction::Clientbound, &mut packet, |_, buf| {
                Ok(buf.get_u8())
            });
        assert_eq!(result.unwrap(), Some(4));
        assert_eq!(packet.remaining(), 1);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_mode_from_config_flag() {
        assert_eq!(ContainmentMode::from_tolerant(true), ContainmentMode::Tolerant);
        assert_eq!(ContainmentMode::from_tolerant(false), ContainmentMode::Abort);
    }
}
