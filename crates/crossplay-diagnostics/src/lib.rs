pub mod capture;
pub mod contain;
pub mod report;
pub mod scope;

pub use capture::{decode_capture, to_compressed_base64, CaptureError, CAPTURE_PREFIX};
pub use contain::{Containment, ContainmentMode, ReportContext};
pub use report::{DiagnosticSink, PacketReport, PeerIdentity, ReportQueue, ServerBrand};
pub use scope::FaultScope;
