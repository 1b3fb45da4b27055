use crate::capture::{to_compressed_base64, CAPTURE_PREFIX};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, warn};

/// One protocol fault: human-readable header lines plus the raw packet.
#[derive(Debug, Clone)]
pub struct PacketReport {
    pub lines: Vec<String>,
    pub capture: Bytes,
}

impl PacketReport {
    /// Header lines followed by the compressed capture line.
    pub fn render(&self) -> Vec<String> {
        let mut lines = self.lines.clone();
        lines.push(format!(
            "{}{}",
            CAPTURE_PREFIX,
            to_compressed_base64(&self.capture)
        ));
        lines
    }
}

/// Receives fault reports. Must not block the calling connection.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, report: PacketReport);
}

/// Identifies the remote peer in reports, e.g. the server's brand.
pub trait PeerIdentity: Send + Sync {
    fn peer_identity(&self) -> String;
}

impl PeerIdentity for String {
    fn peer_identity(&self) -> String {
        self.clone()
    }
}

/// The brand the server announced for itself, updated as the connection runs.
#[derive(Debug, Clone)]
pub struct ServerBrand {
    brand: Arc<Mutex<String>>,
}

impl Default for ServerBrand {
    fn default() -> Self {
        Self {
            brand: Arc::new(Mutex::new("vanilla".to_string())),
        }
    }
}

impl ServerBrand {
    pub fn set(&self, brand: impl Into<String>) {
        let mut guard = self.brand.lock().unwrap_or_else(|e| e.into_inner());
        *guard = brand.into();
    }
}

impl PeerIdentity for ServerBrand {
    fn peer_identity(&self) -> String {
        self.brand.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Bounded hand-off to a background reporter. Reports that do not fit are dropped.
#[derive(Debug, Clone)]
pub struct ReportQueue {
    tx: mpsc::Sender<PacketReport>,
}

impl ReportQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PacketReport>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Start the reporter task that compresses and logs every report.
    pub fn spawn(capacity: usize) -> (Self, tokio::task::JoinHandle<()>) {
        let (queue, rx) = Self::channel(capacity);
        let handle = tokio::spawn(run_reporter(rx));
        (queue, handle)
    }
}

impl DiagnosticSink for ReportQueue {
    fn emit(&self, report: PacketReport) {
        match self.tx.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Diagnostic report queue full, dropping report"),
            Err(TrySendError::Closed(_)) => warn!("Diagnostic reporter stopped, dropping report"),
        }
    }
}

pub async fn run_reporter(mut rx: mpsc::Receiver<PacketReport>) {
    while let Some(report) = rx.recv().await {
        for line in report.render() {
            error!("{}", line);
        }
    }
}
