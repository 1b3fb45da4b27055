use crate::config::ProxyConfig;
use crate::pipeline::Pipeline;
use crate::registries::Registries;
use anyhow::{anyhow, Result};
use bytes::{BufMut, BytesMut};
use crossplay_diagnostics::{
    Containment, ContainmentMode, ReportContext, ReportQueue, ServerBrand,
};
use crossplay_protocol_core::{
    codec, Connection, ConnectionReader, ConnectionState, ConnectionWriter, MAX_STRING_LEN,
};
use crossplay_protocol_defs::play::BRAND_CHANNEL;
use crossplay_schema::{Outcome, Record, SchemaCatalog, Translator, Value};
use crossplay_types::{Direction, ProtocolVersion, TextComponent};
use std::fmt::Display;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const HANDSHAKE: i32 = 0x00;
const STATUS_RESPONSE: i32 = 0x00;
const MAX_ADDRESS_LEN: usize = 255;

/// Everything connections share.
pub struct Shared {
    pub config: ProxyConfig,
    pub catalog: Arc<SchemaCatalog>,
    pub registries: Registries,
    pub reports: ReportQueue,
}

/// The first packet of every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol: ProtocolVersion,
    pub address: String,
    pub port: u16,
    pub next_state: i32,
}

impl Handshake {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        let id = codec::read_varint(&mut buf)?;
        if id != HANDSHAKE {
            return Err(anyhow!("Expected handshake, got packet {:#04x}", id));
        }
        Ok(Self {
            protocol: ProtocolVersion(codec::read_varint(&mut buf)?),
            address: codec::read_string(&mut buf, MAX_ADDRESS_LEN)?,
            port: codec::read_u16(&mut buf)?,
            next_state: codec::read_varint(&mut buf)?,
        })
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        codec::write_varint(&mut buf, HANDSHAKE);
        codec::write_varint(&mut buf, self.protocol.number());
        codec::write_string(&mut buf, &self.address);
        buf.put_u16(self.port);
        codec::write_varint(&mut buf, self.next_state);
        buf
    }

    /// The same handshake as the server's revision would send it.
    pub fn for_server(&self, server: ProtocolVersion) -> Self {
        Self {
            protocol: server,
            ..self.clone()
        }
    }
}

pub async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    if let Err(e) = proxy(Connection::new(stream), &shared, &peer).await {
        debug!("Connection {} ended: {}", peer, e);
    }
}

async fn proxy(mut client: Connection, shared: &Shared, peer: &str) -> Result<()> {
    let handshake = Handshake::decode(&client.read_frame().await?)?;
    let server_version = shared.config.server_protocol;
    debug!(
        "Handshake from {}: protocol={}, next_state={}",
        peer, handshake.protocol, handshake.next_state
    );

    match ConnectionState::from_handshake_next(handshake.next_state) {
        Some(ConnectionState::Status) => {
            let mut server = connect_backend(&shared.config).await?;
            server
                .write_frame(&handshake.for_server(server_version).encode())
                .await?;
            let supported =
                check_pairing(&shared.catalog, server_version, handshake.protocol).is_ok();
            relay_status(client, server, handshake.protocol, supported).await
        }
        Some(ConnectionState::Login) => {
            if let Err(reason) =
                check_pairing(&shared.catalog, server_version, handshake.protocol)
            {
                info!("Refusing {}: {}", peer, reason);
                refuse(&mut client, &shared.catalog, handshake.protocol, &reason).await;
                return Ok(());
            }
            let mut server = match connect_backend(&shared.config).await {
                Ok(server) => server,
                Err(e) => {
                    warn!("Backend {} unreachable: {}", shared.config.backend, e);
                    let reason = format!("Could not connect to the server: {}", e);
                    refuse(&mut client, &shared.catalog, handshake.protocol, &reason).await;
                    return Ok(());
                }
            };
            server
                .write_frame(&handshake.for_server(server_version).encode())
                .await?;
            info!(
                "{} joining: client protocol {}, server protocol {}",
                peer, handshake.protocol, server_version
            );
            relay_login(client, server, shared, handshake.protocol).await
        }
        _ => Err(anyhow!("Invalid next state: {}", handshake.next_state)),
    }
}

async fn connect_backend(config: &ProxyConfig) -> Result<Connection> {
    let stream = TcpStream::connect(&config.backend).await?;
    stream.set_nodelay(true)?;
    Ok(Connection::new(stream))
}

/// Whether a client revision can be served by the configured server revision.
pub fn check_pairing(
    catalog: &SchemaCatalog,
    server: ProtocolVersion,
    client: ProtocolVersion,
) -> Result<(), String> {
    if !catalog.supports(client) {
        let supported: Vec<String> = catalog.versions().iter().map(|v| v.to_string()).collect();
        return Err(format!(
            "Unsupported client version {}. Supported: {}",
            client,
            supported.join(", ")
        ));
    }
    if client.has_configuration_state() != server.has_configuration_state() {
        return Err(format!(
            "Client version {} cannot join a server running {}",
            client, server
        ));
    }
    Ok(())
}

/// Send a login disconnect to a client we will not proxy.
async fn refuse(
    client: &mut Connection,
    catalog: &SchemaCatalog,
    version: ProtocolVersion,
    reason: &str,
) {
    let record = Record::new().with("reason", TextComponent::plain(reason).to_json());
    let body = catalog.encode(
        ConnectionState::Login,
        Direction::Clientbound,
        "disconnect",
        &record,
        version,
    );
    match body {
        Some(Ok(body)) => {
            if let Err(e) = client.write_frame(&body).await {
                debug!("Failed to send refusal: {}", e);
            }
        }
        Some(Err(e)) => warn!("Failed to encode refusal: {}", e),
        None => debug!("No login disconnect for protocol {}", version),
    }
}

/// Status is a strict request/response exchange; only the advertised protocol changes.
async fn relay_status(
    mut client: Connection,
    mut server: Connection,
    client_version: ProtocolVersion,
    supported: bool,
) -> Result<()> {
    loop {
        let request = client.read_frame().await?;
        server.write_frame(&request).await?;
        let mut response = server.read_frame().await?;
        if supported {
            response = rewrite_status(&response, client_version)?;
        }
        client.write_frame(&response).await?;
    }
}

/// Advertise the client's own protocol number so it does not report a version mismatch.
pub fn rewrite_status(body: &[u8], client_version: ProtocolVersion) -> Result<BytesMut> {
    let mut buf = body;
    if codec::read_varint(&mut buf)? != STATUS_RESPONSE {
        return Ok(BytesMut::from(body));
    }
    let json = codec::read_string(&mut buf, MAX_STRING_LEN)?;
    let mut status: serde_json::Value = serde_json::from_str(&json)?;
    if let Some(version) = status.get_mut("version").and_then(|v| v.as_object_mut()) {
        version.insert("protocol".into(), client_version.number().into());
    }
    let mut out = BytesMut::new();
    codec::write_varint(&mut out, STATUS_RESPONSE);
    codec::write_string(&mut out, &status.to_string());
    Ok(out)
}

/// Connection state shared by both relay directions.
struct SessionState(AtomicU8);

impl SessionState {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire)).unwrap_or(ConnectionState::Play)
    }

    fn set(&self, state: ConnectionState) {
        debug!("Entering {} state", state);
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

async fn relay_login(
    mut client: Connection,
    mut server: Connection,
    shared: &Shared,
    client_version: ProtocolVersion,
) -> Result<()> {
    let server_version = shared.config.server_protocol;
    let pairing = shared.registries.pairing(server_version, client_version)?;
    let translator = Translator::new(shared.catalog.clone(), pairing);

    let brand = ServerBrand::default();
    let containment = Containment::new(
        ContainmentMode::from_tolerant(shared.config.tolerant),
        ReportContext {
            server: server_version,
            client: client_version,
            peer: Arc::new(brand.clone()),
        },
        Arc::new(shared.reports.clone()),
    );

    let threshold = shared.config.compression_threshold;
    client.set_compression(threshold);
    server.set_compression(threshold);
    let (client_reader, client_writer) = client.into_split();
    let (server_reader, server_writer) = server.into_split();

    let state = Arc::new(SessionState::new(ConnectionState::Login));
    let (compression_tx, compression_rx) = watch::channel(threshold);
    let (fault_tx, fault_rx) = mpsc::channel::<String>(1);

    let serverbound_pipeline =
        Pipeline::new(Direction::Serverbound, translator.clone(), containment.clone());
    let serverbound_state = state.clone();
    let serverbound = tokio::spawn(async move {
        if let Err(e) = relay_serverbound(
            client_reader,
            server_writer,
            serverbound_pipeline,
            serverbound_state,
            compression_rx,
            fault_tx,
        )
        .await
        {
            debug!("Serverbound relay ended: {}", e);
        }
    });

    let result = Clientbound {
        server: server_reader,
        client: client_writer,
        pipeline: Pipeline::new(Direction::Clientbound, translator, containment),
        state,
        compression: compression_tx,
        faults: fault_rx,
        brand,
        server_version,
    }
    .run()
    .await;

    serverbound.abort();
    result
}

/// Server to client: owns the client writer, so it also sends every fault notice.
struct Clientbound {
    server: ConnectionReader,
    client: ConnectionWriter,
    pipeline: Pipeline,
    state: Arc<SessionState>,
    compression: watch::Sender<Option<i32>>,
    faults: mpsc::Receiver<String>,
    brand: ServerBrand,
    server_version: ProtocolVersion,
}

impl Clientbound {
    async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                fault = self.faults.recv() => {
                    return match fault {
                        Some(message) => {
                            self.notify_fault(&message).await;
                            Err(anyhow!("Serverbound translation failed: {}", message))
                        }
                        // Serverbound side finished: the client went away.
                        None => Ok(()),
                    };
                }
                frame = self.server.read_frame() => {
                    let state = self.state.get();
                    match self.pipeline.process(state, frame?.freeze()) {
                        Ok(Some(outcome)) => self.deliver(state, outcome).await?,
                        Ok(None) => {}
                        Err(e) => {
                            self.notify_fault(&e).await;
                            return Err(e.into());
                        }
                    }
                }
            }
        }
    }

    async fn deliver(&mut self, state: ConnectionState, outcome: Outcome) -> Result<()> {
        let (kind, record, body) = match outcome {
            Outcome::Translated { kind, record, body } => (kind, record, body),
            Outcome::Passthrough(frame) => return self.client.write_frame(&frame).await,
            Outcome::Dropped => return Ok(()),
        };

        match (state, kind) {
            (ConnectionState::Login, "encryption_request") => {
                let message = "Online-mode servers are not supported";
                self.notify_fault(&message).await;
                return Err(anyhow!(message));
            }
            (ConnectionState::Login, "set_compression") => {
                let threshold = record
                    .int("threshold")
                    .filter(|t| *t >= 0)
                    .map(|t| t as i32);
                debug!("Server set compression threshold {:?}", threshold);
                // The serverbound side switches before the client can answer compressed.
                self.compression.send_replace(threshold);
                self.client.write_frame(&body).await?;
                self.client.set_compression(threshold);
                self.server.set_compression(threshold);
                return Ok(());
            }
            (ConnectionState::Login, "login_success") => {
                if !self.server_version.has_configuration_state() {
                    self.state.set(ConnectionState::Play);
                }
            }
            (ConnectionState::Configuration | ConnectionState::Play, "plugin_message") => {
                if record.str("channel") == Some(BRAND_CHANNEL) {
                    if let Some(brand) = parse_brand(&record) {
                        debug!("Server brand: {}", brand);
                        self.brand.set(brand);
                    }
                }
            }
            _ => {}
        }
        self.client.write_frame(&body).await
    }

    async fn notify_fault(&mut self, error: &(dyn Display + Sync)) {
        let notice = fault_notice(error);
        let record = Record::new().with("reason", notice.to_json());
        let state = self.state.get();
        match self.pipeline.translator().encode_for(
            Direction::Clientbound,
            state,
            "disconnect",
            &record,
        ) {
            Some(Ok(body)) => {
                if let Err(e) = self.client.write_frame(&body).await {
                    debug!("Failed to send fault notice: {}", e);
                }
            }
            Some(Err(e)) => warn!("Failed to encode fault notice: {}", e),
            None => debug!("No disconnect packet in {} state", state),
        }
    }
}

/// Client to server.
async fn relay_serverbound(
    mut client: ConnectionReader,
    mut server: ConnectionWriter,
    mut pipeline: Pipeline,
    state: Arc<SessionState>,
    mut compression: watch::Receiver<Option<i32>>,
    faults: mpsc::Sender<String>,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;
            changed = compression.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let threshold = *compression.borrow_and_update();
                client.set_compression(threshold);
                server.set_compression(threshold);
            }
            frame = client.read_frame() => {
                let current = state.get();
                let outcome = match pipeline.process(current, frame?.freeze()) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let _ = faults.send(e.to_string()).await;
                        return Err(e.into());
                    }
                };
                match outcome {
                    Some(Outcome::Translated { kind, body, .. }) => {
                        if let Some(next) = serverbound_transition(current, kind) {
                            state.set(next);
                        }
                        server.write_frame(&body).await?;
                    }
                    Some(Outcome::Passthrough(frame)) => server.write_frame(&frame).await?,
                    Some(Outcome::Dropped) | None => {}
                }
            }
        }
    }
}

/// State changes the client announces. The state switches before the packet is
/// forwarded, so the server's answer is read in the new state.
fn serverbound_transition(state: ConnectionState, kind: &str) -> Option<ConnectionState> {
    match (state, kind) {
        (ConnectionState::Login, "login_acknowledged") => Some(ConnectionState::Configuration),
        (ConnectionState::Configuration, "finish_configuration") => Some(ConnectionState::Play),
        (ConnectionState::Play, "configuration_acknowledged") => {
            Some(ConnectionState::Configuration)
        }
        _ => None,
    }
}

/// The brand payload is a single length-prefixed string.
fn parse_brand(record: &Record) -> Option<String> {
    let mut data = record.get("data").and_then(Value::as_bytes)?;
    codec::read_string(&mut data, MAX_STRING_LEN).ok()
}

pub fn fault_notice(error: &dyn Display) -> TextComponent {
    TextComponent::colored("Disconnected: protocol translation error", "red")
        .with_extra(TextComponent::plain(format!("\n\n{}", error)))
        .with_extra(TextComponent::plain(
            "\nThe server log has a report of this packet.",
        ))
}
