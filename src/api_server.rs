//! The native API server: per-connection state machine over the
//! frame codec, heartbeat, stale-connection reaper, and bus integration.
//! Grounded line-for-line on
//! `examples/original_source/aioesphomeserver/native_api_server.py`; the
//! per-connection task layout follows the teacher's `src/websocket.rs`
//! (one task bridging inbound socket reads with outbound bus-driven
//! writes).

use crate::device::Device;
use crate::entity::{BusEvent, ClientRequest, Entity, EntityInfo};
use crate::error::ApiError;
use crate::frame::{read_frame, write_frame, Frame};
use crate::proto::{self, type_id};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, timeout, Duration};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);
const REAPER_INTERVAL: Duration = Duration::from_secs(60);
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection state. Writes are serialized behind a mutex so a
/// heartbeat ping can never interleave with a regular response — left
/// undocumented in the Python source, resolved explicitly here.
struct Connection {
    subscribe_logs: AtomicBool,
    subscribe_states: AtomicBool,
    alive: AtomicBool,
    writer: AsyncMutex<Option<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>>,
}

impl Connection {
    async fn write_message(&self, message_type: u32, payload: Vec<u8>) -> Result<(), ApiError> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(w) => write_frame(w, message_type, &payload).await.map_err(ApiError::from),
            None => Ok(()),
        }
    }

    /// Best-effort disconnect: mark dead, then close the writer with a
    /// bounded wait. A stuck `shutdown()` past the timeout is left
    /// for the reaper to clean up.
    async fn close(&self) {
        self.alive.store(false, Ordering::Release);
        let mut guard = self.writer.lock().await;
        if let Some(mut w) = guard.take() {
            let _ = timeout(WRITER_CLOSE_TIMEOUT, w.shutdown()).await;
        }
    }
}

/// Registered as the `_server` internal entity (mirrors
/// `device.py`'s `add_entity(NativeApiServer(name="_server"))`). Holds a
/// `Weak<Device>` rather than an `Arc` — unlike ordinary entities, this one
/// needs full device access (entity enumeration, device info, log), which
/// the lightweight publish-port channel doesn't carry; `Weak` avoids the
/// ownership cycle an `Arc<Device>` back-reference would create.
pub struct NativeApiServer {
    info: EntityInfo,
    port: u16,
    device: Weak<Device>,
    connections: DashMap<u64, Arc<Connection>>,
    next_conn_id: AtomicU64,
}

impl NativeApiServer {
    pub fn new(port: u16, device: &Arc<Device>) -> Arc<Self> {
        Arc::new(Self {
            info: EntityInfo::new(
                "_server",
                "internal",
                &device.name,
                &device.mac_address,
                Some("_server".to_string()),
                None,
            ),
            port,
            device: Arc::downgrade(device),
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        })
    }

    fn device(&self) -> Option<Arc<Device>> {
        self.device.upgrade()
    }

    /// Bind and serve forever. Bind failure is fatal (`ApiError::BindError`);
    /// everything past that point is connection-scoped and never escapes.
    pub async fn run(self: Arc<Self>) -> Result<(), ApiError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| ApiError::BindError(addr, e))?;

        if let Some(device) = self.device() {
            device.log(crate::device::log_level::INFO, "api", &format!("starting on port {}", self.port));
        }

        let _reaper = tokio::spawn(self.clone().reap_stale_connections());

        // Runs until the task is aborted externally (main.rs's shutdown
        // select!); there is no graceful internal exit from the accept loop.
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move { server.handle_client(stream).await });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }

    async fn reap_stale_connections(self: Arc<Self>) {
        loop {
            sleep(REAPER_INTERVAL).await;
            self.connections.retain(|_, conn| conn.alive.load(Ordering::Acquire));
        }
    }

    async fn handle_client(self: Arc<Self>, stream: TcpStream) {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let conn = Arc::new(Connection {
            subscribe_logs: AtomicBool::new(false),
            subscribe_states: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            writer: AsyncMutex::new(Some(BufWriter::new(
                Box::new(write_half) as Box<dyn AsyncWrite + Send + Unpin>
            ))),
        });
        self.connections.insert(id, conn.clone());

        let heartbeat_conn = conn.clone();
        let heartbeat = tokio::spawn(async move {
            loop {
                sleep(HEARTBEAT_INTERVAL).await;
                if !heartbeat_conn.alive.load(Ordering::Acquire) {
                    break;
                }
                let ping = timeout(HEARTBEAT_TIMEOUT, heartbeat_conn.write_message(type_id::PING_REQUEST, Vec::new())).await;
                if !matches!(ping, Ok(Ok(()))) {
                    tracing::warn!("heartbeat timed out, closing connection");
                    heartbeat_conn.close().await;
                    break;
                }
            }
        });

        while conn.alive.load(Ordering::Acquire) {
            match read_frame(&mut reader).await {
                Ok(frame) => {
                    if let Err(e) = self.handle_frame(&conn, frame).await {
                        tracing::warn!(error = %e, "error handling message; closing connection");
                        conn.close().await;
                        break;
                    }
                }
                Err(e) => {
                    tracing::info!(error = %e, "connection reset detected, closing");
                    conn.close().await;
                    break;
                }
            }
        }

        heartbeat.abort();
        self.connections.remove(&id);
    }

    async fn handle_frame(&self, conn: &Arc<Connection>, frame: Frame) -> Result<(), ApiError> {
        let Some(device) = self.device() else { return Ok(()) };

        match frame.message_type {
            type_id::HELLO_REQUEST => {
                let _req = proto::HelloRequest::decode(&frame.payload)?;
                let resp = proto::HelloResponse {
                    api_version_major: 1,
                    api_version_minor: 10,
                    server_info: device.name.clone(),
                };
                conn.write_message(type_id::HELLO_RESPONSE, resp.encode()).await?;
            }
            type_id::CONNECT_REQUEST => {
                let req = proto::ConnectRequest::decode(&frame.payload)?;
                let invalid_password = match &device.password {
                    Some(expected) => expected != &req.password,
                    None => false,
                };
                conn.write_message(type_id::CONNECT_RESPONSE, proto::ConnectResponse { invalid_password }.encode())
                    .await?;
            }
            type_id::DISCONNECT_REQUEST => {
                conn.write_message(type_id::DISCONNECT_RESPONSE, Vec::new()).await?;
                conn.close().await;
            }
            type_id::PING_REQUEST => {
                conn.write_message(type_id::PING_RESPONSE, Vec::new()).await?;
            }
            type_id::SUBSCRIBE_LOGS_REQUEST => {
                let req = proto::SubscribeLogsRequest::decode(&frame.payload)?;
                conn.subscribe_logs.store(true, Ordering::Release);
                let resp = proto::SubscribeLogsResponse { level: req.level, message: "Subscribed to logs".to_string() };
                conn.write_message(type_id::SUBSCRIBE_LOGS_RESPONSE, resp.encode()).await?;
            }
            type_id::SUBSCRIBE_STATES_REQUEST => {
                conn.subscribe_states.store(true, Ordering::Release);
                device.log(crate::device::log_level::INFO, "api", "Subscribed to states");
                self.send_all_states(conn, &device).await?;
            }
            type_id::LIST_ENTITIES_REQUEST => {
                self.send_list_entities(conn, &device).await?;
            }
            type_id::DEVICE_INFO_REQUEST => {
                conn.write_message(type_id::DEVICE_INFO_RESPONSE, device.build_device_info_response().encode())
                    .await?;
            }
            type_id::GET_TIME_REQUEST => {
                let epoch_seconds = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs() as u32)
                    .unwrap_or(0);
                conn.write_message(type_id::GET_TIME_RESPONSE, proto::GetTimeResponse { epoch_seconds }.encode())
                    .await?;
            }
            other => {
                device.publish_as(
                    self.info.key(),
                    BusEvent::ClientRequest(ClientRequest { message_type: other, payload: frame.payload }),
                );
            }
        }
        Ok(())
    }

    async fn send_all_states(&self, conn: &Arc<Connection>, device: &Arc<Device>) -> Result<(), ApiError> {
        for entity in device.entities() {
            if let Some(state) = entity.snapshot().await {
                let (message_type, payload) = state.encode_frame();
                conn.write_message(message_type, payload).await?;
            }
        }
        Ok(())
    }

    async fn send_list_entities(&self, conn: &Arc<Connection>, device: &Arc<Device>) -> Result<(), ApiError> {
        for entity in device.entities() {
            if let Some(described) = entity.describe().await {
                let (message_type, payload) = described.encode_frame();
                conn.write_message(message_type, payload).await?;
            }
        }
        conn.write_message(type_id::LIST_ENTITIES_DONE_RESPONSE, Vec::new()).await?;
        Ok(())
    }
}

#[async_trait]
impl Entity for NativeApiServer {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    /// Fans `state_change`/`log` bus events out to subscribed connections.
    /// Writes happen inline, one connection after another, so that two
    /// consecutive publishes reach any given connection's socket in publish
    /// order — the bus pump already dispatches to subscribers sequentially,
    /// so racing detached write tasks here would reorder them.
    async fn handle(&self, event: &BusEvent) {
        match event {
            BusEvent::StateChange(state) => {
                let (message_type, payload) = state.encode_frame();
                let targets: Vec<_> = self
                    .connections
                    .iter()
                    .filter(|entry| entry.value().subscribe_states.load(Ordering::Acquire))
                    .map(|entry| entry.value().clone())
                    .collect();
                for conn in targets {
                    let _ = conn.write_message(message_type, payload.clone()).await;
                }
            }
            BusEvent::Log(level, message) => {
                let resp = proto::SubscribeLogsResponse { level: *level, message: message.clone() };
                let payload = resp.encode();
                let targets: Vec<_> = self
                    .connections
                    .iter()
                    .filter(|entry| entry.value().subscribe_logs.load(Ordering::Acquire))
                    .map(|entry| entry.value().clone())
                    .collect();
                for conn in targets {
                    let _ = conn.write_message(type_id::SUBSCRIBE_LOGS_RESPONSE, payload.clone()).await;
                }
            }
            BusEvent::ClientRequest(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;
    use crate::entities::binary_sensor::BinarySensor;
    use crate::entities::switch::Switch;
    use tokio::io::duplex;

    fn device() -> Arc<Device> {
        Device::new(DeviceConfig { name: "test".into(), mac_address: Some("02:00:00:01:02:03".into()), ..Default::default() })
    }

    fn harness(device: &Arc<Device>) -> (Arc<NativeApiServer>, Arc<Connection>, tokio::io::DuplexStream) {
        let server = NativeApiServer::new(6053, device);
        let (client_side, server_writer) = duplex(4096);
        let conn = Arc::new(Connection {
            subscribe_logs: AtomicBool::new(false),
            subscribe_states: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            writer: AsyncMutex::new(Some(BufWriter::new(
                Box::new(server_writer) as Box<dyn AsyncWrite + Send + Unpin>
            ))),
        });
        (server, conn, client_side)
    }

    /// Hello then connect over a real frame codec round
    /// trip, driven straight at `handle_frame` rather than a bound socket.
    #[tokio::test]
    async fn hello_then_connect_round_trip() {
        let device = device();
        let (server, conn, mut client_side) = harness(&device);

        let hello = proto::HelloRequest { client_info: "pytest".into(), api_version_major: 1, api_version_minor: 9 };
        server
            .handle_frame(&conn, Frame { message_type: type_id::HELLO_REQUEST, payload: hello.encode() })
            .await
            .unwrap();
        let frame = read_frame(&mut client_side).await.unwrap();
        assert_eq!(frame.message_type, type_id::HELLO_RESPONSE);
        let resp = proto::HelloResponse::decode(&frame.payload).unwrap();
        assert_eq!(resp.server_info, "test");

        let connect = proto::ConnectRequest { password: String::new() };
        server
            .handle_frame(&conn, Frame { message_type: type_id::CONNECT_REQUEST, payload: connect.encode() })
            .await
            .unwrap();
        let frame = read_frame(&mut client_side).await.unwrap();
        assert_eq!(frame.message_type, type_id::CONNECT_RESPONSE);
        let resp = proto::ConnectResponse::decode(&frame.payload).unwrap();
        assert!(!resp.invalid_password);
    }

    /// A `SwitchCommandRequest` arriving as an
    /// unrecognized-by-name frame gets republished onto the bus and applied.
    #[tokio::test]
    async fn switch_command_request_is_forwarded_to_bus() {
        let device = device();
        let switch = Arc::new(Switch::new("Relay", &device.name, &device.mac_address, None, None));
        device.add_entity(switch.clone()).unwrap();
        tokio::spawn(device.clone().run_bus_pump());

        let (server, conn, _client_side) = harness(&device);
        let cmd = proto::SwitchCommandRequest { key: switch.info().key(), state: true };
        server
            .handle_frame(&conn, Frame { message_type: type_id::SWITCH_COMMAND_REQUEST, payload: cmd.encode() })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(switch.state());
    }

    /// A freshly listed entity produces exactly the
    /// describe-frame its domain implies, terminated by `ListEntitiesDone`.
    #[tokio::test]
    async fn list_entities_terminates_with_done_response() {
        let device = device();
        device
            .add_entity(Arc::new(BinarySensor::new("Motion", &device.name, &device.mac_address, None, None)))
            .unwrap();
        let (server, conn, mut client_side) = harness(&device);

        server.handle_frame(&conn, Frame { message_type: type_id::LIST_ENTITIES_REQUEST, payload: Vec::new() }).await.unwrap();

        let first = read_frame(&mut client_side).await.unwrap();
        assert_eq!(first.message_type, type_id::LIST_ENTITIES_BINARY_SENSOR_RESPONSE);
        let done = read_frame(&mut client_side).await.unwrap();
        assert_eq!(done.message_type, type_id::LIST_ENTITIES_DONE_RESPONSE);
    }
}
