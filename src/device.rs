//! The device bus: owns the ordered entity sequence, assigns keys,
//! and fans out published events to every entity except the publisher.

use crate::entity::{BusEvent, Entity, PublishPort};
use crate::error::DeviceError;
use crate::proto;
use dashmap::DashMap;
use rand::Rng;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc};

/// ESPHome native-API log levels (matches the wire `level` field).
pub mod log_level {
    pub const NONE: u32 = 0;
    pub const ERROR: u32 = 1;
    pub const WARN: u32 = 2;
    pub const INFO: u32 = 3;
    pub const CONFIG: u32 = 4;
    pub const DEBUG: u32 = 5;
    pub const VERBOSE: u32 = 6;
    pub const VERY_VERBOSE: u32 = 7;
}

fn ansi_wrap(level: u32, text: &str) -> String {
    let code = match level {
        log_level::ERROR => "31",   // red
        log_level::WARN => "33",    // yellow
        log_level::INFO => "32",    // green
        log_level::CONFIG => "35",  // magenta
        log_level::DEBUG => "36",   // cyan
        _ => "37",                  // verbose / very verbose: white
    };
    format!("\x1b[0;{code}m{text}\x1b[0m")
}

/// Configuration captured at construction, mirroring `Device.__init__` plus
/// the `network`/`board`/`platform` fields `tests/test_switch.py` revealed
/// are passed through to mDNS TXT records.
pub struct DeviceConfig {
    pub name: String,
    pub mac_address: Option<String>,
    pub model: Option<String>,
    pub project_name: Option<String>,
    pub project_version: Option<String>,
    pub manufacturer: String,
    pub friendly_name: Option<String>,
    pub suggested_area: Option<String>,
    pub network: String,
    pub board: String,
    pub platform: String,
    pub password: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "esphome-sim".to_string(),
            mac_address: None,
            model: None,
            project_name: None,
            project_version: None,
            manufacturer: "esphome-sim".to_string(),
            friendly_name: None,
            suggested_area: None,
            network: "wifi".to_string(),
            board: "esp01_1m".to_string(),
            platform: "ESP8266".to_string(),
            password: None,
        }
    }
}

fn generate_mac_address() -> String {
    let mut rng = rand::rng();
    format!(
        "02:00:00:{:02x}:{:02x}:{:02x}",
        rng.random::<u8>(),
        rng.random::<u8>(),
        rng.random::<u8>()
    )
}

/// The device itself: identity, the ordered entity sequence, and the bus.
pub struct Device {
    pub name: String,
    pub mac_address: String,
    pub model: Option<String>,
    pub project_name: Option<String>,
    pub project_version: Option<String>,
    pub manufacturer: String,
    pub friendly_name: Option<String>,
    pub suggested_area: Option<String>,
    pub network: String,
    pub board: String,
    pub platform: String,
    pub password: Option<String>,
    entities: RwLock<Vec<Arc<dyn Entity>>>,
    /// `object_id -> key` index for O(1) lookup, kept in lockstep with
    /// `entities`. Grounded on the teacher's `src/state.rs` `StateMachine`
    /// (`Arc<DashMap<...>>`).
    by_object_id: DashMap<String, u32>,
    bus_tx: mpsc::UnboundedSender<(u32, BusEvent)>,
    bus_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<(u32, BusEvent)>>>,
    /// A second tap on every bus event, independent of entity subscription
    /// gating — the HTTP/SSE surface observes the bus this way rather
    /// than registering a throwaway entity per connection. Grounded on the
    /// teacher's `StateMachine::subscribe()` broadcast (`src/state.rs`).
    broadcast_tx: broadcast::Sender<(u32, BusEvent)>,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Arc<Self> {
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            name: config.name,
            mac_address: config.mac_address.unwrap_or_else(generate_mac_address),
            model: config.model,
            project_name: config.project_name,
            project_version: config.project_version,
            manufacturer: config.manufacturer,
            friendly_name: config.friendly_name,
            suggested_area: config.suggested_area,
            network: config.network,
            board: config.board,
            platform: config.platform,
            password: config.password,
            entities: RwLock::new(Vec::new()),
            by_object_id: DashMap::new(),
            bus_tx,
            bus_rx: tokio::sync::Mutex::new(Some(bus_rx)),
            broadcast_tx,
        })
    }

    /// Subscribe to every event published on the bus, regardless of any
    /// entity's `can_handle` gating — used for the SSE bootstrap/stream.
    pub fn subscribe(&self) -> broadcast::Receiver<(u32, BusEvent)> {
        self.broadcast_tx.subscribe()
    }

    /// Register an entity, assigning it the next dense key. Rejects a
    /// duplicate `object_id` without mutating the device.
    pub fn add_entity(&self, entity: Arc<dyn Entity>) -> Result<(), DeviceError> {
        let mut entities = self.entities.write().expect("entities lock poisoned");
        let object_id = entity.info().object_id.clone();
        if self.by_object_id.contains_key(&object_id) {
            return Err(DeviceError::DuplicateObjectId(object_id));
        }
        let key = entities.len() as u32 + 1;
        entity.info().set_key(key);
        entity.info().set_publish_port(PublishPort::new(self.bus_tx.clone()));
        entities.push(entity);
        self.by_object_id.insert(object_id, key);
        Ok(())
    }

    pub fn get_by_object_id(&self, object_id: &str) -> Option<Arc<dyn Entity>> {
        let key = *self.by_object_id.get(object_id)?;
        self.get_by_key(key)
    }

    pub fn get_by_key(&self, key: u32) -> Option<Arc<dyn Entity>> {
        let index = (key as usize).checked_sub(1)?;
        self.entities.read().expect("entities lock poisoned").get(index).cloned()
    }

    /// Snapshot of the entity sequence in insertion order.
    pub fn entities(&self) -> Vec<Arc<dyn Entity>> {
        self.entities.read().expect("entities lock poisoned").clone()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().expect("entities lock poisoned").len()
    }

    pub fn build_device_info_response(&self) -> proto::DeviceInfoResponse {
        proto::DeviceInfoResponse {
            uses_password: self.password.is_some(),
            name: self.name.clone(),
            mac_address: self.mac_address.clone(),
            model: self.model.clone().unwrap_or_default(),
            manufacturer: self.manufacturer.clone(),
            friendly_name: self.friendly_name.clone().unwrap_or_else(|| self.name.clone()),
            project_name: self.project_name.clone().unwrap_or_default(),
            project_version: self.project_version.clone().unwrap_or_default(),
        }
    }

    /// Format and emit a log line: printed via `tracing` for process-level
    /// observability, and published on the bus so subscribed API/HTTP
    /// clients see it too.
    pub fn log(&self, level: u32, tag: &str, message: &str) {
        let formatted = ansi_wrap(level, &format!("[{tag}] {message}"));
        match level {
            log_level::ERROR => tracing::error!(tag, "{}", message),
            log_level::WARN => tracing::warn!(tag, "{}", message),
            log_level::INFO => tracing::info!(tag, "{}", message),
            log_level::CONFIG | log_level::DEBUG => tracing::debug!(tag, "{}", message),
            _ => tracing::trace!(tag, "{}", message),
        }
        // publisher_key 0 matches no entity (keys start at 1), so every
        // entity is eligible to observe a device-originated log line.
        let _ = self.bus_tx.send((0, BusEvent::Log(level, formatted)));
    }

    /// Publish `event` as though `publisher_key` emitted it. Exposed so the
    /// native API server can forward decoded client commands onto the bus
    /// without going through an entity — its fallback path for message
    /// types it doesn't special-case itself.
    pub fn publish_as(&self, publisher_key: u32, event: BusEvent) {
        let _ = self.bus_tx.send((publisher_key, event));
    }

    /// Fan `event` out to every entity except `publisher_key`, in insertion
    /// order. A handler that panics is isolated via `tokio::spawn` so one
    /// bad subscriber never stops delivery to the rest.
    async fn dispatch(&self, publisher_key: u32, event: BusEvent) {
        let entities = self.entities();
        for entity in entities {
            if entity.info().key() == publisher_key {
                continue;
            }
            if !entity.can_handle(&event).await {
                continue;
            }
            let ev = event.clone();
            let object_id = entity.info().object_id.clone();
            let result = tokio::spawn(async move { entity.handle(&ev).await }).await;
            if let Err(join_err) = result {
                tracing::error!(object_id, error = %join_err, "entity handler panicked; bus dispatch continues");
            }
        }
    }

    /// Drain the bus channel and dispatch events forever. Spawned once from
    /// `run`; takes the receiver out of its `Mutex<Option<_>>` so a second
    /// call is a deliberate no-op rather than a duplicate pump.
    pub async fn run_bus_pump(self: Arc<Self>) {
        let mut rx = match self.bus_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                tracing::warn!("bus pump already running");
                return;
            }
        };
        while let Some((publisher_key, event)) = rx.recv().await {
            let _ = self.broadcast_tx.send((publisher_key, event.clone()));
            self.dispatch(publisher_key, event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{binary_sensor::BinarySensor, switch::Switch};

    fn test_device() -> Arc<Device> {
        Device::new(DeviceConfig {
            name: "test-device".into(),
            mac_address: Some("02:00:00:01:02:03".into()),
            ..Default::default()
        })
    }

    #[test]
    fn key_and_object_id_lookup_agree() {
        let device = test_device();
        let sensor = Arc::new(BinarySensor::new("Motion", &device.name, &device.mac_address, None, None));
        device.add_entity(sensor.clone()).unwrap();

        let by_key = device.get_by_key(1).unwrap();
        let by_id = device.get_by_object_id("motion").unwrap();
        assert_eq!(by_key.info().object_id, "motion");
        assert_eq!(by_id.info().key(), 1);
    }

    #[test]
    fn keys_are_dense() {
        let device = test_device();
        for name in ["A", "B", "C"] {
            let sensor = Arc::new(BinarySensor::new(name, &device.name, &device.mac_address, None, None));
            device.add_entity(sensor).unwrap();
        }
        let keys: Vec<u32> = device.entities().iter().map(|e| e.info().key()).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_object_id_is_rejected() {
        let device = test_device();
        let a = Arc::new(BinarySensor::new("Motion", &device.name, &device.mac_address, None, None));
        let b = Arc::new(BinarySensor::new("Motion", &device.name, &device.mac_address, None, None));
        device.add_entity(a).unwrap();
        let err = device.add_entity(b).unwrap_err();
        assert!(matches!(err, DeviceError::DuplicateObjectId(id) if id == "motion"));
        assert_eq!(device.entity_count(), 1);
    }

    #[test]
    fn unique_id_equality_tracks_object_id_and_domain() {
        let device = test_device();
        let sensor = Arc::new(BinarySensor::new("Lamp", &device.name, &device.mac_address, None, None));
        let switch = Arc::new(Switch::new("Lamp", &device.name, &device.mac_address, None, None));
        device.add_entity(sensor.clone()).unwrap();
        device.add_entity(switch.clone()).unwrap();
        assert_ne!(sensor.info().unique_id, switch.info().unique_id);
    }

    #[tokio::test]
    async fn publish_skips_publisher_and_delivers_to_others() {
        let device = test_device();
        let sensor = Arc::new(BinarySensor::new("Sensor", &device.name, &device.mac_address, None, None));
        let switch = Arc::new(Switch::new("Switch", &device.name, &device.mac_address, None, None));
        device.add_entity(sensor.clone()).unwrap();
        device.add_entity(switch.clone()).unwrap();

        let pump = tokio::spawn(device.clone().run_bus_pump());

        switch.set_state(true).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        pump.abort();
    }
}
