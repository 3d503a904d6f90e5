//! The uniform entity contract: identity derivation shared by every
//! domain, the `Entity` trait itself, and the event types that flow across
//! the device bus.

use crate::error::ApiError;
use crate::proto;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use tokio::sync::mpsc;

/// Derive a textual object_id from a human name: lowercase, collapse
/// whitespace/non-word runs to single underscores, trim leading/trailing
/// underscores. Mirrors `basic_entity.py`'s `object_id` property.
pub fn derive_object_id(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Derive a stable unique_id: first 16 hex chars of SHA-256 over
/// `device_name|device_mac|object_id|domain`.
pub fn derive_unique_id(device_name: &str, device_mac: &str, object_id: &str, domain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(device_name.as_bytes());
    hasher.update(b"|");
    hasher.update(device_mac.as_bytes());
    hasher.update(b"|");
    hasher.update(object_id.as_bytes());
    hasher.update(b"|");
    hasher.update(domain.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

/// A handle entities use to emit events onto the device bus without owning
/// the device — avoids an `Arc` reference cycle between entity and device.
#[derive(Clone)]
pub struct PublishPort(mpsc::UnboundedSender<(u32, BusEvent)>);

impl PublishPort {
    pub fn new(sender: mpsc::UnboundedSender<(u32, BusEvent)>) -> Self {
        Self(sender)
    }

    /// Publish an event as though it originated from the entity with
    /// `publisher_key`. Send errors (bus task gone) are dropped — the device
    /// is shutting down and there is nowhere useful to report this.
    pub fn publish(&self, publisher_key: u32, event: BusEvent) {
        let _ = self.0.send((publisher_key, event));
    }
}

/// Shared identity/metadata block every entity carries.
pub struct EntityInfo {
    pub name: String,
    pub object_id: String,
    pub unique_id: String,
    pub domain: &'static str,
    pub icon: String,
    pub device_class: String,
    pub entity_category: u32,
    key: AtomicU32,
    publish_port: OnceLock<PublishPort>,
}

impl EntityInfo {
    pub fn new(
        name: impl Into<String>,
        domain: &'static str,
        device_name: &str,
        device_mac: &str,
        explicit_object_id: Option<String>,
        explicit_unique_id: Option<String>,
    ) -> Self {
        let name = name.into();
        let object_id = explicit_object_id.unwrap_or_else(|| derive_object_id(&name));
        let unique_id = explicit_unique_id
            .unwrap_or_else(|| derive_unique_id(device_name, device_mac, &object_id, domain));
        Self {
            name,
            object_id,
            unique_id,
            domain,
            icon: String::new(),
            device_class: String::new(),
            entity_category: 0,
            key: AtomicU32::new(0),
            publish_port: OnceLock::new(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = device_class.into();
        self
    }

    pub fn key(&self) -> u32 {
        self.key.load(Ordering::Acquire)
    }

    /// Assigned exactly once by `Device::add_entity`.
    pub(crate) fn set_key(&self, key: u32) {
        self.key.store(key, Ordering::Release);
    }

    pub(crate) fn set_publish_port(&self, port: PublishPort) {
        // OnceLock::set silently no-ops on a second call; add_entity only
        // calls this once per entity so that's not reachable in practice.
        let _ = self.publish_port.set(port);
    }

    pub fn list_meta(&self) -> proto::EntityListMeta {
        proto::EntityListMeta {
            object_id: self.object_id.clone(),
            key: self.key(),
            name: self.name.clone(),
            unique_id: self.unique_id.clone(),
            icon: self.icon.clone(),
            device_class: self.device_class.clone(),
            entity_category: self.entity_category,
        }
    }

    /// Publish an event as this entity. No-op if called before registration
    /// (publish port unset) — logged at debug since it only happens if an
    /// entity is driven outside a `Device`, e.g. in a unit test.
    pub fn publish(&self, event: BusEvent) {
        match self.publish_port.get() {
            Some(port) => port.publish(self.key(), event),
            None => tracing::debug!(object_id = %self.object_id, "publish called before registration"),
        }
    }
}

/// A decoded state-change payload, tagged by domain so the native API server
/// and HTTP/SSE server can each format it for their own protocol.
#[derive(Debug, Clone)]
pub enum StateEvent {
    BinarySensor(proto::BinarySensorStateResponse),
    Sensor(proto::SensorStateResponse),
    Switch(proto::SwitchStateResponse),
    Number(proto::NumberStateResponse),
    Light(proto::LightStateResponse),
    Climate(proto::ClimateStateResponse),
}

impl StateEvent {
    pub fn key(&self) -> u32 {
        match self {
            StateEvent::BinarySensor(m) => m.key,
            StateEvent::Sensor(m) => m.key,
            StateEvent::Switch(m) => m.key,
            StateEvent::Number(m) => m.key,
            StateEvent::Light(m) => m.key,
            StateEvent::Climate(m) => m.key,
        }
    }

    /// `(message_type, payload)` ready to hand to `frame::write_frame`.
    pub fn encode_frame(&self) -> (u32, Vec<u8>) {
        use proto::type_id::*;
        match self {
            StateEvent::BinarySensor(m) => (BINARY_SENSOR_STATE_RESPONSE, m.encode()),
            StateEvent::Sensor(m) => (SENSOR_STATE_RESPONSE, m.encode()),
            StateEvent::Switch(m) => (SWITCH_STATE_RESPONSE, m.encode()),
            StateEvent::Number(m) => (NUMBER_STATE_RESPONSE, m.encode()),
            StateEvent::Light(m) => (LIGHT_STATE_RESPONSE, m.encode()),
            StateEvent::Climate(m) => (CLIMATE_STATE_RESPONSE, m.encode()),
        }
    }
}

/// The `ListEntities*Response` an entity describes itself with.
#[derive(Debug, Clone)]
pub enum Described {
    BinarySensor(proto::ListEntitiesBinarySensorResponse),
    Sensor(proto::ListEntitiesSensorResponse),
    Switch(proto::ListEntitiesSwitchResponse),
    Number(proto::ListEntitiesNumberResponse),
    Light(proto::ListEntitiesLightResponse),
    Climate(proto::ListEntitiesClimateResponse),
}

impl Described {
    pub fn encode_frame(&self) -> (u32, Vec<u8>) {
        use proto::type_id::*;
        match self {
            Described::BinarySensor(m) => (LIST_ENTITIES_BINARY_SENSOR_RESPONSE, m.encode()),
            Described::Sensor(m) => (LIST_ENTITIES_SENSOR_RESPONSE, m.encode()),
            Described::Switch(m) => (LIST_ENTITIES_SWITCH_RESPONSE, m.encode()),
            Described::Number(m) => (LIST_ENTITIES_NUMBER_RESPONSE, m.encode()),
            Described::Light(m) => (LIST_ENTITIES_LIGHT_RESPONSE, m.encode()),
            Described::Climate(m) => (LIST_ENTITIES_CLIMATE_RESPONSE, m.encode()),
        }
    }
}

/// A decoded but not-specially-handled client message, forwarded to every
/// entity as `BusEvent::ClientRequest` — the native server's fallback
/// dispatch path for message types it doesn't special-case itself.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub message_type: u32,
    pub payload: Vec<u8>,
}

/// The three event kinds that circulate on the bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    StateChange(StateEvent),
    Log(u32, String),
    ClientRequest(ClientRequest),
}

/// The operations every entity, regardless of domain, must support.
#[async_trait]
pub trait Entity: Send + Sync {
    fn info(&self) -> &EntityInfo;

    /// Internal entities (native API server, web server, listener) describe
    /// as nothing and are omitted from `ListEntities`.
    async fn describe(&self) -> Option<Described> {
        None
    }

    async fn snapshot(&self) -> Option<StateEvent> {
        None
    }

    async fn state_json(&self) -> Option<serde_json::Value> {
        None
    }

    async fn can_handle(&self, _event: &BusEvent) -> bool {
        true
    }

    async fn handle(&self, _event: &BusEvent) {}

    /// Apply an HTTP command carried as query/form parameters (switch,
    /// light, number). No-op by default.
    async fn http_command(&self, _action: &str, _params: &HashMap<String, String>) -> Result<(), ApiError> {
        Ok(())
    }

    /// Apply an HTTP command carried as a JSON body (climate). No-op by
    /// default.
    async fn http_json_command(&self, _action: &str, _body: serde_json::Value) -> Result<(), ApiError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_derivation_matches_source_rules() {
        assert_eq!(derive_object_id("Front Door Motion"), "front_door_motion");
        assert_eq!(derive_object_id("Lamp #1 (Kitchen)"), "lamp_1_kitchen");
        assert_eq!(derive_object_id("  leading  "), "leading");
    }

    #[test]
    fn unique_id_is_stable_and_domain_sensitive() {
        let a = derive_unique_id("kitchen-esp", "02:00:00:01:02:03", "lamp", "switch");
        let b = derive_unique_id("kitchen-esp", "02:00:00:01:02:03", "lamp", "switch");
        let c = derive_unique_id("kitchen-esp", "02:00:00:01:02:03", "lamp", "light");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
