//! sensor domain: a scalar float reading with no commands.
//! Grounded on `aioesphomeserver/sensor.py`.

use crate::entity::{BusEvent, Described, Entity, EntityInfo, StateEvent};
use crate::proto;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct Sensor {
    info: EntityInfo,
    state_bits: AtomicU32,
    has_state: AtomicBool,
    pub unit_of_measurement: String,
}

impl Sensor {
    pub fn new(
        name: &str,
        device_name: &str,
        device_mac: &str,
        object_id: Option<String>,
        unique_id: Option<String>,
    ) -> Self {
        Self {
            info: EntityInfo::new(name, "sensor", device_name, device_mac, object_id, unique_id),
            state_bits: AtomicU32::new(0),
            has_state: AtomicBool::new(false),
            unit_of_measurement: String::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measurement = unit.into();
        self
    }

    fn current(&self) -> f32 {
        f32::from_bits(self.state_bits.load(Ordering::Acquire))
    }

    /// A repeated call with the same value emits no further `state_change`.
    pub async fn set_state(&self, value: f32) {
        let had_state = self.has_state.swap(true, Ordering::AcqRel);
        let previous_bits = self.state_bits.swap(value.to_bits(), Ordering::AcqRel);
        if had_state && previous_bits == value.to_bits() {
            return;
        }
        self.info.publish(BusEvent::StateChange(StateEvent::Sensor(proto::SensorStateResponse {
            key: self.info.key(),
            state: value,
        })));
    }
}

#[async_trait]
impl Entity for Sensor {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    async fn describe(&self) -> Option<Described> {
        Some(Described::Sensor(proto::ListEntitiesSensorResponse { meta: self.info.list_meta() }))
    }

    async fn snapshot(&self) -> Option<StateEvent> {
        if !self.has_state.load(Ordering::Acquire) {
            return None;
        }
        Some(StateEvent::Sensor(proto::SensorStateResponse { key: self.info.key(), state: self.current() }))
    }

    async fn state_json(&self) -> Option<serde_json::Value> {
        if !self.has_state.load(Ordering::Acquire) {
            return None;
        }
        Some(serde_json::json!({
            "id": self.info.unique_id,
            "name": self.info.name,
            "state": self.current(),
            "unit_of_measurement": self.unit_of_measurement,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn float_idempotence_via_bit_pattern() {
        let sensor = Sensor::new("Temp", "dev", "02:00:00:01:02:03", None, None);
        sensor.set_state(21.5).await;
        let first = sensor.snapshot().await.unwrap();
        sensor.set_state(21.5).await;
        let second = sensor.snapshot().await.unwrap();
        assert_eq!(first.key(), second.key());
    }
}
