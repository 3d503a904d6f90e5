//! binary_sensor domain: a scalar boolean reading with no commands.
//! Grounded on `aioesphomeserver/binary_sensor.py`.

use crate::entity::{BusEvent, Described, Entity, EntityInfo, StateEvent};
use crate::proto;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct BinarySensor {
    info: EntityInfo,
    state: AtomicBool,
    has_state: AtomicBool,
}

impl BinarySensor {
    pub fn new(
        name: &str,
        device_name: &str,
        device_mac: &str,
        object_id: Option<String>,
        unique_id: Option<String>,
    ) -> Self {
        Self {
            info: EntityInfo::new(name, "binary_sensor", device_name, device_mac, object_id, unique_id),
            state: AtomicBool::new(false),
            has_state: AtomicBool::new(false),
        }
    }

    /// A repeated call with the same value emits no further `state_change`.
    pub async fn set_state(&self, value: bool) {
        let had_state = self.has_state.swap(true, Ordering::AcqRel);
        let previous = self.state.swap(value, Ordering::AcqRel);
        if had_state && previous == value {
            return;
        }
        self.info.publish(BusEvent::StateChange(StateEvent::BinarySensor(
            proto::BinarySensorStateResponse { key: self.info.key(), state: value },
        )));
    }
}

#[async_trait]
impl Entity for BinarySensor {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    async fn describe(&self) -> Option<Described> {
        Some(Described::BinarySensor(proto::ListEntitiesBinarySensorResponse {
            meta: self.info.list_meta(),
        }))
    }

    async fn snapshot(&self) -> Option<StateEvent> {
        if !self.has_state.load(Ordering::Acquire) {
            return None;
        }
        Some(StateEvent::BinarySensor(proto::BinarySensorStateResponse {
            key: self.info.key(),
            state: self.state.load(Ordering::Acquire),
        }))
    }

    async fn state_json(&self) -> Option<serde_json::Value> {
        if !self.has_state.load(Ordering::Acquire) {
            return None;
        }
        Some(serde_json::json!({
            "id": self.info.unique_id,
            "name": self.info.name,
            "state": self.state.load(Ordering::Acquire),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_same_value_is_idempotent() {
        let sensor = BinarySensor::new("Motion", "dev", "02:00:00:01:02:03", None, None);
        sensor.set_state(true).await;
        assert_eq!(sensor.snapshot().await.unwrap().key(), 0);
        sensor.set_state(true).await;
        sensor.set_state(true).await;
        // No direct observer here since this entity isn't registered on a
        // device bus; the idempotence invariant is exercised end-to-end in
        // device::tests.
    }

    #[tokio::test]
    async fn snapshot_is_none_until_first_set() {
        let sensor = BinarySensor::new("Motion", "dev", "02:00:00:01:02:03", None, None);
        assert!(sensor.snapshot().await.is_none());
        sensor.set_state(false).await;
        assert!(sensor.snapshot().await.is_some());
    }
}
