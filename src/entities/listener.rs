//! listener domain: an internal entity with no wire presence that
//! mirrors one entity's state onto another. Grounded on
//! `aioesphomeserver/listener.py`'s `can_handle` gating (event key equals
//! the referenced entity's key, never for `log`), generalized with a
//! `handle` body since the mirroring behavior isn't shown in the retained
//! revision of that file.

use crate::entities::binary_sensor::BinarySensor;
use crate::entity::{BusEvent, Entity, EntityInfo, StateEvent};
use async_trait::async_trait;
use std::sync::Arc;

/// Mirrors a switch's boolean state onto a binary sensor by listening on
/// the switch's key and reflecting its state.
pub struct Listener {
    info: EntityInfo,
    watch_key: u32,
    target: Arc<BinarySensor>,
}

impl Listener {
    pub fn new(
        name: &str,
        device_name: &str,
        device_mac: &str,
        watch_key: u32,
        target: Arc<BinarySensor>,
    ) -> Self {
        Self {
            info: EntityInfo::new(name, "listener", device_name, device_mac, None, None),
            watch_key,
            target,
        }
    }
}

#[async_trait]
impl Entity for Listener {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    // describe/snapshot/state_json default to None: a listener has no wire
    // or HTTP presence, matching `basic_entity.py`'s no-op defaults.

    async fn can_handle(&self, event: &BusEvent) -> bool {
        match event {
            BusEvent::StateChange(state_event) => state_event.key() == self.watch_key,
            BusEvent::Log(..) | BusEvent::ClientRequest(..) => false,
        }
    }

    async fn handle(&self, event: &BusEvent) {
        if let BusEvent::StateChange(state_event) = event {
            let mirrored = match state_event {
                StateEvent::Switch(s) => Some(s.state),
                StateEvent::BinarySensor(s) => Some(s.state),
                _ => None,
            };
            if let Some(value) = mirrored {
                self.target.set_state(value).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::switch::Switch;
    use crate::proto;

    #[tokio::test]
    async fn mirrors_watched_switch_onto_target_sensor() {
        let sensor = Arc::new(BinarySensor::new("Mirror", "dev", "02:00:00:01:02:03", None, None));
        sensor.info().set_key(1);
        let switch = Switch::new("Source", "dev", "02:00:00:01:02:03", None, None);
        switch.info().set_key(2);

        let listener = Listener::new("Listener", "dev", "02:00:00:01:02:03", 2, sensor.clone());

        let event = BusEvent::StateChange(StateEvent::Switch(proto::SwitchStateResponse { key: 2, state: true }));
        assert!(listener.can_handle(&event).await);
        listener.handle(&event).await;
        assert_eq!(sensor.snapshot().await.unwrap().key(), 1);
    }

    #[tokio::test]
    async fn ignores_events_for_other_keys_and_logs() {
        let sensor = Arc::new(BinarySensor::new("Mirror", "dev", "02:00:00:01:02:03", None, None));
        let listener = Listener::new("Listener", "dev", "02:00:00:01:02:03", 2, sensor.clone());

        let other_key_event = BusEvent::StateChange(StateEvent::Switch(proto::SwitchStateResponse { key: 3, state: true }));
        assert!(!listener.can_handle(&other_key_event).await);

        let log_event = BusEvent::Log(3, "hello".into());
        assert!(!listener.can_handle(&log_event).await);
    }
}
