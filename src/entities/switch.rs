//! switch domain: a scalar boolean with a client/HTTP command surface.
//! Grounded on `aioesphomeserver/switch.py`.

use crate::entity::{BusEvent, ClientRequest, Described, Entity, EntityInfo, StateEvent};
use crate::error::ApiError;
use crate::proto;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Switch {
    info: EntityInfo,
    state: AtomicBool,
}

impl Switch {
    pub fn new(
        name: &str,
        device_name: &str,
        device_mac: &str,
        object_id: Option<String>,
        unique_id: Option<String>,
    ) -> Self {
        Self {
            info: EntityInfo::new(name, "switch", device_name, device_mac, object_id, unique_id),
            state: AtomicBool::new(false),
        }
    }

    /// A repeated call with the same value emits no further `state_change`;
    /// a switch always has a defined state (defaults to off), unlike sensors
    /// which start absent.
    pub async fn set_state(&self, value: bool) {
        let previous = self.state.swap(value, Ordering::AcqRel);
        if previous == value {
            return;
        }
        self.info.publish(BusEvent::StateChange(StateEvent::Switch(proto::SwitchStateResponse {
            key: self.info.key(),
            state: value,
        })));
    }

    pub fn state(&self) -> bool {
        self.state.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Entity for Switch {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    async fn describe(&self) -> Option<Described> {
        Some(Described::Switch(proto::ListEntitiesSwitchResponse { meta: self.info.list_meta() }))
    }

    async fn snapshot(&self) -> Option<StateEvent> {
        Some(StateEvent::Switch(proto::SwitchStateResponse { key: self.info.key(), state: self.state() }))
    }

    async fn state_json(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "id": self.info.unique_id,
            "name": self.info.name,
            "state": if self.state() { "ON" } else { "OFF" },
            "value": self.state(),
        }))
    }

    async fn can_handle(&self, event: &BusEvent) -> bool {
        matches!(
            event,
            BusEvent::ClientRequest(ClientRequest { message_type, .. })
                if *message_type == proto::type_id::SWITCH_COMMAND_REQUEST
        )
    }

    async fn handle(&self, event: &BusEvent) {
        if let BusEvent::ClientRequest(req) = event {
            if req.message_type != proto::type_id::SWITCH_COMMAND_REQUEST {
                return;
            }
            let Ok(cmd) = proto::SwitchCommandRequest::decode(&req.payload) else { return };
            if cmd.key == self.info.key() {
                self.set_state(cmd.state).await;
            }
        }
    }

    async fn http_command(&self, action: &str, _params: &HashMap<String, String>) -> Result<(), ApiError> {
        match action {
            "turn_on" => self.set_state(true).await,
            "turn_off" => self.set_state(false).await,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_switch_command(key: u32, state: bool) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(crate::frame::write_varint(((1u64) << 3) | 0)); // key tag
        bytes.extend(crate::frame::write_varint(key as u64));
        bytes.extend(crate::frame::write_varint(((2u64) << 3) | 0)); // state tag
        bytes.extend(crate::frame::write_varint(state as u64));
        bytes
    }

    #[tokio::test]
    async fn command_with_matching_key_applies() {
        let switch = Switch::new("Lamp", "dev", "02:00:00:01:02:03", None, None);
        switch.info().set_key(1);
        let event = BusEvent::ClientRequest(ClientRequest {
            message_type: proto::type_id::SWITCH_COMMAND_REQUEST,
            payload: encode_switch_command(1, true),
        });
        switch.handle(&event).await;
        assert!(switch.state());
    }

    #[tokio::test]
    async fn command_with_other_key_is_ignored() {
        let switch = Switch::new("Lamp", "dev", "02:00:00:01:02:03", None, None);
        switch.info().set_key(1);
        let event = BusEvent::ClientRequest(ClientRequest {
            message_type: proto::type_id::SWITCH_COMMAND_REQUEST,
            payload: encode_switch_command(2, true),
        });
        switch.handle(&event).await;
        assert!(!switch.state());
    }
}
