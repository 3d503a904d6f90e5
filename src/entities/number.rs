//! number domain: a scalar float with optional min/max/step bounds
//! and a client/HTTP command surface. Grounded on `aioesphomeserver/number.py`.

use crate::entity::{BusEvent, ClientRequest, Described, Entity, EntityInfo, StateEvent};
use crate::error::ApiError;
use crate::proto;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct Number {
    info: EntityInfo,
    state_bits: AtomicU32,
    has_state: AtomicBool,
    pub min_value: Option<f32>,
    pub max_value: Option<f32>,
    pub step: f32,
}

impl Number {
    pub fn new(
        name: &str,
        device_name: &str,
        device_mac: &str,
        object_id: Option<String>,
        unique_id: Option<String>,
    ) -> Self {
        Self {
            info: EntityInfo::new(name, "number", device_name, device_mac, object_id, unique_id),
            state_bits: AtomicU32::new(0),
            has_state: AtomicBool::new(false),
            min_value: None,
            max_value: None,
            step: 1.0,
        }
    }

    pub fn with_bounds(mut self, min_value: f32, max_value: f32, step: f32) -> Self {
        self.min_value = Some(min_value);
        self.max_value = Some(max_value);
        self.step = step;
        self
    }

    fn current(&self) -> f32 {
        f32::from_bits(self.state_bits.load(Ordering::Acquire))
    }

    /// Clamps to `[min_value, max_value]` when configured. A repeated call
    /// with the same resulting value emits no further `state_change`.
    pub async fn set_state(&self, value: f32) {
        let clamped = match (self.min_value, self.max_value) {
            (Some(min), Some(max)) => value.clamp(min, max),
            _ => value,
        };
        let had_state = self.has_state.swap(true, Ordering::AcqRel);
        let previous_bits = self.state_bits.swap(clamped.to_bits(), Ordering::AcqRel);
        if had_state && previous_bits == clamped.to_bits() {
            return;
        }
        self.info.publish(BusEvent::StateChange(StateEvent::Number(proto::NumberStateResponse {
            key: self.info.key(),
            state: clamped,
        })));
    }
}

#[async_trait]
impl Entity for Number {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    async fn describe(&self) -> Option<Described> {
        Some(Described::Number(proto::ListEntitiesNumberResponse {
            meta: self.info.list_meta(),
            min_value: self.min_value.unwrap_or(0.0),
            max_value: self.max_value.unwrap_or(100.0),
            step: self.step,
        }))
    }

    async fn snapshot(&self) -> Option<StateEvent> {
        if !self.has_state.load(Ordering::Acquire) {
            return None;
        }
        Some(StateEvent::Number(proto::NumberStateResponse { key: self.info.key(), state: self.current() }))
    }

    async fn state_json(&self) -> Option<serde_json::Value> {
        if !self.has_state.load(Ordering::Acquire) {
            return None;
        }
        Some(serde_json::json!({
            "id": self.info.unique_id,
            "name": self.info.name,
            "state": self.current(),
        }))
    }

    async fn can_handle(&self, event: &BusEvent) -> bool {
        matches!(
            event,
            BusEvent::ClientRequest(ClientRequest { message_type, .. })
                if *message_type == proto::type_id::NUMBER_COMMAND_REQUEST
        )
    }

    async fn handle(&self, event: &BusEvent) {
        if let BusEvent::ClientRequest(req) = event {
            if req.message_type != proto::type_id::NUMBER_COMMAND_REQUEST {
                return;
            }
            let Ok(cmd) = proto::NumberCommandRequest::decode(&req.payload) else { return };
            if cmd.key == self.info.key() {
                self.set_state(cmd.state).await;
            }
        }
    }

    async fn http_command(&self, action: &str, params: &HashMap<String, String>) -> Result<(), ApiError> {
        if action != "set" {
            return Ok(());
        }
        if let Some(value) = params.get("value").and_then(|v| v.parse::<f32>().ok()) {
            self.set_state(value).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn out_of_range_value_is_clamped() {
        let number = Number::new("Target", "dev", "02:00:00:01:02:03", None, None).with_bounds(0.0, 10.0, 1.0);
        number.set_state(99.0).await;
        assert_eq!(number.current(), 10.0);
        number.set_state(-5.0).await;
        assert_eq!(number.current(), 0.0);
    }
}
