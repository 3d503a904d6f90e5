//! climate domain: mode vector plus either a single target
//! temperature or a two-point (low/high) target, mutually exclusive and
//! fixed at construction. Builds on the more complete revision of
//! `aioesphomeserver/climate.py` rather than its simpler earlier form.

use crate::entity::{BusEvent, ClientRequest, Described, Entity, EntityInfo, StateEvent};
use crate::error::ApiError;
use crate::proto;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Clone, Debug)]
struct ClimateState {
    mode: u32,
    current_temperature: f32,
    target_temperature: f32,
    target_temperature_low: f32,
    target_temperature_high: f32,
    fan_mode: u32,
    swing_mode: u32,
    action: u32,
    preset: u32,
    current_humidity: f32,
    target_humidity: f32,
}

impl Default for ClimateState {
    fn default() -> Self {
        Self {
            mode: 0,
            current_temperature: 21.0,
            target_temperature: 21.0,
            target_temperature_low: 19.0,
            target_temperature_high: 23.0,
            fan_mode: 0,
            swing_mode: 0,
            action: 0,
            preset: 0,
            current_humidity: 50.0,
            target_humidity: 50.0,
        }
    }
}

pub struct Climate {
    info: EntityInfo,
    state: Mutex<ClimateState>,
    has_state: AtomicBool,
    /// Set at construction; two-point and single-target representations
    /// cannot be switched at runtime.
    pub supports_two_point_target_temperature: bool,
    pub supports_current_temperature: bool,
    pub supports_current_humidity: bool,
    pub supports_target_humidity: bool,
    pub visual_min_temperature: f32,
    pub visual_max_temperature: f32,
    pub visual_temperature_step: f32,
}

impl Climate {
    pub fn new(
        name: &str,
        device_name: &str,
        device_mac: &str,
        object_id: Option<String>,
        unique_id: Option<String>,
        supports_two_point_target_temperature: bool,
    ) -> Self {
        Self {
            info: EntityInfo::new(name, "climate", device_name, device_mac, object_id, unique_id),
            state: Mutex::new(ClimateState::default()),
            has_state: AtomicBool::new(false),
            supports_two_point_target_temperature,
            supports_current_temperature: true,
            supports_current_humidity: false,
            supports_target_humidity: false,
            visual_min_temperature: 7.0,
            visual_max_temperature: 35.0,
            visual_temperature_step: 0.5,
        }
    }

    pub fn with_humidity(mut self) -> Self {
        self.supports_current_humidity = true;
        self.supports_target_humidity = true;
        self
    }

    fn state_response(&self, s: &ClimateState) -> proto::ClimateStateResponse {
        proto::ClimateStateResponse {
            key: self.info.key(),
            mode: s.mode,
            current_temperature: s.current_temperature,
            target_temperature: s.target_temperature,
            target_temperature_low: s.target_temperature_low,
            target_temperature_high: s.target_temperature_high,
            fan_mode: s.fan_mode,
            swing_mode: s.swing_mode,
            action: s.action,
            preset: s.preset,
            current_humidity: s.current_humidity,
            target_humidity: s.target_humidity,
        }
    }

    /// Apply fields present on `cmd`, gated by this unit's fixed
    /// single-target-vs-two-point representation. Emits at most one
    /// `state_change`.
    pub async fn apply_command(&self, cmd: &proto::ClimateCommandRequest) {
        let (changed, snapshot) = {
            let mut guard = self.state.lock().unwrap();
            let had_state = self.has_state.swap(true, Ordering::AcqRel);
            let mut changed = !had_state;

            if cmd.has_mode && guard.mode != cmd.mode {
                guard.mode = cmd.mode;
                changed = true;
            }
            if self.supports_two_point_target_temperature {
                if cmd.has_target_temperature_low && guard.target_temperature_low != cmd.target_temperature_low {
                    guard.target_temperature_low = cmd.target_temperature_low;
                    changed = true;
                }
                if cmd.has_target_temperature_high && guard.target_temperature_high != cmd.target_temperature_high {
                    guard.target_temperature_high = cmd.target_temperature_high;
                    changed = true;
                }
            } else if cmd.has_target_temperature && guard.target_temperature != cmd.target_temperature {
                guard.target_temperature = cmd.target_temperature;
                changed = true;
            }
            if cmd.has_fan_mode && guard.fan_mode != cmd.fan_mode {
                guard.fan_mode = cmd.fan_mode;
                changed = true;
            }
            if cmd.has_swing_mode && guard.swing_mode != cmd.swing_mode {
                guard.swing_mode = cmd.swing_mode;
                changed = true;
            }
            if cmd.has_preset && guard.preset != cmd.preset {
                guard.preset = cmd.preset;
                changed = true;
            }
            if self.supports_target_humidity
                && cmd.has_target_humidity
                && guard.target_humidity != cmd.target_humidity
            {
                guard.target_humidity = cmd.target_humidity;
                changed = true;
            }
            (changed, guard.clone())
        };

        if changed {
            self.info
                .publish(BusEvent::StateChange(StateEvent::Climate(self.state_response(&snapshot))));
        }
    }

    /// Set the current (measured, not target) temperature — an internal
    /// reading, not a client command (mirrors a simulated sensor feeding
    /// this climate unit).
    pub async fn set_current_temperature(&self, value: f32) {
        let (changed, snapshot) = {
            let mut guard = self.state.lock().unwrap();
            let changed = guard.current_temperature != value;
            guard.current_temperature = value;
            (changed, guard.clone())
        };
        if changed {
            self.info
                .publish(BusEvent::StateChange(StateEvent::Climate(self.state_response(&snapshot))));
        }
    }
}

fn json_u32(body: &serde_json::Value, key: &str) -> Option<u32> {
    body.get(key).and_then(|v| v.as_u64()).map(|v| v as u32)
}

fn json_f32(body: &serde_json::Value, key: &str) -> Option<f32> {
    body.get(key).and_then(|v| v.as_f64()).map(|v| v as f32)
}

#[async_trait]
impl Entity for Climate {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    async fn describe(&self) -> Option<Described> {
        Some(Described::Climate(proto::ListEntitiesClimateResponse {
            meta: self.info.list_meta(),
            supports_two_point_target_temperature: self.supports_two_point_target_temperature,
            supports_current_temperature: self.supports_current_temperature,
            supports_current_humidity: self.supports_current_humidity,
            supports_target_humidity: self.supports_target_humidity,
            visual_min_temperature: self.visual_min_temperature,
            visual_max_temperature: self.visual_max_temperature,
            visual_temperature_step: self.visual_temperature_step,
        }))
    }

    async fn snapshot(&self) -> Option<StateEvent> {
        if !self.has_state.load(Ordering::Acquire) {
            return None;
        }
        let s = self.state.lock().unwrap().clone();
        Some(StateEvent::Climate(self.state_response(&s)))
    }

    async fn state_json(&self) -> Option<serde_json::Value> {
        if !self.has_state.load(Ordering::Acquire) {
            return None;
        }
        let s = self.state.lock().unwrap().clone();
        Some(serde_json::json!({
            "id": self.info.unique_id,
            "name": self.info.name,
            "mode": s.mode,
            "current_temperature": s.current_temperature,
            "target_temperature": s.target_temperature,
            "target_temperature_low": s.target_temperature_low,
            "target_temperature_high": s.target_temperature_high,
            "fan_mode": s.fan_mode,
            "swing_mode": s.swing_mode,
            "action": s.action,
            "preset": s.preset,
            "current_humidity": s.current_humidity,
            "target_humidity": s.target_humidity,
        }))
    }

    async fn can_handle(&self, event: &BusEvent) -> bool {
        matches!(
            event,
            BusEvent::ClientRequest(ClientRequest { message_type, .. })
                if *message_type == proto::type_id::CLIMATE_COMMAND_REQUEST
        )
    }

    async fn handle(&self, event: &BusEvent) {
        if let BusEvent::ClientRequest(req) = event {
            if req.message_type != proto::type_id::CLIMATE_COMMAND_REQUEST {
                return;
            }
            let Ok(cmd) = proto::ClimateCommandRequest::decode(&req.payload) else { return };
            if cmd.key == self.info.key() {
                self.apply_command(&cmd).await;
            }
        }
    }

    async fn http_json_command(&self, action: &str, body: serde_json::Value) -> Result<(), ApiError> {
        let mut cmd = proto::ClimateCommandRequest { key: self.info.key(), ..Default::default() };
        match action {
            "set_mode" => {
                if let Some(mode) = json_u32(&body, "mode") {
                    cmd.has_mode = true;
                    cmd.mode = mode;
                }
            }
            "set_target_temperature" => {
                if self.supports_two_point_target_temperature {
                    if let Some(low) = json_f32(&body, "target_temperature_low") {
                        cmd.has_target_temperature_low = true;
                        cmd.target_temperature_low = low;
                    }
                    if let Some(high) = json_f32(&body, "target_temperature_high") {
                        cmd.has_target_temperature_high = true;
                        cmd.target_temperature_high = high;
                    }
                } else if let Some(target) = json_f32(&body, "target_temperature") {
                    cmd.has_target_temperature = true;
                    cmd.target_temperature = target;
                }
            }
            "set_fan_mode" => {
                if let Some(fan_mode) = json_u32(&body, "fan_mode") {
                    cmd.has_fan_mode = true;
                    cmd.fan_mode = fan_mode;
                }
            }
            "set_swing_mode" => {
                if let Some(swing_mode) = json_u32(&body, "swing_mode") {
                    cmd.has_swing_mode = true;
                    cmd.swing_mode = swing_mode;
                }
            }
            "set_preset" => {
                if let Some(preset) = json_u32(&body, "preset") {
                    cmd.has_preset = true;
                    cmd.preset = preset;
                }
            }
            "set" => {
                if let Some(mode) = json_u32(&body, "mode") {
                    cmd.has_mode = true;
                    cmd.mode = mode;
                }
                if let Some(target) = json_f32(&body, "target_temperature") {
                    cmd.has_target_temperature = true;
                    cmd.target_temperature = target;
                }
            }
            _ => {}
        }
        self.apply_command(&cmd).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn two_point_target_ignores_single_target_field() {
        let climate =
            Climate::new("Thermostat", "dev", "02:00:00:01:02:03", None, None, true);
        let cmd = proto::ClimateCommandRequest {
            key: 1,
            has_target_temperature: true,
            target_temperature: 99.0,
            has_target_temperature_low: true,
            target_temperature_low: 18.0,
            ..Default::default()
        };
        climate.apply_command(&cmd).await;
        let snap = climate.snapshot().await.unwrap();
        if let StateEvent::Climate(s) = snap {
            assert_eq!(s.target_temperature_low, 18.0);
            assert_ne!(s.target_temperature, 99.0);
        } else {
            panic!("expected climate state");
        }
    }

    #[tokio::test]
    async fn single_target_mode_ignores_two_point_fields() {
        let climate =
            Climate::new("Thermostat", "dev", "02:00:00:01:02:03", None, None, false);
        let cmd = proto::ClimateCommandRequest {
            key: 1,
            has_target_temperature: true,
            target_temperature: 24.0,
            has_target_temperature_low: true,
            target_temperature_low: 18.0,
            ..Default::default()
        };
        climate.apply_command(&cmd).await;
        let snap = climate.snapshot().await.unwrap();
        if let StateEvent::Climate(s) = snap {
            assert_eq!(s.target_temperature, 24.0);
            assert_ne!(s.target_temperature_low, 18.0);
        } else {
            panic!("expected climate state");
        }
    }
}
