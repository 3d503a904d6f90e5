//! light domain: a struct state gated by `has_*` command flags, with
//! HTTP query-parameter translation. Grounded on
//! `aioesphomeserver/light.py` (`set_state_from_command`/
//! `set_state_from_query`), minus the source's `"b": self.green` bug in its
//! `state_json` color block.

use crate::entity::{BusEvent, ClientRequest, Described, Entity, EntityInfo, StateEvent};
use crate::error::ApiError;
use crate::proto;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

pub const COLOR_MODE_ON_OFF: u32 = 1;
pub const COLOR_MODE_BRIGHTNESS: u32 = 2;
pub const COLOR_MODE_RGB: u32 = 3;
pub const COLOR_MODE_WHITE: u32 = 4;
pub const COLOR_MODE_COLOR_TEMPERATURE: u32 = 5;

#[derive(Clone, Debug)]
struct LightState {
    on: bool,
    brightness: f32,
    color_mode: u32,
    red: f32,
    green: f32,
    blue: f32,
    white: f32,
    color_temperature: f32,
    effect: String,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            on: false,
            brightness: 1.0,
            color_mode: COLOR_MODE_ON_OFF,
            red: 1.0,
            green: 1.0,
            blue: 1.0,
            white: 1.0,
            color_temperature: 1.0,
            effect: String::new(),
        }
    }
}

pub struct Light {
    info: EntityInfo,
    state: Mutex<LightState>,
    has_state: std::sync::atomic::AtomicBool,
    pub supports_brightness: bool,
    pub supports_rgb: bool,
    pub supports_white_value: bool,
    pub supports_color_temperature: bool,
    pub effects: Vec<String>,
}

impl Light {
    pub fn new(
        name: &str,
        device_name: &str,
        device_mac: &str,
        object_id: Option<String>,
        unique_id: Option<String>,
    ) -> Self {
        Self {
            info: EntityInfo::new(name, "light", device_name, device_mac, object_id, unique_id),
            state: Mutex::new(LightState::default()),
            has_state: std::sync::atomic::AtomicBool::new(false),
            supports_brightness: false,
            supports_rgb: false,
            supports_white_value: false,
            supports_color_temperature: false,
            effects: Vec::new(),
        }
    }

    pub fn with_rgb(mut self) -> Self {
        self.supports_rgb = true;
        self.supports_brightness = true;
        self
    }

    pub fn with_brightness(mut self) -> Self {
        self.supports_brightness = true;
        self
    }

    pub fn with_effects(mut self, effects: Vec<String>) -> Self {
        self.effects = effects;
        self
    }

    fn state_response(&self, s: &LightState) -> proto::LightStateResponse {
        proto::LightStateResponse {
            key: self.info.key(),
            state: s.on,
            brightness: s.brightness,
            color_mode: s.color_mode,
            red: s.red,
            green: s.green,
            blue: s.blue,
            white: s.white,
            color_temperature: s.color_temperature,
            effect: s.effect.clone(),
        }
    }

    /// Apply only the fields whose `has_*` flag is set. Emits at most
    /// one `state_change` per call.
    pub async fn apply_command(&self, cmd: &proto::LightCommandRequest) {
        let (changed, snapshot) = {
            let mut guard = self.state.lock().unwrap();
            let had_state = self.has_state.swap(true, std::sync::atomic::Ordering::AcqRel);
            let mut changed = !had_state;

            if cmd.has_state && guard.on != cmd.state {
                guard.on = cmd.state;
                changed = true;
            }
            if cmd.has_brightness && guard.brightness != cmd.brightness {
                guard.brightness = cmd.brightness;
                changed = true;
            }
            if cmd.has_rgb && (guard.red != cmd.red || guard.green != cmd.green || guard.blue != cmd.blue) {
                guard.red = cmd.red;
                guard.green = cmd.green;
                guard.blue = cmd.blue;
                guard.color_mode = COLOR_MODE_RGB;
                changed = true;
            }
            if cmd.has_white && guard.white != cmd.white {
                guard.white = cmd.white;
                changed = true;
            }
            if cmd.has_color_temperature && guard.color_temperature != cmd.color_temperature {
                guard.color_temperature = cmd.color_temperature;
                guard.color_mode = COLOR_MODE_COLOR_TEMPERATURE;
                changed = true;
            }
            if cmd.has_effect && guard.effect != cmd.effect {
                guard.effect = cmd.effect.clone();
                changed = true;
            }
            (changed, guard.clone())
        };

        if changed {
            self.info
                .publish(BusEvent::StateChange(StateEvent::Light(self.state_response(&snapshot))));
        }
    }

    /// Translate HTTP query parameters into a `LightCommandRequest`, matching
    /// `set_state_from_query`: 0..255 integer params become 0.0..1.0 floats;
    /// `effect`/`color_temp` pass through; any of r/g/b sets `has_rgb`.
    fn command_from_query(&self, state: bool, params: &HashMap<String, String>) -> proto::LightCommandRequest {
        let mut cmd = proto::LightCommandRequest {
            key: self.info.key(),
            has_state: true,
            state,
            ..Default::default()
        };

        if let Some(effect) = params.get("effect") {
            cmd.has_effect = true;
            cmd.effect = effect.clone();
        }
        if let Some(b) = params.get("brightness").and_then(|v| v.parse::<f32>().ok()) {
            cmd.has_brightness = true;
            cmd.brightness = b / 255.0;
        }
        if let Some(w) = params.get("white_value").and_then(|v| v.parse::<f32>().ok()) {
            cmd.has_white = true;
            cmd.white = w / 255.0;
        }
        let r = params.get("r").and_then(|v| v.parse::<f32>().ok());
        let g = params.get("g").and_then(|v| v.parse::<f32>().ok());
        let b = params.get("b").and_then(|v| v.parse::<f32>().ok());
        if r.is_some() || g.is_some() || b.is_some() {
            cmd.has_rgb = true;
            cmd.red = r.map(|v| v / 255.0).unwrap_or(0.0);
            cmd.green = g.map(|v| v / 255.0).unwrap_or(0.0);
            cmd.blue = b.map(|v| v / 255.0).unwrap_or(0.0);
        }
        if let Some(ct) = params.get("color_temp").and_then(|v| v.parse::<f32>().ok()) {
            cmd.has_color_temperature = true;
            cmd.color_temperature = ct;
        }
        cmd
    }
}

#[async_trait]
impl Entity for Light {
    fn info(&self) -> &EntityInfo {
        &self.info
    }

    async fn describe(&self) -> Option<Described> {
        Some(Described::Light(proto::ListEntitiesLightResponse {
            meta: self.info.list_meta(),
            supports_brightness: self.supports_brightness,
            supports_rgb: self.supports_rgb,
            supports_white_value: self.supports_white_value,
            supports_color_temperature: self.supports_color_temperature,
            min_mireds: 153.0,
            max_mireds: 500.0,
            effects: self.effects.clone(),
        }))
    }

    async fn snapshot(&self) -> Option<StateEvent> {
        if !self.has_state.load(std::sync::atomic::Ordering::Acquire) {
            return None;
        }
        let s = self.state.lock().unwrap().clone();
        Some(StateEvent::Light(self.state_response(&s)))
    }

    async fn state_json(&self) -> Option<serde_json::Value> {
        if !self.has_state.load(std::sync::atomic::Ordering::Acquire) {
            return None;
        }
        let s = self.state.lock().unwrap().clone();
        Some(serde_json::json!({
            "id": self.info.unique_id,
            "name": self.info.name,
            "state": if s.on { "ON" } else { "OFF" },
            "brightness": (s.brightness * 255.0) as i32,
            "color": { "r": s.red, "g": s.green, "b": s.blue },
            "effects": self.effects,
            "effect": s.effect,
            "white_value": s.white,
        }))
    }

    async fn can_handle(&self, event: &BusEvent) -> bool {
        matches!(
            event,
            BusEvent::ClientRequest(ClientRequest { message_type, .. })
                if *message_type == proto::type_id::LIGHT_COMMAND_REQUEST
        )
    }

    async fn handle(&self, event: &BusEvent) {
        if let BusEvent::ClientRequest(req) = event {
            if req.message_type != proto::type_id::LIGHT_COMMAND_REQUEST {
                return;
            }
            let Ok(cmd) = proto::LightCommandRequest::decode(&req.payload) else { return };
            if cmd.key == self.info.key() {
                self.apply_command(&cmd).await;
            }
        }
    }

    async fn http_command(&self, action: &str, params: &HashMap<String, String>) -> Result<(), ApiError> {
        let state = match action {
            "turn_on" => true,
            "turn_off" => false,
            _ => return Ok(()),
        };
        let cmd = self.command_from_query(state, params);
        self.apply_command(&cmd).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rgb_command_sets_fields_and_emits_once() {
        let light = Light::new("Lamp", "dev", "02:00:00:01:02:03", None, None).with_rgb();
        let cmd = proto::LightCommandRequest {
            key: 1,
            has_state: true,
            state: true,
            has_rgb: true,
            red: 0.5,
            green: 0.25,
            blue: 1.0,
            ..Default::default()
        };
        light.apply_command(&cmd).await;
        let snap = light.snapshot().await.unwrap();
        if let StateEvent::Light(s) = snap {
            assert!(s.state);
            assert_eq!(s.red, 0.5);
            assert_eq!(s.green, 0.25);
            assert_eq!(s.blue, 1.0);
        } else {
            panic!("expected light state");
        }
    }

    #[tokio::test]
    async fn repeating_same_command_emits_nothing_further() {
        let light = Light::new("Lamp", "dev", "02:00:00:01:02:03", None, None).with_rgb();
        let cmd = proto::LightCommandRequest {
            key: 1,
            has_state: true,
            state: true,
            has_rgb: true,
            red: 0.5,
            green: 0.25,
            blue: 1.0,
            ..Default::default()
        };
        light.apply_command(&cmd).await;
        light.apply_command(&cmd).await;
        // no observer attached here; repeated-call behavior covered at the
        // device level where publish counts can be observed.
    }

    #[tokio::test]
    async fn query_translation_divides_by_255() {
        let light = Light::new("Lamp", "dev", "02:00:00:01:02:03", None, None).with_rgb();
        let mut params = HashMap::new();
        params.insert("brightness".to_string(), "128".to_string());
        params.insert("r".to_string(), "255".to_string());
        light.http_command("turn_on", &params).await.unwrap();
        let s = light.state.lock().unwrap().clone();
        assert!((s.brightness - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(s.red, 1.0);
    }
}
