//! The closed registry of native-API message structs and their
//! payload encoding.
//!
//! Each message is encoded with the same tag/wire-type scheme the real
//! ESPHome API protobufs use (varint tag = `(field_num << 3) | wire_type`),
//! but the structs and (de)serializers here are hand-written rather than
//! generated from `.proto` sources, since this crate has no build-time
//! codegen step. Unknown fields on decode are skipped rather than rejected,
//! matching the frame codec's own forward-compat stance on unknown message
//! types.

use crate::error::FrameError;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED32: u8 = 5;
const WIRE_LEN: u8 = 2;

fn put_varint(out: &mut Vec<u8>, tag: u32, value: u64) {
    out.extend(crate::frame::write_varint(((tag as u64) << 3) | WIRE_VARINT as u64));
    out.extend(crate::frame::write_varint(value));
}

fn put_bool(out: &mut Vec<u8>, tag: u32, value: bool) {
    put_varint(out, tag, value as u64);
}

fn put_string(out: &mut Vec<u8>, tag: u32, value: &str) {
    out.extend(crate::frame::write_varint(((tag as u64) << 3) | WIRE_LEN as u64));
    out.extend(crate::frame::write_varint(value.len() as u64));
    out.extend_from_slice(value.as_bytes());
}

fn put_float(out: &mut Vec<u8>, tag: u32, value: f32) {
    out.extend(crate::frame::write_varint(((tag as u64) << 3) | WIRE_FIXED32 as u64));
    out.extend_from_slice(&value.to_le_bytes());
}

/// One decoded `(field_num, value)` pair; `value` already demultiplexed by
/// wire type into varint/fixed32/bytes form.
enum Field {
    Varint(u32, u64),
    Fixed32(u32, [u8; 4]),
    Bytes(u32, Vec<u8>),
}

fn parse_fields(payload: &[u8]) -> Result<Vec<Field>, FrameError> {
    let mut cursor = std::io::Cursor::new(payload);
    let mut fields = Vec::new();
    while (cursor.position() as usize) < payload.len() {
        let tag = blocking_read_varint(&mut cursor)?;
        let field_num = (tag >> 3) as u32;
        let wire_type = (tag & 0x7) as u8;
        match wire_type {
            WIRE_VARINT => {
                let v = blocking_read_varint(&mut cursor)?;
                fields.push(Field::Varint(field_num, v));
            }
            WIRE_FIXED32 => {
                let pos = cursor.position() as usize;
                if pos + 4 > payload.len() {
                    return Err(FrameError::Malformed(field_num, "truncated fixed32".into()));
                }
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&payload[pos..pos + 4]);
                cursor.set_position((pos + 4) as u64);
                fields.push(Field::Fixed32(field_num, buf));
            }
            WIRE_LEN => {
                let len = blocking_read_varint(&mut cursor)? as usize;
                let pos = cursor.position() as usize;
                if pos + len > payload.len() {
                    return Err(FrameError::Malformed(field_num, "truncated length-delimited field".into()));
                }
                fields.push(Field::Bytes(field_num, payload[pos..pos + len].to_vec()));
                cursor.set_position((pos + len) as u64);
            }
            other => return Err(FrameError::Malformed(field_num, format!("unsupported wire type {other}"))),
        }
    }
    Ok(fields)
}

/// Synchronous varint reader over an in-memory cursor (decode always has the
/// full payload already, unlike the async frame-level reader).
fn blocking_read_varint(cursor: &mut std::io::Cursor<&[u8]>) -> Result<u64, FrameError> {
    use std::io::Read;
    let mut result: u64 = 0;
    let mut bitpos = 0;
    loop {
        let mut byte = [0u8; 1];
        cursor.read_exact(&mut byte).map_err(|_| FrameError::ShortRead)?;
        result |= ((byte[0] & 0x7F) as u64) << bitpos;
        if byte[0] & 0x80 == 0 {
            return Ok(result);
        }
        bitpos += 7;
    }
}

fn field_string(fields: &[Field], num: u32) -> Option<String> {
    fields.iter().find_map(|f| match f {
        Field::Bytes(n, b) if *n == num => Some(String::from_utf8_lossy(b).into_owned()),
        _ => None,
    })
}

fn field_bool(fields: &[Field], num: u32) -> Option<bool> {
    fields.iter().find_map(|f| match f {
        Field::Varint(n, v) if *n == num => Some(*v != 0),
        _ => None,
    })
}

fn field_u32(fields: &[Field], num: u32) -> Option<u32> {
    fields.iter().find_map(|f| match f {
        Field::Varint(n, v) if *n == num => Some(*v as u32),
        _ => None,
    })
}

fn field_f32(fields: &[Field], num: u32) -> Option<f32> {
    fields.iter().find_map(|f| match f {
        Field::Fixed32(n, b) if *n == num => Some(f32::from_le_bytes(*b)),
        _ => None,
    })
}

/// Message-type ids shared with upstream ESPHome native-API clients.
pub mod type_id {
    pub const HELLO_REQUEST: u32 = 1;
    pub const HELLO_RESPONSE: u32 = 2;
    pub const CONNECT_REQUEST: u32 = 3;
    pub const CONNECT_RESPONSE: u32 = 4;
    pub const DISCONNECT_REQUEST: u32 = 5;
    pub const DISCONNECT_RESPONSE: u32 = 6;
    pub const PING_REQUEST: u32 = 7;
    pub const PING_RESPONSE: u32 = 8;
    pub const DEVICE_INFO_REQUEST: u32 = 9;
    pub const DEVICE_INFO_RESPONSE: u32 = 10;
    pub const LIST_ENTITIES_REQUEST: u32 = 11;
    pub const LIST_ENTITIES_DONE_RESPONSE: u32 = 19;
    pub const LIST_ENTITIES_BINARY_SENSOR_RESPONSE: u32 = 12;
    pub const LIST_ENTITIES_SENSOR_RESPONSE: u32 = 16;
    pub const LIST_ENTITIES_SWITCH_RESPONSE: u32 = 17;
    pub const LIST_ENTITIES_NUMBER_RESPONSE: u32 = 49;
    pub const LIST_ENTITIES_LIGHT_RESPONSE: u32 = 15;
    pub const LIST_ENTITIES_CLIMATE_RESPONSE: u32 = 46;
    pub const BINARY_SENSOR_STATE_RESPONSE: u32 = 21;
    pub const SENSOR_STATE_RESPONSE: u32 = 25;
    pub const SWITCH_STATE_RESPONSE: u32 = 26;
    pub const NUMBER_STATE_RESPONSE: u32 = 50;
    pub const LIGHT_STATE_RESPONSE: u32 = 24;
    pub const CLIMATE_STATE_RESPONSE: u32 = 47;
    pub const SWITCH_COMMAND_REQUEST: u32 = 33;
    pub const LIGHT_COMMAND_REQUEST: u32 = 32;
    pub const NUMBER_COMMAND_REQUEST: u32 = 48;
    pub const CLIMATE_COMMAND_REQUEST: u32 = 46 + 30; // 76, disjoint from response ids above
    pub const SUBSCRIBE_LOGS_REQUEST: u32 = 28;
    pub const SUBSCRIBE_LOGS_RESPONSE: u32 = 29;
    pub const SUBSCRIBE_STATES_REQUEST: u32 = 20;
    pub const GET_TIME_REQUEST: u32 = 36;
    pub const GET_TIME_RESPONSE: u32 = 37;
}

macro_rules! empty_message {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name;

        impl $name {
            pub fn encode(&self) -> Vec<u8> {
                Vec::new()
            }
            pub fn decode(_payload: &[u8]) -> Result<Self, FrameError> {
                Ok(Self)
            }
        }
    };
}

empty_message!(DisconnectRequest);
empty_message!(DisconnectResponse);
empty_message!(PingRequest);
empty_message!(PingResponse);
empty_message!(ListEntitiesRequest);
empty_message!(ListEntitiesDoneResponse);
empty_message!(SubscribeStatesRequest);

#[derive(Debug, Clone, PartialEq)]
pub struct HelloRequest {
    pub client_info: String,
    pub api_version_major: u32,
    pub api_version_minor: u32,
}

impl HelloRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_string(&mut out, 1, &self.client_info);
        put_varint(&mut out, 2, self.api_version_major as u64);
        put_varint(&mut out, 3, self.api_version_minor as u64);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            client_info: field_string(&fields, 1).unwrap_or_default(),
            api_version_major: field_u32(&fields, 2).unwrap_or(0),
            api_version_minor: field_u32(&fields, 3).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HelloResponse {
    pub api_version_major: u32,
    pub api_version_minor: u32,
    pub server_info: String,
}

impl HelloResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.api_version_major as u64);
        put_varint(&mut out, 2, self.api_version_minor as u64);
        put_string(&mut out, 3, &self.server_info);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            api_version_major: field_u32(&fields, 1).unwrap_or(0),
            api_version_minor: field_u32(&fields, 2).unwrap_or(0),
            server_info: field_string(&fields, 3).unwrap_or_default(),
        })
    }
}

/// `password` supports the one authentication surface this crate carries,
/// a flat optional shared secret compared directly on `Connect`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectRequest {
    pub password: String,
}

impl ConnectRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_string(&mut out, 1, &self.password);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            password: field_string(&fields, 1).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectResponse {
    pub invalid_password: bool,
}

impl ConnectResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, 1, self.invalid_password);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            invalid_password: field_bool(&fields, 1).unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfoRequest;

impl DeviceInfoRequest {
    pub fn decode(_payload: &[u8]) -> Result<Self, FrameError> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfoResponse {
    pub uses_password: bool,
    pub name: String,
    pub mac_address: String,
    pub model: String,
    pub manufacturer: String,
    pub friendly_name: String,
    pub project_name: String,
    pub project_version: String,
}

impl DeviceInfoResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, 1, self.uses_password);
        put_string(&mut out, 2, &self.name);
        put_string(&mut out, 3, &self.mac_address);
        put_string(&mut out, 4, &self.model);
        put_string(&mut out, 5, &self.manufacturer);
        put_string(&mut out, 6, &self.friendly_name);
        put_string(&mut out, 7, &self.project_name);
        put_string(&mut out, 8, &self.project_version);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            uses_password: field_bool(&fields, 1).unwrap_or(false),
            name: field_string(&fields, 2).unwrap_or_default(),
            mac_address: field_string(&fields, 3).unwrap_or_default(),
            model: field_string(&fields, 4).unwrap_or_default(),
            manufacturer: field_string(&fields, 5).unwrap_or_default(),
            friendly_name: field_string(&fields, 6).unwrap_or_default(),
            project_name: field_string(&fields, 7).unwrap_or_default(),
            project_version: field_string(&fields, 8).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeLogsRequest {
    pub level: u32,
}

impl SubscribeLogsRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            level: field_u32(&fields, 1).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeLogsResponse {
    pub level: u32,
    pub message: String,
}

impl SubscribeLogsResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.level as u64);
        put_string(&mut out, 3, &self.message);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            level: field_u32(&fields, 1).unwrap_or(0),
            message: field_string(&fields, 3).unwrap_or_default(),
        })
    }
}

empty_message!(GetTimeRequest);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetTimeResponse {
    pub epoch_seconds: u32,
}

impl GetTimeResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.epoch_seconds as u64);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            epoch_seconds: field_u32(&fields, 1).unwrap_or(0),
        })
    }
}

/// Shared metadata block every `ListEntities*Response` carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityListMeta {
    pub object_id: String,
    pub key: u32,
    pub name: String,
    pub unique_id: String,
    pub icon: String,
    pub device_class: String,
    pub entity_category: u32,
}

fn encode_list_meta(out: &mut Vec<u8>, meta: &EntityListMeta) {
    put_string(out, 1, &meta.object_id);
    put_varint(out, 2, meta.key as u64);
    put_string(out, 3, &meta.name);
    put_string(out, 4, &meta.unique_id);
    put_string(out, 5, &meta.icon);
    put_string(out, 6, &meta.device_class);
    put_varint(out, 7, meta.entity_category as u64);
}

fn decode_list_meta(fields: &[Field]) -> EntityListMeta {
    EntityListMeta {
        object_id: field_string(fields, 1).unwrap_or_default(),
        key: field_u32(fields, 2).unwrap_or(0),
        name: field_string(fields, 3).unwrap_or_default(),
        unique_id: field_string(fields, 4).unwrap_or_default(),
        icon: field_string(fields, 5).unwrap_or_default(),
        device_class: field_string(fields, 6).unwrap_or_default(),
        entity_category: field_u32(fields, 7).unwrap_or(0),
    }
}

macro_rules! list_entities_response {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            pub meta: EntityListMeta,
        }

        impl $name {
            pub fn encode(&self) -> Vec<u8> {
                let mut out = Vec::new();
                encode_list_meta(&mut out, &self.meta);
                out
            }
            pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
                let fields = parse_fields(payload)?;
                Ok(Self { meta: decode_list_meta(&fields) })
            }
        }
    };
}

list_entities_response!(ListEntitiesBinarySensorResponse);
list_entities_response!(ListEntitiesSensorResponse);
list_entities_response!(ListEntitiesSwitchResponse);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListEntitiesNumberResponse {
    pub meta: EntityListMeta,
    pub min_value: f32,
    pub max_value: f32,
    pub step: f32,
}

impl ListEntitiesNumberResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_list_meta(&mut out, &self.meta);
        put_float(&mut out, 8, self.min_value);
        put_float(&mut out, 9, self.max_value);
        put_float(&mut out, 10, self.step);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            meta: decode_list_meta(&fields),
            min_value: field_f32(&fields, 8).unwrap_or(0.0),
            max_value: field_f32(&fields, 9).unwrap_or(0.0),
            step: field_f32(&fields, 10).unwrap_or(1.0),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListEntitiesLightResponse {
    pub meta: EntityListMeta,
    pub supports_brightness: bool,
    pub supports_rgb: bool,
    pub supports_white_value: bool,
    pub supports_color_temperature: bool,
    pub min_mireds: f32,
    pub max_mireds: f32,
    pub effects: Vec<String>,
}

impl ListEntitiesLightResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_list_meta(&mut out, &self.meta);
        put_bool(&mut out, 8, self.supports_brightness);
        put_bool(&mut out, 9, self.supports_rgb);
        put_bool(&mut out, 10, self.supports_white_value);
        put_bool(&mut out, 11, self.supports_color_temperature);
        put_float(&mut out, 12, self.min_mireds);
        put_float(&mut out, 13, self.max_mireds);
        for effect in &self.effects {
            put_string(&mut out, 14, effect);
        }
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        let effects = fields
            .iter()
            .filter_map(|f| match f {
                Field::Bytes(14, b) => Some(String::from_utf8_lossy(b).into_owned()),
                _ => None,
            })
            .collect();
        Ok(Self {
            meta: decode_list_meta(&fields),
            supports_brightness: field_bool(&fields, 8).unwrap_or(false),
            supports_rgb: field_bool(&fields, 9).unwrap_or(false),
            supports_white_value: field_bool(&fields, 10).unwrap_or(false),
            supports_color_temperature: field_bool(&fields, 11).unwrap_or(false),
            min_mireds: field_f32(&fields, 12).unwrap_or(0.0),
            max_mireds: field_f32(&fields, 13).unwrap_or(0.0),
            effects,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListEntitiesClimateResponse {
    pub meta: EntityListMeta,
    pub supports_two_point_target_temperature: bool,
    pub supports_current_temperature: bool,
    pub supports_current_humidity: bool,
    pub supports_target_humidity: bool,
    pub visual_min_temperature: f32,
    pub visual_max_temperature: f32,
    pub visual_temperature_step: f32,
}

impl ListEntitiesClimateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_list_meta(&mut out, &self.meta);
        put_bool(&mut out, 8, self.supports_two_point_target_temperature);
        put_bool(&mut out, 9, self.supports_current_temperature);
        put_bool(&mut out, 10, self.supports_current_humidity);
        put_bool(&mut out, 11, self.supports_target_humidity);
        put_float(&mut out, 12, self.visual_min_temperature);
        put_float(&mut out, 13, self.visual_max_temperature);
        put_float(&mut out, 14, self.visual_temperature_step);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            meta: decode_list_meta(&fields),
            supports_two_point_target_temperature: field_bool(&fields, 8).unwrap_or(false),
            supports_current_temperature: field_bool(&fields, 9).unwrap_or(false),
            supports_current_humidity: field_bool(&fields, 10).unwrap_or(false),
            supports_target_humidity: field_bool(&fields, 11).unwrap_or(false),
            visual_min_temperature: field_f32(&fields, 12).unwrap_or(7.0),
            visual_max_temperature: field_f32(&fields, 13).unwrap_or(35.0),
            visual_temperature_step: field_f32(&fields, 14).unwrap_or(0.5),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinarySensorStateResponse {
    pub key: u32,
    pub state: bool,
}

impl BinarySensorStateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.key as u64);
        put_bool(&mut out, 2, self.state);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            state: field_bool(&fields, 2).unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorStateResponse {
    pub key: u32,
    pub state: f32,
}

impl SensorStateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.key as u64);
        put_float(&mut out, 2, self.state);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            state: field_f32(&fields, 2).unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwitchStateResponse {
    pub key: u32,
    pub state: bool,
}

impl SwitchStateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.key as u64);
        put_bool(&mut out, 2, self.state);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            state: field_bool(&fields, 2).unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberStateResponse {
    pub key: u32,
    pub state: f32,
}

impl NumberStateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.key as u64);
        put_float(&mut out, 2, self.state);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            state: field_f32(&fields, 2).unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightStateResponse {
    pub key: u32,
    pub state: bool,
    pub brightness: f32,
    pub color_mode: u32,
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub white: f32,
    pub color_temperature: f32,
    pub effect: String,
}

impl LightStateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.key as u64);
        put_bool(&mut out, 2, self.state);
        put_float(&mut out, 3, self.brightness);
        put_varint(&mut out, 4, self.color_mode as u64);
        put_float(&mut out, 5, self.red);
        put_float(&mut out, 6, self.green);
        put_float(&mut out, 7, self.blue);
        put_float(&mut out, 8, self.white);
        put_float(&mut out, 9, self.color_temperature);
        put_string(&mut out, 10, &self.effect);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            state: field_bool(&fields, 2).unwrap_or(false),
            brightness: field_f32(&fields, 3).unwrap_or(0.0),
            color_mode: field_u32(&fields, 4).unwrap_or(0),
            red: field_f32(&fields, 5).unwrap_or(0.0),
            green: field_f32(&fields, 6).unwrap_or(0.0),
            blue: field_f32(&fields, 7).unwrap_or(0.0),
            white: field_f32(&fields, 8).unwrap_or(0.0),
            color_temperature: field_f32(&fields, 9).unwrap_or(0.0),
            effect: field_string(&fields, 10).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateStateResponse {
    pub key: u32,
    pub mode: u32,
    pub current_temperature: f32,
    pub target_temperature: f32,
    pub target_temperature_low: f32,
    pub target_temperature_high: f32,
    pub fan_mode: u32,
    pub swing_mode: u32,
    pub action: u32,
    pub preset: u32,
    pub current_humidity: f32,
    pub target_humidity: f32,
}

impl ClimateStateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.key as u64);
        put_varint(&mut out, 2, self.mode as u64);
        put_float(&mut out, 3, self.current_temperature);
        put_float(&mut out, 4, self.target_temperature);
        put_float(&mut out, 5, self.target_temperature_low);
        put_float(&mut out, 6, self.target_temperature_high);
        put_varint(&mut out, 7, self.fan_mode as u64);
        put_varint(&mut out, 8, self.swing_mode as u64);
        put_varint(&mut out, 9, self.action as u64);
        put_varint(&mut out, 10, self.preset as u64);
        put_float(&mut out, 11, self.current_humidity);
        put_float(&mut out, 12, self.target_humidity);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            mode: field_u32(&fields, 2).unwrap_or(0),
            current_temperature: field_f32(&fields, 3).unwrap_or(0.0),
            target_temperature: field_f32(&fields, 4).unwrap_or(0.0),
            target_temperature_low: field_f32(&fields, 5).unwrap_or(0.0),
            target_temperature_high: field_f32(&fields, 6).unwrap_or(0.0),
            fan_mode: field_u32(&fields, 7).unwrap_or(0),
            swing_mode: field_u32(&fields, 8).unwrap_or(0),
            action: field_u32(&fields, 9).unwrap_or(0),
            preset: field_u32(&fields, 10).unwrap_or(0),
            current_humidity: field_f32(&fields, 11).unwrap_or(0.0),
            target_humidity: field_f32(&fields, 12).unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwitchCommandRequest {
    pub key: u32,
    pub state: bool,
}

impl SwitchCommandRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, 1, self.key as u64);
        put_bool(&mut out, 2, self.state);
        out
    }
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            state: field_bool(&fields, 2).unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberCommandRequest {
    pub key: u32,
    pub state: f32,
}

impl NumberCommandRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            state: field_f32(&fields, 2).unwrap_or(0.0),
        })
    }
}

/// Presence of each optional field is tracked explicitly via `has_*` flags
/// rather than duck-typed attribute probing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightCommandRequest {
    pub key: u32,
    pub has_state: bool,
    pub state: bool,
    pub has_brightness: bool,
    pub brightness: f32,
    pub has_rgb: bool,
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub has_white: bool,
    pub white: f32,
    pub has_color_temperature: bool,
    pub color_temperature: f32,
    pub has_effect: bool,
    pub effect: String,
    pub has_transition_length: bool,
    pub transition_length: u32,
    pub has_flash_length: bool,
    pub flash_length: u32,
}

impl LightCommandRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            has_state: field_bool(&fields, 2).unwrap_or(false),
            state: field_bool(&fields, 3).unwrap_or(false),
            has_brightness: field_bool(&fields, 4).unwrap_or(false),
            brightness: field_f32(&fields, 5).unwrap_or(0.0),
            has_rgb: field_bool(&fields, 6).unwrap_or(false),
            red: field_f32(&fields, 7).unwrap_or(0.0),
            green: field_f32(&fields, 8).unwrap_or(0.0),
            blue: field_f32(&fields, 9).unwrap_or(0.0),
            has_white: field_bool(&fields, 10).unwrap_or(false),
            white: field_f32(&fields, 11).unwrap_or(0.0),
            has_color_temperature: field_bool(&fields, 12).unwrap_or(false),
            color_temperature: field_f32(&fields, 13).unwrap_or(0.0),
            has_effect: field_bool(&fields, 14).unwrap_or(false),
            effect: field_string(&fields, 15).unwrap_or_default(),
            has_transition_length: field_bool(&fields, 16).unwrap_or(false),
            transition_length: field_u32(&fields, 17).unwrap_or(0),
            has_flash_length: field_bool(&fields, 18).unwrap_or(false),
            flash_length: field_u32(&fields, 19).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateCommandRequest {
    pub key: u32,
    pub has_mode: bool,
    pub mode: u32,
    pub has_target_temperature: bool,
    pub target_temperature: f32,
    pub has_target_temperature_low: bool,
    pub target_temperature_low: f32,
    pub has_target_temperature_high: bool,
    pub target_temperature_high: f32,
    pub has_fan_mode: bool,
    pub fan_mode: u32,
    pub has_swing_mode: bool,
    pub swing_mode: u32,
    pub has_preset: bool,
    pub preset: u32,
    pub has_target_humidity: bool,
    pub target_humidity: f32,
}

impl ClimateCommandRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        let fields = parse_fields(payload)?;
        Ok(Self {
            key: field_u32(&fields, 1).unwrap_or(0),
            has_mode: field_bool(&fields, 2).unwrap_or(false),
            mode: field_u32(&fields, 3).unwrap_or(0),
            has_target_temperature: field_bool(&fields, 4).unwrap_or(false),
            target_temperature: field_f32(&fields, 5).unwrap_or(0.0),
            has_target_temperature_low: field_bool(&fields, 6).unwrap_or(false),
            target_temperature_low: field_f32(&fields, 7).unwrap_or(0.0),
            has_target_temperature_high: field_bool(&fields, 8).unwrap_or(false),
            target_temperature_high: field_f32(&fields, 9).unwrap_or(0.0),
            has_fan_mode: field_bool(&fields, 10).unwrap_or(false),
            fan_mode: field_u32(&fields, 11).unwrap_or(0),
            has_swing_mode: field_bool(&fields, 12).unwrap_or(false),
            swing_mode: field_u32(&fields, 13).unwrap_or(0),
            has_preset: field_bool(&fields, 14).unwrap_or(false),
            preset: field_u32(&fields, 15).unwrap_or(0),
            has_target_humidity: field_bool(&fields, 16).unwrap_or(false),
            target_humidity: field_f32(&fields, 17).unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_response_round_trips() {
        let msg = HelloResponse {
            api_version_major: 1,
            api_version_minor: 10,
            server_info: "esphome-sim".into(),
        };
        let decoded = HelloResponse::decode(&msg.encode()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn light_command_request_has_flags_round_trip() {
        let mut out = Vec::new();
        put_varint(&mut out, 1, 3);
        put_bool(&mut out, 2, true);
        put_bool(&mut out, 3, true);
        put_bool(&mut out, 6, true);
        put_float(&mut out, 7, 0.5);
        put_float(&mut out, 8, 0.25);
        put_float(&mut out, 9, 1.0);

        let decoded = LightCommandRequest::decode(&out).unwrap();
        assert_eq!(decoded.key, 3);
        assert!(decoded.has_state);
        assert!(decoded.state);
        assert!(decoded.has_rgb);
        assert_eq!(decoded.red, 0.5);
        assert_eq!(decoded.green, 0.25);
        assert_eq!(decoded.blue, 1.0);
        assert!(!decoded.has_brightness);
    }

    #[test]
    fn unknown_field_is_skipped_not_rejected() {
        let mut out = Vec::new();
        put_varint(&mut out, 1, 7); // key
        put_string(&mut out, 99, "future-field"); // unknown to this registry
        put_bool(&mut out, 2, true); // state
        let decoded = SwitchCommandRequest::decode(&out).unwrap();
        assert_eq!(decoded.key, 7);
        assert!(decoded.state);
    }
}
