//! Per-entity state payload construction (§4.6, §9).
//!
//! Home Assistant's MQTT integrations are picky about exact payload shape
//! per platform; getting this wrong silently breaks the entity rather than
//! erroring. The rules this module enforces:
//!
//! - Switch: plain text `ON`/`OFF`, never JSON, never a brightness/color field.
//! - Plug: identical wire shape to switch (HA has no distinct plug platform).
//! - Light: JSON `{state, brightness?, color_mode?, color_temp?, rgb?}`; an
//!   on/off-only light publishes `{"state": "ON"}` with nothing else, since
//!   declaring fields the discovery document didn't advertise confuses the
//!   frontend's color picker.
//! - Fan: state is `ON`/`OFF` like a switch, plus a *separate*, *retained*
//!   preset-mode message so a restarted Home Assistant immediately shows the
//!   last known speed instead of "unknown" until the next status broadcast.
//!
//! None of this publishes anything by itself — callers push the returned
//! messages through a `Channel`.

use lb_protocol::device::{Capabilities, Device, FanPreset};
use lb_protocol::packet::{PowerState, Rgb};
use lb_protocol::topics;
use serde::Serialize;

/// One MQTT publish this module has decided should happen, left to the
/// caller to actually push through a `Channel`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatePublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum ColorMode {
    Brightness,
    ColorTemp,
    Rgb,
}

#[derive(Debug, Serialize)]
struct LightStatePayload {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    brightness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_mode: Option<ColorMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_temp: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rgb: Option<Rgb>,
}

fn power_str(power: PowerState) -> &'static str {
    match power {
        PowerState::On => "ON",
        PowerState::Off | PowerState::Unknown => "OFF",
    }
}

/// Build the state message(s) for a device's current `DeviceState`.
/// Availability is not included here — see [`availability_message`].
pub fn state_messages(device: &Device, base_topic: &str) -> Vec<StatePublish> {
    if device.is_switch || device.is_plug {
        return vec![switch_like_message(device, base_topic)];
    }
    if device.has(Capabilities::FAN_SPEED) {
        return fan_messages(device, base_topic);
    }
    vec![light_message(device, base_topic)]
}

fn switch_like_message(device: &Device, base_topic: &str) -> StatePublish {
    StatePublish {
        topic: topics::status(base_topic, &device.hass_id),
        payload: power_str(device.state.power).as_bytes().to_vec(),
        retain: false,
    }
}

fn fan_messages(device: &Device, base_topic: &str) -> Vec<StatePublish> {
    let preset = device
        .state
        .brightness
        .map(FanPreset::from_brightness_pct)
        .unwrap_or(FanPreset::Off);
    vec![
        StatePublish {
            topic: topics::status(base_topic, &device.hass_id),
            payload: power_str(device.state.power).as_bytes().to_vec(),
            retain: false,
        },
        StatePublish {
            topic: topics::status_preset(base_topic, &device.hass_id),
            payload: preset.as_str().as_bytes().to_vec(),
            retain: true,
        },
    ]
}

fn light_message(device: &Device, base_topic: &str) -> StatePublish {
    let on_off_only = !device.has(Capabilities::BRIGHTNESS)
        && !device.has(Capabilities::COLOR_TEMP)
        && !device.has(Capabilities::RGB);

    let payload = if on_off_only {
        LightStatePayload {
            state: power_str(device.state.power),
            brightness: None,
            color_mode: None,
            color_temp: None,
            rgb: None,
        }
    } else if let Some(rgb) = device.state.rgb.filter(|_| device.has(Capabilities::RGB)) {
        LightStatePayload {
            state: power_str(device.state.power),
            brightness: device.state.brightness,
            color_mode: Some(ColorMode::Rgb),
            color_temp: None,
            rgb: Some(rgb),
        }
    } else if let Some(ct) = device
        .state
        .color_temp
        .filter(|_| device.has(Capabilities::COLOR_TEMP))
    {
        LightStatePayload {
            state: power_str(device.state.power),
            brightness: device.state.brightness,
            color_mode: Some(ColorMode::ColorTemp),
            color_temp: Some(ct),
            rgb: None,
        }
    } else {
        LightStatePayload {
            state: power_str(device.state.power),
            brightness: device.state.brightness,
            color_mode: device
                .has(Capabilities::BRIGHTNESS)
                .then_some(ColorMode::Brightness),
            color_temp: None,
            rgb: None,
        }
    };

    StatePublish {
        topic: topics::status(base_topic, &device.hass_id),
        payload: serde_json::to_vec(&payload).expect("LightStatePayload always serializes"),
        retain: false,
    }
}

/// Availability is driven solely by `lb-mesh`'s I2/I3 bookkeeping, never by
/// anything in this crate; callers pass the already-decided online/offline.
pub fn availability_message(device: &Device, base_topic: &str, online: bool) -> StatePublish {
    StatePublish {
        topic: topics::availability(base_topic, &device.hass_id),
        payload: if online { b"online".to_vec() } else { b"offline".to_vec() },
        retain: true,
    }
}
