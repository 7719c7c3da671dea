//! Home Assistant MQTT discovery payload construction (§4.6).
//!
//! One retained document per device on `homeassistant/<platform>/<hass_id>/config`.
//! A device registers exactly one entity, chosen by its declared role: a
//! switch or plug always wins over light/fan classification (a device is
//! either a dumb on/off relay or a dimmable/color light/fan, never both in
//! this ecosystem — see spec Open Question (c) on bridge-vs-light overlap,
//! which is orthogonal to this choice).

use lb_protocol::device::{Capabilities, Device, FanPreset};
use lb_protocol::topics::{self, Platform};
use serde_json::{json, Value};

/// Build the retained discovery document and the platform it belongs on.
pub fn build(device: &Device, base_topic: &str) -> (Platform, Value) {
    if device.is_switch {
        (Platform::Switch, switch_document(device, base_topic))
    } else if device.is_plug {
        (Platform::Plug, plug_document(device, base_topic))
    } else if device.has(Capabilities::FAN_SPEED) {
        (Platform::Fan, fan_document(device, base_topic))
    } else {
        (Platform::Light, light_document(device, base_topic))
    }
}

pub fn topic_for(device: &Device, base_topic: &str) -> String {
    let (platform, _) = build(device, base_topic);
    topics::discovery_config(platform.as_str(), &device.hass_id)
}

fn device_block(device: &Device) -> Value {
    json!({
        "identifiers": [device.hass_id],
        "name": device.name,
        "manufacturer": device.manufacturer,
        "model": device.model,
    })
}

fn common_fields(device: &Device, base_topic: &str) -> Value {
    json!({
        "name": device.name,
        "unique_id": device.hass_id,
        "availability_topic": topics::availability(base_topic, &device.hass_id),
        "payload_available": "online",
        "payload_not_available": "offline",
        "device": device_block(device),
    })
}

fn switch_document(device: &Device, base_topic: &str) -> Value {
    let mut doc = common_fields(device, base_topic);
    merge(
        &mut doc,
        json!({
            "state_topic": topics::status(base_topic, &device.hass_id),
            "command_topic": topics::set(base_topic, &device.hass_id),
            "payload_on": "ON",
            "payload_off": "OFF",
        }),
    );
    doc
}

fn plug_document(device: &Device, base_topic: &str) -> Value {
    let mut doc = switch_document(device, base_topic);
    merge(&mut doc, json!({ "device_class": "outlet" }));
    doc
}

fn fan_document(device: &Device, base_topic: &str) -> Value {
    let mut doc = common_fields(device, base_topic);
    let presets: Vec<&str> = FanPreset::ORDER.iter().map(|p| p.as_str()).collect();
    merge(
        &mut doc,
        json!({
            "state_topic": topics::status(base_topic, &device.hass_id),
            "command_topic": topics::set(base_topic, &device.hass_id),
            "payload_on": "ON",
            "payload_off": "OFF",
            "preset_mode_state_topic": topics::status_preset(base_topic, &device.hass_id),
            "preset_mode_command_topic": topics::set_subtopic(base_topic, &device.hass_id, "preset"),
            "preset_modes": presets,
        }),
    );
    doc
}

fn light_document(device: &Device, base_topic: &str) -> Value {
    let mut doc = common_fields(device, base_topic);
    let mut supported_color_modes = Vec::new();
    if device.has(Capabilities::RGB) {
        supported_color_modes.push("rgb");
    }
    if device.has(Capabilities::COLOR_TEMP) {
        supported_color_modes.push("color_temp");
    }
    if supported_color_modes.is_empty() && device.has(Capabilities::BRIGHTNESS) {
        supported_color_modes.push("brightness");
    }

    merge(
        &mut doc,
        json!({
            "schema": "json",
            "state_topic": topics::status(base_topic, &device.hass_id),
            "command_topic": topics::set(base_topic, &device.hass_id),
        }),
    );
    if !supported_color_modes.is_empty() {
        merge(&mut doc, json!({ "supported_color_modes": supported_color_modes }));
    }
    if let Some((min_k, max_k)) = device.color_temp_range_k {
        // Home Assistant's light schema expresses color temp range in mireds,
        // the inverse of Kelvin; higher Kelvin means lower mireds.
        merge(
            &mut doc,
            json!({
                "min_mireds": kelvin_to_mired(max_k),
                "max_mireds": kelvin_to_mired(min_k),
            }),
        );
    }
    doc
}

fn kelvin_to_mired(kelvin: u16) -> u32 {
    if kelvin == 0 {
        0
    } else {
        1_000_000 / kelvin as u32
    }
}

fn merge(base: &mut Value, extra: Value) {
    if let (Some(base_obj), Value::Object(extra_obj)) = (base.as_object_mut(), extra) {
        base_obj.extend(extra_obj);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_protocol::device::Device;

    fn bulb() -> Device {
        let mut d = Device::new(4, 123, "Hallway Bulb");
        d.capabilities = Capabilities::ON_OFF | Capabilities::BRIGHTNESS | Capabilities::COLOR_TEMP;
        d.color_temp_range_k = Some((2700, 6500));
        d.model = "Savant-A19".into();
        d
    }

    #[test]
    fn switch_document_has_no_color_fields() {
        let mut d = Device::new(26, 123, "Hallway Switch");
        d.is_switch = true;
        let (platform, doc) = build(&d, "cync");
        assert_eq!(platform, Platform::Switch);
        assert!(doc.get("payload_on").is_some());
        assert!(doc.get("brightness").is_none());
        assert!(doc.get("supported_color_modes").is_none());
    }

    #[test]
    fn plug_document_sets_outlet_device_class() {
        let mut d = Device::new(30, 123, "Lamp Plug");
        d.is_plug = true;
        let (platform, doc) = build(&d, "cync");
        assert_eq!(platform, Platform::Plug);
        assert_eq!(doc["device_class"], "outlet");
    }

    #[test]
    fn fan_document_lists_presets_in_fixed_order() {
        let mut d = Device::new(9, 123, "Bath Fan");
        d.capabilities = Capabilities::FAN_SPEED;
        let (platform, doc) = build(&d, "cync");
        assert_eq!(platform, Platform::Fan);
        assert_eq!(doc["preset_modes"], json!(["off", "low", "medium", "high", "max"]));
    }

    #[test]
    fn light_document_declares_color_temp_range_in_mireds() {
        let d = bulb();
        let (platform, doc) = build(&d, "cync");
        assert_eq!(platform, Platform::Light);
        assert_eq!(doc["min_mireds"], 1_000_000 / 6500);
        assert_eq!(doc["max_mireds"], 1_000_000 / 2700);
    }

    #[test]
    fn on_off_only_light_has_no_color_modes_beyond_brightness() {
        let mut d = Device::new(5, 123, "Closet Light");
        d.capabilities = Capabilities::ON_OFF;
        let (_, doc) = build(&d, "cync");
        assert!(doc.get("supported_color_modes").is_none());
    }
}
