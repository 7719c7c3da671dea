//! Inbound command-topic classification (§4.6, §6).
//!
//! Parses a raw `(topic, payload)` pair off `$T/set/#` into a typed command,
//! still keyed by `hass_id` — resolving that to an internal device id and
//! acting on it (throttling, bridge dispatch, optimistic publish) is
//! `lb-server`'s C4 layer, not this crate's job; this module only speaks the
//! MQTT-side contract.

use lb_protocol::device::FanPreset;
use lb_protocol::packet::Rgb;
use lb_protocol::topics::{self, ParsedSetTopic};
use serde::Deserialize;

/// A classified inbound command, still addressed by `hass_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCommand {
    pub hass_id: String,
    pub kind: CommandPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    /// Plain-text `ON`/`OFF` on the bare command topic (switch, plug, fan).
    Power(bool),
    /// The Home Assistant JSON light schema's bare command topic: any subset
    /// of state/brightness/color_temp/rgb in one message.
    LightJson(LightCommand),
    /// `$T/set/<id>/brightness`, `0..100` bridge-API scale.
    Brightness(u8),
    /// `$T/set/<id>/color_temp`, device-native Kelvin.
    ColorTemp(u16),
    /// `$T/set/<id>/rgb`, `"r,g,b"` CSV.
    Rgb(Rgb),
    /// `$T/set/<id>/preset`, one of the fixed preset names.
    FanPreset(FanPreset),
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct LightCommand {
    #[serde(default, rename = "state", deserialize_with = "deserialize_state")]
    pub power: Option<bool>,
    #[serde(default)]
    pub brightness: Option<u8>,
    #[serde(default)]
    pub color_temp: Option<u16>,
    #[serde(default)]
    pub color: Option<RgbObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RgbObject {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

fn deserialize_state<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|s| s.eq_ignore_ascii_case("on")))
}

/// Parse one `(topic, payload)` pair. Returns `None` for topics outside the
/// `$T/set/#` namespace, or payloads that don't match the expected shape for
/// their subtopic.
pub fn parse(base_topic: &str, topic: &str, payload: &[u8]) -> Option<IncomingCommand> {
    let ParsedSetTopic { hass_id, sub } = topics::parse_set_topic(base_topic, topic)?;
    let text = std::str::from_utf8(payload).ok();

    let kind = match sub.as_deref() {
        None => bare_topic_payload(payload, text)?,
        Some("brightness") => CommandPayload::Brightness(text?.trim().parse().ok()?),
        Some("color_temp") => CommandPayload::ColorTemp(text?.trim().parse().ok()?),
        Some("rgb") => CommandPayload::Rgb(parse_rgb_csv(text?)?),
        Some("preset") => CommandPayload::FanPreset(parse_preset(text?)?),
        Some(_) => return None,
    };

    Some(IncomingCommand { hass_id, kind })
}

fn bare_topic_payload(payload: &[u8], text: Option<&str>) -> Option<CommandPayload> {
    if let Some(text) = text {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("on") {
            return Some(CommandPayload::Power(true));
        }
        if trimmed.eq_ignore_ascii_case("off") {
            return Some(CommandPayload::Power(false));
        }
    }
    serde_json::from_slice::<LightCommand>(payload)
        .ok()
        .map(CommandPayload::LightJson)
}

fn parse_rgb_csv(text: &str) -> Option<Rgb> {
    let mut parts = text.split(',').map(|p| p.trim().parse::<u8>());
    let r = parts.next()?.ok()?;
    let g = parts.next()?.ok()?;
    let b = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((r, g, b))
}

fn parse_preset(text: &str) -> Option<FanPreset> {
    FanPreset::ORDER
        .into_iter()
        .find(|p| p.as_str().eq_ignore_ascii_case(text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_topic_plain_text_is_power() {
        let cmd = parse("cync", "cync/set/123-26", b"ON").unwrap();
        assert_eq!(cmd.hass_id, "123-26");
        assert_eq!(cmd.kind, CommandPayload::Power(true));
    }

    #[test]
    fn bare_topic_json_is_light_command() {
        let payload = br#"{"state":"ON","brightness":80,"color_temp":3000}"#;
        let cmd = parse("cync", "cync/set/123-4", payload).unwrap();
        assert_eq!(
            cmd.kind,
            CommandPayload::LightJson(LightCommand {
                power: Some(true),
                brightness: Some(80),
                color_temp: Some(3000),
                color: None,
            })
        );
    }

    #[test]
    fn bare_topic_json_with_rgb_color_object() {
        let payload = br#"{"state":"ON","color":{"r":10,"g":20,"b":30}}"#;
        let cmd = parse("cync", "cync/set/123-4", payload).unwrap();
        match cmd.kind {
            CommandPayload::LightJson(light) => {
                assert_eq!(light.color, Some(RgbObject { r: 10, g: 20, b: 30 }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn brightness_subtopic_parses_integer() {
        let cmd = parse("cync", "cync/set/123-4/brightness", b"80").unwrap();
        assert_eq!(cmd.kind, CommandPayload::Brightness(80));
    }

    #[test]
    fn rgb_subtopic_parses_csv() {
        let cmd = parse("cync", "cync/set/123-4/rgb", b"10,20,30").unwrap();
        assert_eq!(cmd.kind, CommandPayload::Rgb((10, 20, 30)));
    }

    #[test]
    fn preset_subtopic_is_case_insensitive() {
        let cmd = parse("cync", "cync/set/123-9/preset", b"Medium").unwrap();
        assert_eq!(cmd.kind, CommandPayload::FanPreset(FanPreset::Medium));
    }

    #[test]
    fn malformed_rgb_csv_is_rejected() {
        assert!(parse("cync", "cync/set/123-4/rgb", b"10,20").is_none());
    }

    #[test]
    fn foreign_base_topic_is_ignored() {
        assert!(parse("cync", "other/set/123-4", b"ON").is_none());
    }
}
