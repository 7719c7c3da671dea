//! MQTT topic builders and parser for the `$T`-prefixed bridge topic table (§6).
//!
//! ```text
//! $T/availability/<hass_id>
//! $T/status/<hass_id>
//! $T/status/<hass_id>/preset
//! $T/set/<hass_id>
//! $T/set/<hass_id>/brightness
//! $T/set/<hass_id>/color_temp
//! $T/set/<hass_id>/rgb
//! $T/set/<hass_id>/preset
//! homeassistant/<platform>/<hass_id>/config
//! ```

pub fn availability(base: &str, hass_id: &str) -> String {
    format!("{base}/availability/{hass_id}")
}

pub fn status(base: &str, hass_id: &str) -> String {
    format!("{base}/status/{hass_id}")
}

pub fn status_preset(base: &str, hass_id: &str) -> String {
    format!("{base}/status/{hass_id}/preset")
}

pub fn set(base: &str, hass_id: &str) -> String {
    format!("{base}/set/{hass_id}")
}

pub fn set_subtopic(base: &str, hass_id: &str, sub: &str) -> String {
    format!("{base}/set/{hass_id}/{sub}")
}

/// Subscribe to every command topic under the base for all devices.
pub fn set_wildcard(base: &str) -> String {
    format!("{base}/set/#")
}

pub fn discovery_config(platform: &str, hass_id: &str) -> String {
    format!("homeassistant/{platform}/{hass_id}/config")
}

/// The "group-<id>" hass_id convention, distinguishing group entities from
/// per-device ones on the same flat `$T/set/#` / `$T/status/#` namespace.
/// Groups have no stable account prefix of their own in configuration (a
/// group is keyed only by a numeric id), so this controller mints one
/// rather than colliding with a device's `<account_id>-<id>` hass_id (see
/// DESIGN.md).
pub fn group_hass_id(group_id: u16) -> String {
    format!("group-{group_id}")
}

/// Inverse of [`group_hass_id`].
pub fn parse_group_hass_id(hass_id: &str) -> Option<u16> {
    hass_id.strip_prefix("group-")?.parse().ok()
}

/// Home Assistant discovery platforms this bridge registers entities on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Light,
    Switch,
    Fan,
    Plug,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            // Home Assistant MQTT discovery has no dedicated "plug" platform;
            // plugs register as switches with a device_class hint.
            Platform::Light => "light",
            Platform::Switch | Platform::Plug => "switch",
            Platform::Fan => "fan",
        }
    }
}

/// Components of an inbound command topic, parsed for routing in C6/C4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSetTopic {
    pub hass_id: String,
    /// `None` for the bare `$T/set/<hass_id>` power topic.
    pub sub: Option<String>,
}

/// Parse `$T/set/<hass_id>[/<sub>]`. Returns `None` for anything else.
pub fn parse_set_topic(base: &str, topic: &str) -> Option<ParsedSetTopic> {
    let prefix = format!("{base}/set/");
    let rest = topic.strip_prefix(&prefix)?;
    let mut parts = rest.splitn(2, '/');
    let hass_id = parts.next()?.to_string();
    if hass_id.is_empty() {
        return None;
    }
    let sub = parts.next().map(|s| s.to_string());
    Some(ParsedSetTopic { hass_id, sub })
}
