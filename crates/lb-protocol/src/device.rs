use serde::{Deserialize, Serialize};

use crate::config::{CapabilityName, DeviceConfig};
use crate::packet::{PowerState, Rgb};

/// Offline threshold from spec invariant I2: three consecutive
/// `connected_to_mesh = 0` reports before a device is marked offline.
pub const OFFLINE_THRESHOLD: u32 = 3;

/// Default bridge pool capacity (I6).
pub const DEFAULT_BRIDGE_POOL_CAP: usize = 8;

bitflags::bitflags! {
    /// Capability bitset for a device, as declared in configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u16 {
        const ON_OFF      = 0b0000_0001;
        const BRIGHTNESS  = 0b0000_0010;
        const COLOR_TEMP  = 0b0000_0100;
        const RGB         = 0b0000_1000;
        const FAN_SPEED   = 0b0001_0000;
        const PLUG        = 0b0010_0000;
        const SWITCH      = 0b0100_0000;
        const BRIDGE      = 0b1000_0000;
    }
}

/// Fan preset in the fixed vendor order `[off, low, medium, high, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanPreset {
    Off,
    Low,
    Medium,
    High,
    Max,
}

impl FanPreset {
    pub const ORDER: [FanPreset; 5] = [
        FanPreset::Off,
        FanPreset::Low,
        FanPreset::Medium,
        FanPreset::High,
        FanPreset::Max,
    ];

    /// Map a wire-scale brightness bucket to the closest preset.
    /// Exact buckets are `{0,25,50,75,100}`; intermediate values round
    /// to the nearest one.
    pub fn from_brightness_pct(pct: u8) -> Self {
        const BUCKETS: [(u8, FanPreset); 5] = [
            (0, FanPreset::Off),
            (25, FanPreset::Low),
            (50, FanPreset::Medium),
            (75, FanPreset::High),
            (100, FanPreset::Max),
        ];
        BUCKETS
            .iter()
            .min_by_key(|(bucket, _)| (*bucket as i16 - pct as i16).abs())
            .map(|(_, preset)| *preset)
            .unwrap_or(FanPreset::Off)
    }

    /// The brightness-wire-scale percentage this preset commands.
    pub fn to_brightness_pct(self) -> u8 {
        match self {
            FanPreset::Off => 0,
            FanPreset::Low => 25,
            FanPreset::Medium => 50,
            FanPreset::High => 75,
            FanPreset::Max => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FanPreset::Off => "off",
            FanPreset::Low => "low",
            FanPreset::Medium => "medium",
            FanPreset::High => "high",
            FanPreset::Max => "max",
        }
    }
}

/// Live, mutable device state (§3). Owned exclusively by `lb-mesh::DeviceStore`;
/// every other component reads a snapshot, never this struct directly.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub power: PowerState,
    /// 0..100, bridge-API scale.
    pub brightness: Option<u8>,
    /// Device's native Kelvin encoding, already range-clamped.
    pub color_temp: Option<u16>,
    pub rgb: Option<Rgb>,
    pub connected_to_mesh: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: PowerState::Unknown,
            brightness: None,
            color_temp: None,
            rgb: None,
            connected_to_mesh: false,
        }
    }
}

/// Availability bookkeeping driven solely by the status-parse path (I2/I3).
#[derive(Debug, Clone, Default)]
pub struct Availability {
    pub online: bool,
    pub offline_count: u32,
}

/// A logical device declared in configuration (§3).
#[derive(Debug, Clone)]
pub struct Device {
    pub id: u8,
    pub hass_id: String,
    pub name: String,
    pub room: Option<String>,
    pub manufacturer: &'static str,
    pub model: String,
    pub model_number: String,
    pub capabilities: Capabilities,
    pub color_temp_range_k: Option<(u16, u16)>,
    pub is_bridge: bool,
    pub is_switch: bool,
    pub is_plug: bool,
    pub state: DeviceState,
    pub availability: Availability,
    /// I1 throttle latch. `None` when idle; `Some(kind)` while a command of
    /// that semantic kind is in flight.
    pub pending_command: Option<CommandKind>,
}

impl Device {
    pub fn new(id: u8, account_id: u64, name: impl Into<String>) -> Self {
        let name = name.into();
        let room = name.split_whitespace().next().map(|s| s.to_string());
        Self {
            id,
            hass_id: format!("{account_id}-{id}"),
            name,
            room,
            manufacturer: "Savant",
            model: String::new(),
            model_number: String::new(),
            capabilities: Capabilities::empty(),
            color_temp_range_k: None,
            is_bridge: false,
            is_switch: false,
            is_plug: false,
            state: DeviceState::default(),
            availability: Availability::default(),
            pending_command: None,
        }
    }

    pub fn has(&self, cap: Capabilities) -> bool {
        self.capabilities.contains(cap)
    }

    /// Build the live, zero-state `Device` a config entry declares at load
    /// time. Every device is seeded `PowerState::Unknown`/offline until its
    /// first status report arrives (§3 "Lifecycles").
    pub fn from_config(cfg: &DeviceConfig, account_id: u64) -> Self {
        let mut device = Self::new(cfg.id, account_id, cfg.name.clone());
        device.model = cfg.model.clone();
        device.model_number = cfg.model_number.clone();
        device.is_bridge = cfg.is_bridge;
        device.is_switch = cfg.is_switch;
        device.is_plug = cfg.is_plug;
        device.color_temp_range_k = cfg.color_temp_range_k;
        device.capabilities = cfg
            .capabilities
            .iter()
            .fold(Capabilities::empty(), |caps, name| caps | capability_bit(*name));
        device
    }
}

fn capability_bit(name: CapabilityName) -> Capabilities {
    match name {
        CapabilityName::OnOff => Capabilities::ON_OFF,
        CapabilityName::Brightness => Capabilities::BRIGHTNESS,
        CapabilityName::ColorTemp => Capabilities::COLOR_TEMP,
        CapabilityName::Rgb => Capabilities::RGB,
        CapabilityName::FanSpeed => Capabilities::FAN_SPEED,
        CapabilityName::Plug => Capabilities::PLUG,
        CapabilityName::Switch => Capabilities::SWITCH,
        CapabilityName::Bridge => Capabilities::BRIDGE,
    }
}

/// Semantic command kinds, used as the throttle key for I1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Power,
    Brightness,
    ColorTemp,
    Rgb,
    FanSpeed,
}
