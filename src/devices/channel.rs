//! Live channel state of a hub or cooler

use serde::Serialize;

use crate::metrics::ChannelSample;

/// What a channel is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    Fan,
    Pump,
    Probe,
    Led,
    Aio,
    CpuBlock,
    GpuBlock,
    PumpRes,
    Vrm,
    Keyboard,
    Zone,
    Wireless,
}

impl ChannelKind {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Fan => "Fan",
            Self::Pump => "Pump",
            Self::Probe => "Temperature Probe",
            Self::Led => "LED",
            Self::Aio => "AIO",
            Self::CpuBlock => "CPU Block",
            Self::GpuBlock => "GPU Block",
            Self::PumpRes => "Pump / Reservoir",
            Self::Vrm => "VRM",
            Self::Keyboard => "Keyboard",
            Self::Zone => "Zone",
            Self::Wireless => "Wireless",
        }
    }
}

/// One logical sub-device, rebuilt on every enumeration and merged with
/// the active profile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: i32,
    pub kind: ChannelKind,
    pub device_id: String,
    pub name: String,
    pub description: String,
    pub rpm: i16,
    /// °C
    pub temperature: f64,
    pub led_channels: u8,
    pub contains_pump: bool,
    pub port_id: u8,
    /// Speed profile name
    pub profile: String,
    pub rgb: String,
    pub label: String,
    pub has_speed: bool,
    pub has_temp: bool,
    pub is_aio: bool,
}

impl Channel {
    pub fn new(id: i32, kind: ChannelKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            device_id: String::new(),
            name: name.into(),
            description: kind.description().to_string(),
            rpm: 0,
            temperature: 0.0,
            led_channels: 0,
            contains_pump: matches!(kind, ChannelKind::Pump | ChannelKind::PumpRes),
            port_id: 0,
            profile: String::new(),
            rgb: String::new(),
            label: String::new(),
            has_speed: matches!(kind, ChannelKind::Fan | ChannelKind::Pump),
            has_temp: false,
            is_aio: false,
        }
    }

    pub fn is_pump(&self) -> bool {
        self.contains_pump
    }

    pub fn has_rgb(&self) -> bool {
        self.led_channels > 0
    }

    /// Metrics labels and values of this channel.
    pub fn sample<'a>(&'a self, serial: &'a str) -> ChannelSample<'a> {
        ChannelSample {
            serial,
            channel_id: self.id,
            name: &self.name,
            description: &self.description,
            profile: &self.profile,
            label: &self.label,
            rgb: &self.rgb,
            aio: self.is_aio,
            pump: self.contains_pump,
            probe: self.kind == ChannelKind::Probe,
            led: self.has_rgb(),
            temperature: self.temperature,
            rpm: f64::from(self.rpm),
        }
    }
}
