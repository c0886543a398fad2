//! Static device tables
//!
//! iCUE LINK hubs report every attached device as a `(deviceId, model)`
//! pair; hubs with external LED ports count LEDs by accessory type.

use linkhub_transport::device_registry::{
    PID_K100_AIR_WIRELESS, PID_K70_CORE_TKL, PID_K70_CORE_TKL_WIRELESS, PID_K70_MK2,
    PID_M75_WIRELESS,
};

use super::channel::ChannelKind;
use crate::packer::KeyLayout;

/// Device attachable to an iCUE LINK hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedDevice {
    pub device_id: u8,
    pub model: u8,
    pub name: &'static str,
    pub led_channels: u8,
    pub contains_pump: bool,
    pub is_aio: bool,
    pub kind: ChannelKind,
}

const fn dev(
    device_id: u8,
    model: u8,
    name: &'static str,
    led_channels: u8,
    kind: ChannelKind,
) -> SupportedDevice {
    SupportedDevice {
        device_id,
        model,
        name,
        led_channels,
        contains_pump: matches!(kind, ChannelKind::Aio | ChannelKind::PumpRes),
        is_aio: matches!(kind, ChannelKind::Aio),
        kind,
    }
}

pub const LINK_DEVICES: &[SupportedDevice] = &[
    dev(1, 0, "QX Fan", 34, ChannelKind::Fan),
    dev(2, 0, "LX Fan", 18, ChannelKind::Fan),
    dev(3, 0, "RX RGB Fan", 8, ChannelKind::Fan),
    dev(4, 0, "RX Fan", 0, ChannelKind::Fan),
    dev(7, 0, "H150i", 20, ChannelKind::Aio),
    dev(7, 1, "H115i", 20, ChannelKind::Aio),
    dev(7, 2, "H170i", 20, ChannelKind::Aio),
    dev(7, 3, "H100i", 20, ChannelKind::Aio),
    dev(9, 0, "XC7 ELITE", 24, ChannelKind::CpuBlock),
    dev(10, 0, "XG3 HYBRID", 22, ChannelKind::GpuBlock),
    dev(12, 0, "XD5 ELITE", 22, ChannelKind::PumpRes),
    dev(13, 0, "XG7 RGB", 16, ChannelKind::GpuBlock),
    dev(14, 0, "VRM Cooler", 0, ChannelKind::Vrm),
];

/// Look up an iCUE LINK device by its reported id and model.
pub fn link_device(device_id: u8, model: u8) -> Option<&'static SupportedDevice> {
    LINK_DEVICES
        .iter()
        .find(|d| d.device_id == device_id && d.model == model)
}

/// LED accessory type on an external hub port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalLedDevice {
    pub index: i32,
    pub name: &'static str,
    pub leds: u8,
}

pub const EXTERNAL_LED_DEVICES: &[ExternalLedDevice] = &[
    ExternalLedDevice { index: 0, name: "No Device", leds: 0 },
    ExternalLedDevice { index: 1, name: "RGB LED Strip", leds: 10 },
    ExternalLedDevice { index: 2, name: "HD RGB Fan", leds: 12 },
    ExternalLedDevice { index: 3, name: "LL RGB Fan", leds: 16 },
    ExternalLedDevice { index: 4, name: "ML PRO RGB Fan", leds: 4 },
    ExternalLedDevice { index: 5, name: "QL RGB Fan", leds: 34 },
    ExternalLedDevice { index: 6, name: "8-LED Series Fan", leds: 8 },
    ExternalLedDevice { index: 7, name: "SP RGB Fan", leds: 1 },
];

pub fn external_led_device(index: i32) -> Option<&'static ExternalLedDevice> {
    EXTERNAL_LED_DEVICES.iter().find(|d| d.index == index)
}

/// Elite AIO fan count by product id; the pump is always present.
pub fn elite_fans(pid: u16) -> usize {
    match pid {
        0x0c37 | 0x0c41 => 3,
        _ => 2,
    }
}

/// Wired keyboard descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardModel {
    pub pid: u16,
    pub key: &'static str,
    pub name: &'static str,
    pub leds: usize,
    /// Offset stride between consecutive keys in a linear layout
    pub stride: usize,
    pub layout: KeyLayout,
    pub has_dial: bool,
    pub has_brightness_key: bool,
}

pub const KEYBOARD_MODELS: &[KeyboardModel] = &[
    KeyboardModel {
        pid: PID_K70_MK2,
        key: "k70mk2",
        name: "K70 RGB MK.2",
        leds: 123,
        stride: 1,
        layout: KeyLayout::planar(144),
        has_dial: false,
        has_brightness_key: true,
    },
    KeyboardModel {
        pid: PID_K70_CORE_TKL,
        key: "k70coretkl",
        name: "K70 CORE TKL",
        leds: 88,
        stride: 3,
        layout: KeyLayout::interleaved(88 * 3),
        has_dial: true,
        has_brightness_key: false,
    },
    KeyboardModel {
        pid: PID_K70_CORE_TKL_WIRELESS,
        key: "k70coretklwu",
        name: "K70 CORE TKL WIRELESS",
        leds: 88,
        stride: 3,
        layout: KeyLayout::interleaved(88 * 3),
        has_dial: true,
        has_brightness_key: false,
    },
];

pub fn keyboard_model(pid: u16) -> Option<&'static KeyboardModel> {
    KEYBOARD_MODELS.iter().find(|m| m.pid == pid)
}

/// Kind of device paired to a Slipstream receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairedKind {
    Mouse,
    Keyboard,
}

/// Device that can pair with a Slipstream receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WirelessModel {
    pub pid: u16,
    pub name: &'static str,
    pub kind: PairedKind,
    pub leds: usize,
}

pub const WIRELESS_MODELS: &[WirelessModel] = &[
    WirelessModel {
        pid: PID_M75_WIRELESS,
        name: "M75 WIRELESS",
        kind: PairedKind::Mouse,
        leds: 2,
    },
    WirelessModel {
        pid: PID_K100_AIR_WIRELESS,
        name: "K100 AIR WIRELESS",
        kind: PairedKind::Keyboard,
        leds: 1,
    },
    WirelessModel {
        pid: PID_K70_CORE_TKL_WIRELESS,
        name: "K70 CORE TKL WIRELESS",
        kind: PairedKind::Keyboard,
        leds: 88,
    },
];

pub fn wireless_model(pid: u16) -> Option<&'static WirelessModel> {
    WIRELESS_MODELS.iter().find(|m| m.pid == pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qx_fan_lookup() {
        let d = link_device(1, 0).unwrap();
        assert_eq!(d.name, "QX Fan");
        assert_eq!(d.led_channels, 34);
        assert!(!d.contains_pump);
        assert!(link_device(1, 9).is_none());
    }

    #[test]
    fn test_aio_flags() {
        let d = link_device(7, 0).unwrap();
        assert!(d.is_aio && d.contains_pump);
    }

    #[test]
    fn test_external_table() {
        assert_eq!(external_led_device(5).unwrap().leds, 34);
        assert!(external_led_device(42).is_none());
    }
}
