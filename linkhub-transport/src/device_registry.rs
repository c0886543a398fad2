//! Device registry - protocol family detection by PID
//!
//! Maps the product ids this runtime knows about onto a [`DeviceFamily`].
//! The family decides framing and driver; per-product details (fan count,
//! LED counts, layouts) live with the drivers.

use crate::types::DeviceFamily;

/// Corsair vendor ID
pub const VENDOR_ID: u16 = 0x1b1c;

/// Commander Pro
pub const PID_COMMANDER_PRO: u16 = 0x0c10;
/// iCUE LINK System Hub
pub const PID_LINK_HUB: u16 = 0x0c3f;
/// LCD interface of iCUE LINK AIOs (3150 decimal)
pub const PID_LINK_LCD: u16 = 0x0c4e;
/// K70 LUX RGB
pub const PID_K70_LUX: u16 = 0x1b33;
/// K70 RGB MK.2
pub const PID_K70_MK2: u16 = 0x1b55;
/// K70 CORE TKL (wired)
pub const PID_K70_CORE_TKL: u16 = 0x2b01;
/// K70 CORE TKL WIRELESS (wired mode)
pub const PID_K70_CORE_TKL_WIRELESS: u16 = 0x2b02;
/// ST100 RGB headset stand
pub const PID_ST100: u16 = 0x0a34;
/// MM700 RGB mousepad
pub const PID_MM700: u16 = 0x1b9b;
/// Slipstream wireless receiver
pub const PID_SLIPSTREAM: u16 = 0x1ba6;
/// K100 AIR WIRELESS, as reported through the receiver
pub const PID_K100_AIR_WIRELESS: u16 = 0x1bab;
/// M75 WIRELESS mouse, as reported through the receiver
pub const PID_M75_WIRELESS: u16 = 0x1bf0;

/// Elite/Platinum AIO product ids
pub const ELITE_PIDS: &[u16] = &[
    0x0c35, // H100i ELITE RGB
    0x0c36, // H115i ELITE RGB
    0x0c37, // H150i ELITE RGB
    0x0c40, // H100i ELITE RGB White
    0x0c41, // H150i ELITE RGB White
];

/// Modern keyboards driven through the write-color endpoint
pub const KEYBOARD_PIDS: &[u16] = &[PID_K70_MK2, PID_K70_CORE_TKL, PID_K70_CORE_TKL_WIRELESS];

/// Zone-addressed accessories
pub const ZONE_PIDS: &[u16] = &[PID_ST100, PID_MM700];

/// Resolve the protocol family of a product id.
pub fn family_for(vid: u16, pid: u16) -> Option<DeviceFamily> {
    if vid != VENDOR_ID {
        return None;
    }
    match pid {
        PID_COMMANDER_PRO => Some(DeviceFamily::CommanderPro),
        PID_LINK_HUB => Some(DeviceFamily::LinkHub),
        PID_LINK_LCD => Some(DeviceFamily::LinkLcd),
        PID_K70_LUX => Some(DeviceFamily::K70Lux),
        PID_SLIPSTREAM => Some(DeviceFamily::Slipstream),
        p if ELITE_PIDS.contains(&p) => Some(DeviceFamily::Elite),
        p if KEYBOARD_PIDS.contains(&p) => Some(DeviceFamily::Keyboard),
        p if ZONE_PIDS.contains(&p) => Some(DeviceFamily::Zone),
        _ => None,
    }
}

/// Check if PID represents a wireless receiver
#[inline]
pub fn is_dongle_pid(pid: u16) -> bool {
    pid == PID_SLIPSTREAM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_families() {
        assert_eq!(
            family_for(VENDOR_ID, PID_COMMANDER_PRO),
            Some(DeviceFamily::CommanderPro)
        );
        assert_eq!(family_for(VENDOR_ID, 0x0c36), Some(DeviceFamily::Elite));
        assert_eq!(family_for(VENDOR_ID, PID_MM700), Some(DeviceFamily::Zone));
        assert_eq!(family_for(VENDOR_ID, PID_LINK_LCD), Some(DeviceFamily::LinkLcd));
    }

    #[test]
    fn test_foreign_vendor_rejected() {
        assert_eq!(family_for(0x3151, PID_COMMANDER_PRO), None);
        assert_eq!(family_for(VENDOR_ID, 0xffff), None);
    }

    #[test]
    fn test_dongle_pid() {
        assert!(is_dongle_pid(PID_SLIPSTREAM));
        assert!(!is_dongle_pid(PID_K70_MK2));
    }
}
