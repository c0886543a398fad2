//! Key action dispatch and brightness stepping

use tracing::{debug, warn};

use super::Key;
use crate::input::{play_macro, InputInjector, KeyState, MacroSource};

/// `actionType` values
pub mod action_type {
    pub const NONE: u8 = 0;
    pub const MEDIA: u8 = 1;
    pub const KEYBOARD: u8 = 2;
    pub const MOUSE: u8 = 3;
    pub const MACRO: u8 = 4;
    pub const SCROLL: u8 = 5;
    pub const ZOOM: u8 = 6;
    pub const SCREEN_BRIGHTNESS: u8 = 7;
    pub const PERFORMANCE_LOCK: u8 = 8;
    pub const BRIGHTNESS: u8 = 11;
}

/// Decoded key action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    PassThrough,
    Media(u16),
    Keyboard(u16),
    Mouse(u16),
    Macro(u32),
    /// `true` scrolls up
    Scroll(bool),
    /// `true` zooms in
    Zoom(bool),
    /// `true` raises the screen brightness
    ScreenBrightness(bool),
    PerformanceLock,
    BrightnessCycle,
}

impl Action {
    pub fn from_key(key: &Key) -> Self {
        let cmd = key.action_command;
        match key.action_type {
            action_type::MEDIA => Action::Media(cmd as u16),
            action_type::KEYBOARD => Action::Keyboard(cmd as u16),
            action_type::MOUSE => Action::Mouse(cmd as u16),
            action_type::MACRO => Action::Macro(cmd),
            action_type::SCROLL => Action::Scroll(cmd == 0),
            action_type::ZOOM => Action::Zoom(cmd == 0),
            action_type::SCREEN_BRIGHTNESS => Action::ScreenBrightness(cmd == 0),
            action_type::PERFORMANCE_LOCK => Action::PerformanceLock,
            action_type::BRIGHTNESS => Action::BrightnessCycle,
            _ => Action::PassThrough,
        }
    }
}

/// Effects the driver must apply itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEffect {
    BrightnessCycle,
    PerformanceLock,
}

/// Next brightness slider value: 0 → 33 → 66 → 99 → 0.
pub fn brightness_step(current: Option<u8>) -> u8 {
    let next = (current.unwrap_or(0) / 33 + 1) * 33;
    if next > 99 {
        0
    } else {
        next
    }
}

/// Dial brightness step of ±200 on a 0-1000 scale, mapped back to 0-100.
pub fn dial_brightness(current: u8, up: bool) -> u8 {
    let scaled = i32::from(current.min(100)) * 10;
    let next = if up { scaled + 200 } else { scaled - 200 };
    (next.clamp(0, 1000) / 10) as u8
}

/// Resolves key hashes into actions, tracking held keys.
#[derive(Debug, Default)]
pub struct KeyDispatcher {
    held: Option<(String, Key)>,
}

impl KeyDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> Option<&Key> {
        self.held.as_ref().map(|(_, k)| k)
    }

    fn release_held(&mut self, input: &dyn InputInjector) {
        if let Some((_, key)) = self.held.take() {
            match Action::from_key(&key) {
                Action::Keyboard(code) => input.key(code, KeyState::Release),
                Action::Mouse(code) => input.mouse_button(code, KeyState::Release),
                _ => {}
            }
        }
    }

    /// Handle a hash reported by the device.
    ///
    /// Injected input is performed directly; driver level effects are
    /// returned.
    pub fn dispatch(
        &mut self,
        hash: &str,
        key: Option<&Key>,
        input: &dyn InputInjector,
        macros: &dyn MacroSource,
    ) -> Option<KeyEffect> {
        if let Some((held_hash, _)) = &self.held {
            if held_hash == hash {
                return None;
            }
            self.release_held(input);
        }

        let key = key?;
        if key.only_color {
            return None;
        }
        let action = Action::from_key(key);
        debug!("key {} → {action:?}", key.key_name);

        let state = if key.action_hold {
            self.held = Some((hash.to_string(), key.clone()));
            KeyState::Press
        } else {
            KeyState::Tap
        };

        match action {
            Action::PassThrough => None,
            Action::Media(code) => {
                input.media(code);
                None
            }
            Action::Keyboard(code) => {
                input.key(code, state);
                None
            }
            Action::Mouse(code) => {
                input.mouse_button(code, state);
                None
            }
            Action::Macro(id) => {
                match macros.steps(id) {
                    Some(steps) => play_macro(input, &steps),
                    None => warn!("macro {id} not found"),
                }
                None
            }
            Action::Scroll(up) => {
                input.scroll(up);
                None
            }
            Action::Zoom(zoom_in) => {
                input.zoom(zoom_in);
                None
            }
            Action::ScreenBrightness(up) => {
                input.screen_brightness(up);
                None
            }
            Action::PerformanceLock => Some(KeyEffect::PerformanceLock),
            Action::BrightnessCycle => Some(KeyEffect::BrightnessCycle),
        }
    }
}
