//! Input injection and macro expansion collaborators
//!
//! Key and dial listeners translate device events into calls on an
//! [`InputInjector`]. The host application provides the real injector
//! (uinput or similar); [`NoopInput`] only logs.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Linux input event codes used by the dial and media keys.
pub mod codes {
    pub const KEY_MUTE: u16 = 113;
    pub const KEY_VOLUMEDOWN: u16 = 114;
    pub const KEY_VOLUMEUP: u16 = 115;
    pub const KEY_PLAYPAUSE: u16 = 164;
    pub const KEY_NEXTSONG: u16 = 163;
    pub const KEY_PREVIOUSSONG: u16 = 165;
    pub const BTN_LEFT: u16 = 0x110;
    pub const BTN_RIGHT: u16 = 0x111;
    pub const BTN_MIDDLE: u16 = 0x112;
}

/// Whether an injected key is tapped, held down or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Tap,
    Press,
    Release,
}

/// Synthetic input sink.
pub trait InputInjector: Send + Sync {
    /// Media / consumer key (volume, playback)
    fn media(&self, code: u16);
    fn key(&self, code: u16, state: KeyState);
    fn mouse_button(&self, code: u16, state: KeyState);
    fn scroll(&self, up: bool);
    fn zoom(&self, zoom_in: bool);
    fn screen_brightness(&self, up: bool);
    fn text(&self, text: &str);

    fn volume_up(&self) {
        self.media(codes::KEY_VOLUMEUP);
    }

    fn volume_down(&self) {
        self.media(codes::KEY_VOLUMEDOWN);
    }

    fn volume_mute(&self) {
        self.media(codes::KEY_MUTE);
    }
}

/// Injector that drops every event.
#[derive(Debug, Default)]
pub struct NoopInput;

impl InputInjector for NoopInput {
    fn media(&self, code: u16) {
        debug!("input: media {code}");
    }

    fn key(&self, code: u16, state: KeyState) {
        debug!("input: key {code} {state:?}");
    }

    fn mouse_button(&self, code: u16, state: KeyState) {
        debug!("input: mouse {code} {state:?}");
    }

    fn scroll(&self, up: bool) {
        debug!("input: scroll up={up}");
    }

    fn zoom(&self, zoom_in: bool) {
        debug!("input: zoom in={zoom_in}");
    }

    fn screen_brightness(&self, up: bool) {
        debug!("input: screen brightness up={up}");
    }

    fn text(&self, text: &str) {
        debug!("input: text {} chars", text.len());
    }
}

/// One recorded injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Media(u16),
    Key(u16, KeyState),
    Mouse(u16, KeyState),
    Scroll(bool),
    Zoom(bool),
    ScreenBrightness(bool),
    Text(String),
}

/// Injector that records events in order, for dry runs and tests.
#[derive(Debug, Default)]
pub struct RecordingInput {
    events: Mutex<Vec<InputEvent>>,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().clone()
    }

    fn push(&self, e: InputEvent) {
        self.events.lock().push(e);
    }
}

impl InputInjector for RecordingInput {
    fn media(&self, code: u16) {
        self.push(InputEvent::Media(code));
    }

    fn key(&self, code: u16, state: KeyState) {
        self.push(InputEvent::Key(code, state));
    }

    fn mouse_button(&self, code: u16, state: KeyState) {
        self.push(InputEvent::Mouse(code, state));
    }

    fn scroll(&self, up: bool) {
        self.push(InputEvent::Scroll(up));
    }

    fn zoom(&self, zoom_in: bool) {
        self.push(InputEvent::Zoom(zoom_in));
    }

    fn screen_brightness(&self, up: bool) {
        self.push(InputEvent::ScreenBrightness(up));
    }

    fn text(&self, text: &str) {
        self.push(InputEvent::Text(text.to_string()));
    }
}

// ── Macros ───────────────────────────────────────────────────────────

/// A single macro step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MacroStep {
    /// Media key
    Media { code: u16 },
    /// Keyboard key tap
    Key { code: u16 },
    /// Mouse button click
    Mouse { code: u16 },
    /// Typed text
    Text { text: String },
    /// Pause in milliseconds
    Delay { ms: u64 },
}

/// Lookup of macros by id.
pub trait MacroSource: Send + Sync {
    fn steps(&self, id: u32) -> Option<Vec<MacroStep>>;
}

/// In-memory macro table filled by the host application.
#[derive(Default)]
pub struct MacroTable {
    macros: RwLock<HashMap<u32, Vec<MacroStep>>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: u32, steps: Vec<MacroStep>) {
        self.macros.write().insert(id, steps);
    }
}

impl MacroSource for MacroTable {
    fn steps(&self, id: u32) -> Option<Vec<MacroStep>> {
        self.macros.read().get(&id).cloned()
    }
}

/// Replay macro steps through `input`, sleeping on delay steps.
pub fn play_macro(input: &dyn InputInjector, steps: &[MacroStep]) {
    for step in steps {
        match step {
            MacroStep::Media { code } => input.media(*code),
            MacroStep::Key { code } => input.key(*code, KeyState::Tap),
            MacroStep::Mouse { code } => input.mouse_button(*code, KeyState::Tap),
            MacroStep::Text { text } => input.text(text),
            MacroStep::Delay { ms } => std::thread::sleep(Duration::from_millis(*ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_helpers() {
        let rec = RecordingInput::new();
        rec.volume_up();
        rec.volume_mute();
        assert_eq!(
            rec.events(),
            vec![
                InputEvent::Media(codes::KEY_VOLUMEUP),
                InputEvent::Media(codes::KEY_MUTE)
            ]
        );
    }

    #[test]
    fn test_play_macro_in_order() {
        let rec = RecordingInput::new();
        let steps = vec![
            MacroStep::Key { code: 30 },
            MacroStep::Delay { ms: 1 },
            MacroStep::Text { text: "hi".into() },
            MacroStep::Mouse {
                code: codes::BTN_LEFT,
            },
        ];
        play_macro(&rec, &steps);
        assert_eq!(
            rec.events(),
            vec![
                InputEvent::Key(30, KeyState::Tap),
                InputEvent::Text("hi".into()),
                InputEvent::Mouse(codes::BTN_LEFT, KeyState::Tap),
            ]
        );
    }

    #[test]
    fn test_macro_step_json() {
        let step: MacroStep = serde_json::from_str(r#"{"type":"delay","ms":20}"#).unwrap();
        assert_eq!(step, MacroStep::Delay { ms: 20 });
    }

    #[test]
    fn test_macro_table_lookup() {
        let table = MacroTable::new();
        table.insert(3, vec![MacroStep::Key { code: 4 }]);
        assert!(table.steps(3).is_some());
        assert!(table.steps(4).is_none());
    }
}
