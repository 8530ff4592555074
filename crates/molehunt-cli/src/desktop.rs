//! Screen capture and input on the real desktop.

use std::sync::{Mutex, MutexGuard};

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use image::RgbaImage;
use molehunt_core::backend::{InputActuator, ScreenCapture};
use molehunt_core::error::BackendError;
use molehunt_core::keys::{Key as ChordKey, KeyChord, NamedKey};
use molehunt_core::model::Point;
use xcap::Monitor;

/// Captures the primary monitor.
pub struct XcapScreen;

impl XcapScreen {
    fn primary() -> Result<Monitor, BackendError> {
        let monitors = Monitor::all().map_err(|e| BackendError::Capture(e.to_string()))?;
        let mut fallback = None;
        for monitor in monitors {
            if monitor.is_primary().unwrap_or(false) {
                return Ok(monitor);
            }
            fallback.get_or_insert(monitor);
        }
        fallback.ok_or_else(|| BackendError::Capture("no monitor found".into()))
    }
}

impl ScreenCapture for XcapScreen {
    fn capture(&self) -> Result<RgbaImage, BackendError> {
        // Monitors come and go, so look the primary up on every capture
        Self::primary()?
            .capture_image()
            .map_err(|e| BackendError::Capture(e.to_string()))
    }
}

/// Mouse and keyboard through one shared enigo connection.
///
/// The connection is opened on first use. A failed action drops it so the
/// next action reconnects.
#[derive(Default)]
pub struct EnigoActuator {
    enigo: Mutex<Option<Enigo>>,
}

impl EnigoActuator {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> MutexGuard<'_, Option<Enigo>> {
        self.enigo.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn is_connected(&self) -> bool {
        self.session().is_some()
    }

    fn with_enigo<T>(
        &self,
        f: impl FnOnce(&mut Enigo) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut session = self.session();
        if session.is_none() {
            let enigo = Enigo::new(&Settings::default()).map_err(input_err)?;
            tracing::debug!("Opened input connection");
            *session = Some(enigo);
        }
        let result = match session.as_mut() {
            Some(enigo) => f(enigo),
            None => Err(BackendError::Input("input connection unavailable".into())),
        };
        if result.is_err() {
            *session = None;
        }
        result
    }
}

fn input_err(e: impl std::fmt::Display) -> BackendError {
    BackendError::Input(e.to_string())
}

fn enigo_key(key: ChordKey) -> Result<Key, BackendError> {
    let key = match key {
        ChordKey::Char(c) => Key::Unicode(c),
        ChordKey::Named(named) => match named {
            NamedKey::Enter => Key::Return,
            NamedKey::Tab => Key::Tab,
            NamedKey::Escape => Key::Escape,
            NamedKey::Backspace => Key::Backspace,
            NamedKey::Delete => Key::Delete,
            NamedKey::Space => Key::Space,
            NamedKey::Home => Key::Home,
            NamedKey::End => Key::End,
            NamedKey::PageUp => Key::PageUp,
            NamedKey::PageDown => Key::PageDown,
            #[cfg(not(target_os = "macos"))]
            NamedKey::Insert => Key::Insert,
            #[cfg(target_os = "macos")]
            NamedKey::Insert => return Err(BackendError::UnknownKey("insert".into())),
            NamedKey::Up => Key::UpArrow,
            NamedKey::Down => Key::DownArrow,
            NamedKey::Left => Key::LeftArrow,
            NamedKey::Right => Key::RightArrow,
            NamedKey::F(n) => match n {
                1 => Key::F1,
                2 => Key::F2,
                3 => Key::F3,
                4 => Key::F4,
                5 => Key::F5,
                6 => Key::F6,
                7 => Key::F7,
                8 => Key::F8,
                9 => Key::F9,
                10 => Key::F10,
                11 => Key::F11,
                12 => Key::F12,
                other => return Err(BackendError::UnknownKey(format!("F{}", other))),
            },
        },
    };
    Ok(key)
}

fn press_chord(enigo: &mut Enigo, chord: &KeyChord) -> Result<(), BackendError> {
    let key = enigo_key(chord.key)?;
    let mods = chord.modifiers;
    let held: Vec<Key> = [
        (mods.ctrl, Key::Control),
        (mods.alt, Key::Alt),
        (mods.shift, Key::Shift),
        (mods.meta, Key::Meta),
    ]
    .into_iter()
    .filter_map(|(on, key)| on.then_some(key))
    .collect();

    for m in &held {
        enigo.key(*m, Direction::Press).map_err(input_err)?;
    }
    let clicked = enigo.key(key, Direction::Click).map_err(input_err);
    // Release modifiers even when the key itself failed
    for m in held.iter().rev() {
        enigo.key(*m, Direction::Release).map_err(input_err)?;
    }
    clicked
}

impl InputActuator for EnigoActuator {
    fn click(&self, point: Point) -> Result<(), BackendError> {
        self.with_enigo(|enigo| {
            enigo
                .move_mouse(point.x, point.y, Coordinate::Abs)
                .map_err(input_err)?;
            enigo
                .button(Button::Left, Direction::Click)
                .map_err(input_err)
        })
    }

    fn send_keys(&self, chords: &[KeyChord]) -> Result<(), BackendError> {
        self.with_enigo(|enigo| {
            for chord in chords {
                press_chord(enigo, chord)?;
            }
            Ok(())
        })
    }

    fn scroll(&self, up: bool, ticks: u32) -> Result<(), BackendError> {
        let ticks = i32::try_from(ticks).unwrap_or(i32::MAX);
        // Positive lengths scroll down
        let length = if up { -ticks } else { ticks };
        self.with_enigo(|enigo| enigo.scroll(length, Axis::Vertical).map_err(input_err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_keys_map_to_enigo() {
        assert_eq!(
            enigo_key(ChordKey::Named(NamedKey::Enter)).unwrap(),
            Key::Return
        );
        assert_eq!(enigo_key(ChordKey::Named(NamedKey::F(5))).unwrap(), Key::F5);
        assert_eq!(enigo_key(ChordKey::Char('q')).unwrap(), Key::Unicode('q'));
        assert!(enigo_key(ChordKey::Named(NamedKey::F(13))).is_err());
    }

    #[test]
    fn test_actuator_connects_lazily() {
        // Creating the actuator must not need a display
        let actuator = EnigoActuator::new();
        assert!(!actuator.is_connected());
    }
}
