//! Global push-to-talk hotkey using evdev.
//!
//! Monitors all keyboard devices for configurable key combos and sends one
//! event per combo press over a tokio channel.

use crate::config::HotkeyConfig;
use crate::session::AssistantSession;
use evdev::{Device, EventType, InputEventKind, Key};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Resolve a key name like "KEY_LEFTMETA" to an evdev Key code.
fn resolve_key(name: &str) -> Option<Key> {
    match name.parse::<Key>() {
        Ok(key) => Some(key),
        Err(_) => {
            warn!("Unknown key name: {name}");
            None
        }
    }
}

/// Parse configured combos, dropping unknown keys and empty combos.
fn resolve_combos(config: &HotkeyConfig) -> Vec<HashSet<Key>> {
    std::iter::once(&config.combo)
        .chain(config.alt_combos.iter())
        .map(|combo| combo.iter().filter_map(|s| resolve_key(s)).collect::<HashSet<Key>>())
        .filter(|combo| !combo.is_empty())
        .collect()
}

/// Shared state for tracking pressed keys across devices.
struct HotkeyState {
    pressed_keys: HashSet<Key>,
    hotkey_active: bool,
}

impl HotkeyState {
    /// Apply one key event. Returns true on the transition into a combo.
    fn apply(&mut self, combos: &[HashSet<Key>], key: Key, value: i32) -> bool {
        // 0 = release, 1 = press, 2 = repeat
        match value {
            1 => {
                self.pressed_keys.insert(key);
            }
            0 => {
                self.pressed_keys.remove(&key);
            }
            _ => return false,
        }

        let now_active = combos.iter().any(|combo| combo.is_subset(&self.pressed_keys));
        let pressed = now_active && !self.hotkey_active;
        self.hotkey_active = now_active;
        pressed
    }
}

pub struct HotkeyMonitor {
    combos: Vec<HashSet<Key>>,
    state: Arc<Mutex<HotkeyState>>,
    tx: mpsc::Sender<()>,
}

impl HotkeyMonitor {
    pub fn new(config: &HotkeyConfig, tx: mpsc::Sender<()>) -> Self {
        let combos = resolve_combos(config);
        info!("Hotkey combos: {} configured", combos.len());

        Self {
            combos,
            state: Arc::new(Mutex::new(HotkeyState {
                pressed_keys: HashSet::new(),
                hotkey_active: false,
            })),
            tx,
        }
    }

    /// Find all keyboard input devices.
    fn find_keyboards() -> Vec<Device> {
        evdev::enumerate()
            .filter_map(|(_path, device)| {
                let is_keyboard = device
                    .supported_keys()
                    .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_ENTER));
                if is_keyboard {
                    info!("Found keyboard: {}", device.name().unwrap_or("unknown"));
                }
                is_keyboard.then_some(device)
            })
            .collect()
    }

    /// Monitor a single device for key events.
    async fn monitor_device(
        device: Device,
        combos: Vec<HashSet<Key>>,
        state: Arc<Mutex<HotkeyState>>,
        tx: mpsc::Sender<()>,
    ) {
        let name = device.name().unwrap_or("unknown").to_string();
        debug!("Monitoring {name}");

        let mut events = match device.into_event_stream() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Cannot create event stream for {name}: {e}");
                return;
            }
        };

        loop {
            match events.next_event().await {
                Ok(event) => {
                    if event.event_type() != EventType::KEY {
                        continue;
                    }
                    let InputEventKind::Key(key) = event.kind() else {
                        continue;
                    };

                    let pressed = state
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .apply(&combos, key, event.value());
                    if pressed {
                        debug!("Hotkey pressed");
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => {
                    warn!("Device {name} disconnected: {e}");
                    break;
                }
            }
        }
    }

    /// Monitor all keyboards. Runs until every device disconnects.
    pub async fn run(self) {
        if self.combos.is_empty() {
            warn!("No valid hotkey combo configured, hotkey disabled");
            return;
        }

        let keyboards = Self::find_keyboards();
        if keyboards.is_empty() {
            warn!(
                "No keyboards found, hotkey disabled. Make sure you're in the 'input' group: \
                 sudo usermod -aG input $USER"
            );
            return;
        }

        info!("Monitoring {} keyboard(s)", keyboards.len());

        let mut handles = Vec::new();
        for device in keyboards {
            let combos = self.combos.clone();
            let state = Arc::clone(&self.state);
            let tx = self.tx.clone();
            handles.push(tokio::spawn(Self::monitor_device(device, combos, state, tx)));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Toggle `session` on every press until the monitor goes away.
///
/// Each toggle runs on its own task, so a press can stop a start that is
/// still waiting on the microphone.
pub async fn toggle_on_press(mut presses: mpsc::Receiver<()>, session: AssistantSession) {
    while presses.recv().await.is_some() {
        let session = session.clone();
        tokio::spawn(async move {
            if let Err(e) = session.toggle().await {
                warn!("Could not start assistant: {e}");
            }
        });
    }
    warn!("Hotkey monitor stopped");
}
