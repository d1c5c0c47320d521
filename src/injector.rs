//! Key simulation backends
//!
//! The injection worker is the only caller. Each backend sends a single
//! press or release per call; timing between the two is the worker's job.

use rdev::{simulate, EventType};
use std::process::Command;
use tracing::{debug, info};

use crate::keys::TrackedKey;
use crate::{AutoStopError, Result};

/// Sends synthetic key presses and releases
pub trait KeyInjector: Send + Sync {
    fn press(&self, key: TrackedKey) -> Result<()>;
    fn release(&self, key: TrackedKey) -> Result<()>;
}

/// Injector backed by `rdev::simulate` (XTest on X11, SendInput on Windows)
#[derive(Debug, Default)]
pub struct RdevInjector;

impl RdevInjector {
    pub fn new() -> Self {
        Self
    }

    fn send(&self, event: EventType) -> Result<()> {
        simulate(&event)
            .map_err(|e| AutoStopError::SendEvent(format!("rdev simulate {:?}: {:?}", event, e)))
    }
}

impl KeyInjector for RdevInjector {
    fn press(&self, key: TrackedKey) -> Result<()> {
        debug!("Sending {} press via rdev", key);
        self.send(EventType::KeyPress(key.rdev_key()))
    }

    fn release(&self, key: TrackedKey) -> Result<()> {
        debug!("Sending {} release via rdev", key);
        self.send(EventType::KeyRelease(key.rdev_key()))
    }
}

/// Get the ydotool socket path
fn get_socket_path() -> String {
    // SAFETY: getuid has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    format!("/run/user/{}/.ydotool_socket", uid)
}

/// Linux evdev key code for a movement key
fn key_to_code(key: TrackedKey) -> u32 {
    match key {
        TrackedKey::Forward => 17, // KEY_W
        TrackedKey::Left => 30,    // KEY_A
        TrackedKey::Back => 31,    // KEY_S
        TrackedKey::Right => 32,   // KEY_D
    }
}

/// Injector that sends key events via ydotool
///
/// Works on Wayland by writing to uinput through the ydotoold daemon.
/// Requires the daemon to be running: sudo systemctl enable --now ydotoold
pub struct YdotoolInjector {
    socket_path: String,
}

impl YdotoolInjector {
    /// Create a new YdotoolInjector after checking ydotool is installed
    pub fn new() -> Result<Self> {
        let output = Command::new("which")
            .arg("ydotool")
            .output()
            .map_err(|e| AutoStopError::InputAccess(format!("Failed to check for ydotool: {}", e)))?;

        if !output.status.success() {
            return Err(AutoStopError::InputAccess(
                "ydotool not found. Install it: sudo pacman -S ydotool".to_string(),
            ));
        }

        let socket_path = get_socket_path();
        info!("Using ydotool socket {}", socket_path);
        Ok(Self { socket_path })
    }

    fn send_key(&self, key: TrackedKey, down: bool) -> Result<()> {
        // ydotool key format: keycode:1 for down, keycode:0 for up
        let key_arg = format!("{}:{}", key_to_code(key), u8::from(down));
        let output = Command::new("ydotool")
            .env("YDOTOOL_SOCKET", &self.socket_path)
            .args(["key", &key_arg])
            .output()
            .map_err(|e| AutoStopError::SendEvent(format!("Failed to run ydotool: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutoStopError::SendEvent(format!("ydotool failed: {}", stderr.trim())));
        }
        Ok(())
    }
}

impl KeyInjector for YdotoolInjector {
    fn press(&self, key: TrackedKey) -> Result<()> {
        debug!("Sending {} press via ydotool", key);
        self.send_key(key, true)
    }

    fn release(&self, key: TrackedKey) -> Result<()> {
        debug!("Sending {} release via ydotool", key);
        self.send_key(key, false)
    }
}
