// hotkey.rs — Global trigger registration.
//
// `TriggerSource` is the seam the supervisor talks to; `GlobalHotkeyTrigger`
// implements it with the `global-hotkey` crate. Callbacks run on whatever
// thread the backend delivers events on and must return quickly.

use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};

/// Invoked once per key press (never on release).
pub type TriggerCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Error type for trigger registration and listening
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Invalid trigger key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("Could not start the hotkey backend: {0}")]
    Backend(String),
    #[error("Could not register '{key}': {reason}")]
    Register { key: String, reason: String },
    #[error("Could not unregister hotkeys: {0}")]
    Unregister(String),
    #[error("Hotkey listener failed: {0}")]
    Runtime(String),
}

impl ListenerError {
    /// One line telling the user what to do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InvalidKey { .. } => {
                "Use a key code such as \"Equal\", \"F8\" or \"shift+KeyQ\" for trigger_key."
            }
            Self::Backend(_) => {
                "On Linux run under an X11 session; global hotkeys usually also need \
                 elevated privileges or accessibility access."
            }
            Self::Register { .. } => {
                "Global hotkeys usually need elevated privileges (or accessibility access); \
                 also check that no other program has grabbed the same key."
            }
            Self::Unregister(_) | Self::Runtime(_) => {
                "Restart the program; the hotkey backend went away."
            }
        }
    }
}

/// Where triggers come from.
pub trait TriggerSource {
    /// Bind `key` to `callback`. `suppress` asks for the key press to be
    /// swallowed instead of reaching the focused application.
    fn register(
        &mut self,
        key: &str,
        suppress: bool,
        callback: TriggerCallback,
    ) -> Result<(), ListenerError>;

    /// Drop every registration. Safe to call when nothing is registered.
    fn unregister_all(&mut self) -> Result<(), ListenerError>;

    /// Polled from the idle loop; an error here ends the supervisor run.
    fn check(&mut self) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// OS-level hotkey via `global-hotkey`.
///
/// The manager is created on first registration, on the thread that calls
/// `register`. Only X11 backends are accepted: they deliver events on their
/// own thread. Windows and macOS deliver them through the registering
/// thread's message loop, which this program never runs, so `register`
/// refuses those platforms instead of binding a key that can never fire.
#[derive(Default)]
pub struct GlobalHotkeyTrigger {
    manager: Option<GlobalHotKeyManager>,
    registered: Vec<HotKey>,
}

impl GlobalHotkeyTrigger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TriggerSource for GlobalHotkeyTrigger {
    fn register(
        &mut self,
        key: &str,
        suppress: bool,
        callback: TriggerCallback,
    ) -> Result<(), ListenerError> {
        let hotkey = key.parse::<HotKey>().map_err(|e| ListenerError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        check_platform(std::env::consts::OS)?;

        if !suppress {
            log::warn!("OS hotkeys always consume '{}'; suppress_trigger=false has no effect", key);
        }

        if self.manager.is_none() {
            let manager =
                GlobalHotKeyManager::new().map_err(|e| ListenerError::Backend(e.to_string()))?;
            self.manager = Some(manager);
        }
        if let Some(manager) = &self.manager {
            manager.register(hotkey).map_err(|e| ListenerError::Register {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        }

        let id = hotkey.id();
        GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
            // Only key-down fires; releases are ignored.
            if event.id == id && event.state == HotKeyState::Pressed {
                callback();
            }
        }));

        self.registered.push(hotkey);
        log::info!("Global hotkey '{}' registered", key);
        Ok(())
    }

    fn unregister_all(&mut self) -> Result<(), ListenerError> {
        if self.registered.is_empty() {
            return Ok(());
        }
        GlobalHotKeyEvent::set_event_handler(None::<fn(GlobalHotKeyEvent)>);
        let hotkeys = std::mem::take(&mut self.registered);
        if let Some(manager) = &self.manager {
            manager
                .unregister_all(&hotkeys)
                .map_err(|e| ListenerError::Unregister(e.to_string()))?;
        }
        log::info!("Global hotkeys unregistered");
        Ok(())
    }
}

/// Platforms where `global-hotkey` runs its own X11 event thread.
const EVENT_THREAD_PLATFORMS: &[&str] = &["linux", "freebsd", "dragonfly", "openbsd", "netbsd"];

fn check_platform(os: &str) -> Result<(), ListenerError> {
    if EVENT_THREAD_PLATFORMS.contains(&os) {
        Ok(())
    } else {
        Err(ListenerError::Backend(format!(
            "global hotkeys need an X11 session; {} delivers hotkey events through a \
             message loop this program does not run",
            os
        )))
    }
}
