// supervisor.rs — Process lifecycle: listen for triggers until told to stop,
// then tear down in a fixed order.

use std::sync::Arc;
use std::time::Duration;

use crate::gate::ProcessingGate;
use crate::hotkey::{ListenerError, TriggerCallback, TriggerSource};
use crate::settings::Settings;
use crate::shutdown::{ShutdownSignal, ShutdownTrigger};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Could not install the trigger listener: {0}")]
    ListenerSetup(#[source] ListenerError),
    #[error("Trigger listener stopped: {0}")]
    Listener(#[source] ListenerError),
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub trigger_key: String,
    pub suppress_trigger: bool,
    /// Idle loop granularity; bounds how long a shutdown request goes unseen.
    pub idle_tick: Duration,
    /// Pause between raising the flag and unregistering the listener.
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            trigger_key: "Equal".into(),
            suppress_trigger: true,
            idle_tick: Duration::from_millis(500),
            shutdown_grace: Duration::from_millis(100),
        }
    }
}

impl From<&Settings> for SupervisorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            trigger_key: settings.trigger_key.clone(),
            suppress_trigger: settings.suppress_trigger,
            idle_tick: settings.idle_tick(),
            shutdown_grace: settings.shutdown_grace(),
        }
    }
}

/// Owns the trigger listener and drives shutdown.
///
/// The listener is not required to be `Send`, so `run` is meant to be
/// driven with `block_on` on the thread that built it.
pub struct Supervisor {
    config: SupervisorConfig,
    trigger: ShutdownTrigger,
    gate: Arc<ProcessingGate>,
    listener: Box<dyn TriggerSource>,
    registered: bool,
    torn_down: bool,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        trigger: ShutdownTrigger,
        gate: Arc<ProcessingGate>,
        listener: Box<dyn TriggerSource>,
    ) -> Self {
        Self {
            config,
            trigger,
            gate,
            listener,
            registered: false,
            torn_down: false,
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.trigger.signal()
    }

    /// Listen until Ctrl+C, a listener failure or an external `fire`.
    /// Teardown always runs before this returns.
    pub async fn run(&mut self) -> Result<(), SupervisorError> {
        let interrupt = {
            let trigger = self.trigger.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        trigger.fire("interrupt received");
                    }
                    Err(e) => log::warn!("Supervisor: cannot listen for Ctrl+C: {}", e),
                }
            })
        };

        let result = self.listen().await;
        self.shutdown().await;
        interrupt.abort();
        result
    }

    async fn listen(&mut self) -> Result<(), SupervisorError> {
        let gate = Arc::clone(&self.gate);
        let callback: TriggerCallback = Box::new(move || {
            gate.try_start();
        });

        if let Err(e) =
            self.listener
                .register(&self.config.trigger_key, self.config.suppress_trigger, callback)
        {
            log::error!("Supervisor: {}", e);
            log::error!("{}", e.hint());
            return Err(SupervisorError::ListenerSetup(e));
        }
        self.registered = true;
        log::info!(
            "Ready. Press '{}' to analyze the screen, Ctrl+C to quit.",
            self.config.trigger_key
        );

        while !self.trigger.is_set() {
            tokio::time::sleep(self.config.idle_tick).await;
            if let Err(e) = self.listener.check() {
                log::error!("Supervisor: listener health check failed: {}", e);
                self.trigger.fire("listener failure");
                return Err(SupervisorError::Listener(e));
            }
        }
        Ok(())
    }

    /// Raise the flag, free the gate, give in-flight work a moment to notice,
    /// then unregister. Repeated calls only re-raise the (already set) flag.
    pub async fn shutdown(&mut self) {
        self.trigger.fire("shutdown requested");
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if self.gate.admission().force_release() {
            log::warn!("Supervisor: gate was still held at shutdown; released");
        }
        tokio::time::sleep(self.config.shutdown_grace).await;

        if self.registered {
            self.registered = false;
            if let Err(e) = self.listener.unregister_all() {
                log::warn!("Supervisor: {}", e);
            }
        }

        let stats = self.gate.stats();
        log::info!(
            "Supervisor: stopped ({} runs, {} triggers skipped)",
            stats.admitted(),
            stats.dropped()
        );
    }
}
