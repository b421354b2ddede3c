// gate.rs — Single-admission processing gate.
//
// A trigger either gets the gate and starts capture → inference → signal on a
// background task, or is dropped on the floor because a run is already in
// flight. Admission is released by the permit's Drop, so every way out of the
// task (normal return, early return, panic) goes through the same path.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::ai::{InferenceClient, InferenceError, InferenceOutcome, NoAnswerReason, Symbol};
use crate::capture::{CaptureError, CaptureProvider};
use crate::shutdown::ShutdownSignal;
use crate::signal::{SignalEncoder, SignalReport};

// ── AdmissionGate ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Idle,
    Running { ticket: u64, since: Instant },
}

/// Concurrency-1 admission control.
///
/// Every admission gets a fresh ticket. A permit only releases the gate if
/// its ticket is still the running one, so a permit outliving a forced
/// release cannot free somebody else's admission.
pub struct AdmissionGate {
    state: Mutex<GateState>,
    next_ticket: AtomicU64,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Idle),
            next_ticket: AtomicU64::new(1),
        }
    }

    // Nothing panics while the lock is held, and a poisoned gate must still
    // be releasable.
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking admission attempt.
    pub fn try_admit(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let mut state = self.lock();
        match *state {
            GateState::Running { .. } => None,
            GateState::Idle => {
                let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
                *state = GateState::Running {
                    ticket,
                    since: Instant::now(),
                };
                Some(AdmissionPermit {
                    gate: Arc::clone(self),
                    ticket,
                })
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(*self.lock(), GateState::Idle)
    }

    /// Release regardless of who holds the gate. Returns whether it was held.
    pub fn force_release(&self) -> bool {
        let mut state = self.lock();
        match *state {
            GateState::Idle => false,
            GateState::Running { ticket, since } => {
                log::warn!(
                    "Gate: forcing release of run #{} (held {}ms)",
                    ticket,
                    since.elapsed().as_millis()
                );
                *state = GateState::Idle;
                true
            }
        }
    }

    fn release(&self, ticket: u64) {
        let mut state = self.lock();
        if let GateState::Running { ticket: current, .. } = *state {
            if current == ticket {
                *state = GateState::Idle;
            }
        }
    }
}

/// Proof of admission. Dropping it releases the gate.
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
    ticket: u64,
}

impl AdmissionPermit {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.release(self.ticket);
    }
}

// ── Task outcome ────────────────────────────────────────────────────────

/// Where a run stopped because shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortPoint {
    BeforeCapture,
    AfterCapture,
    AfterInference,
}

#[derive(Debug)]
pub enum NoSignalReason {
    Capture(CaptureError),
    Inference(InferenceError),
    NoAnswer(NoAnswerReason),
}

/// How one admitted run ended.
#[derive(Debug)]
pub enum TaskOutcome {
    Signalled { symbol: Symbol, report: SignalReport },
    NoSignal(NoSignalReason),
    Aborted(AbortPoint),
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Signalled { symbol, report } if report.interrupted => {
                write!(f, "signal for {} interrupted", symbol)
            }
            TaskOutcome::Signalled { symbol, .. } => write!(f, "signalled {}", symbol),
            TaskOutcome::NoSignal(NoSignalReason::Capture(e)) => write!(f, "no signal: {}", e),
            TaskOutcome::NoSignal(NoSignalReason::Inference(e)) => write!(f, "no signal: {}", e),
            TaskOutcome::NoSignal(NoSignalReason::NoAnswer(NoAnswerReason::Declined)) => {
                write!(f, "no signal: model declined")
            }
            TaskOutcome::NoSignal(NoSignalReason::NoAnswer(NoAnswerReason::Ambiguous { .. })) => {
                write!(f, "no signal: ambiguous reply")
            }
            TaskOutcome::Aborted(point) => write!(f, "aborted {:?}", point),
        }
    }
}

// ── Pipeline ────────────────────────────────────────────────────────────

/// The three collaborators one run goes through.
pub struct Pipeline {
    capture: Arc<dyn CaptureProvider>,
    inference: Arc<InferenceClient>,
    encoder: Arc<SignalEncoder>,
}

impl Pipeline {
    pub fn new(
        capture: Arc<dyn CaptureProvider>,
        inference: Arc<InferenceClient>,
        encoder: Arc<SignalEncoder>,
    ) -> Self {
        Self {
            capture,
            inference,
            encoder,
        }
    }

    /// capture → inference → signal, checking the shutdown flag between
    /// steps. Every failure is logged and turned into a `TaskOutcome`.
    pub async fn run(&self, shutdown: &ShutdownSignal) -> TaskOutcome {
        if shutdown.is_set() {
            return TaskOutcome::Aborted(AbortPoint::BeforeCapture);
        }

        log::info!("Taking screenshot via {}...", self.capture.name());
        let capture = Arc::clone(&self.capture);
        let image = match tokio::task::spawn_blocking(move || capture.capture_primary_display()).await
        {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                log::error!("Capture failed: {}", e);
                return TaskOutcome::NoSignal(NoSignalReason::Capture(e));
            }
            Err(e) => {
                let e = CaptureError::Worker(e.to_string());
                log::error!("Capture failed: {}", e);
                return TaskOutcome::NoSignal(NoSignalReason::Capture(e));
            }
        };

        if shutdown.is_set() {
            log::info!("Interrupted after capture");
            return TaskOutcome::Aborted(AbortPoint::AfterCapture);
        }

        let outcome = self.inference.classify(&image).await;
        drop(image);

        if shutdown.is_set() {
            log::info!("Interrupted after inference");
            return TaskOutcome::Aborted(AbortPoint::AfterInference);
        }

        match outcome {
            InferenceOutcome::Answer(symbol) => {
                let report = self.encoder.signal(symbol).await;
                TaskOutcome::Signalled { symbol, report }
            }
            InferenceOutcome::NoAnswer(reason) => {
                match &reason {
                    NoAnswerReason::Declined => log::warn!("No answer: model declined"),
                    NoAnswerReason::Ambiguous { raw } => {
                        log::warn!("No answer: unusable reply '{}'", raw)
                    }
                }
                TaskOutcome::NoSignal(NoSignalReason::NoAnswer(reason))
            }
            InferenceOutcome::Error(e) => {
                log::error!("Inference failed: {}", e);
                log::error!("  hint: {}", e.hint());
                TaskOutcome::NoSignal(NoSignalReason::Inference(e))
            }
        }
    }
}

// ── ProcessingGate ──────────────────────────────────────────────────────

/// Counters for accepted and dropped triggers.
#[derive(Default)]
pub struct GateStats {
    admitted: AtomicU64,
    dropped: AtomicU64,
}

impl GateStats {
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Entry point for triggers. Cheap and non-blocking: safe to call from a
/// hotkey callback thread.
pub struct ProcessingGate {
    gate: Arc<AdmissionGate>,
    pipeline: Arc<Pipeline>,
    shutdown: ShutdownSignal,
    runtime: Handle,
    stats: GateStats,
}

impl ProcessingGate {
    /// `runtime` is where runs are spawned; triggers may arrive on any thread.
    pub fn new(
        gate: Arc<AdmissionGate>,
        pipeline: Pipeline,
        shutdown: ShutdownSignal,
        runtime: Handle,
    ) -> Self {
        Self {
            gate,
            pipeline: Arc::new(pipeline),
            shutdown,
            runtime,
            stats: GateStats::default(),
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    pub fn stats(&self) -> &GateStats {
        &self.stats
    }

    /// Handle one trigger. Returns whether a run was started.
    pub fn try_start(&self) -> bool {
        self.try_spawn().is_some()
    }

    /// Same as [`try_start`](Self::try_start) but hands back the run's handle.
    pub fn try_spawn(&self) -> Option<JoinHandle<TaskOutcome>> {
        if self.shutdown.is_set() {
            log::debug!("Trigger ignored: shutting down");
            return None;
        }

        let Some(permit) = self.gate.try_admit() else {
            self.stats.dropped.fetch_add(1, Ordering::SeqCst);
            log::info!("Trigger detected, already processing");
            return None;
        };
        self.stats.admitted.fetch_add(1, Ordering::SeqCst);
        log::info!("Trigger detected, starting analysis (run #{})", permit.ticket());

        let pipeline = Arc::clone(&self.pipeline);
        let shutdown = self.shutdown.clone();
        Some(self.runtime.spawn(async move {
            // `permit` lives until the end of this block, or until unwinding.
            let start = Instant::now();
            let outcome = pipeline.run(&shutdown).await;
            log::info!(
                "Processing finished in {:.2} seconds (run #{}: {})",
                start.elapsed().as_secs_f64(),
                permit.ticket(),
                outcome
            );
            outcome
        }))
    }
}
