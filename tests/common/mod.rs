//! Mock providers shared by the integration tests. No screen, no network,
//! no keyboard: every collaborator is a hand-written stand-in.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use capsignal_lib::ai::client::ClientOptions;
use capsignal_lib::ai::{
    InferenceClient, InferenceError, InferenceProvider, InferenceRequest, ProviderResponse,
};
use capsignal_lib::capture::{CaptureError, CaptureProvider, CapturedImage};
use capsignal_lib::gate::{AdmissionGate, Pipeline, ProcessingGate};
use capsignal_lib::indicator::{Indicator, IndicatorError};
use capsignal_lib::shutdown::ShutdownSignal;
use capsignal_lib::signal::{SignalEncoder, SignalTable, SignalTiming};
use image::RgbImage;

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

pub enum CaptureBehavior {
    Image,
    Fail,
    /// Block the worker until the test sends on the paired channel.
    WaitForRelease(Mutex<mpsc::Receiver<()>>),
}

pub struct MockCapture {
    behavior: CaptureBehavior,
    pub calls: AtomicUsize,
}

impl MockCapture {
    pub fn image() -> Arc<Self> {
        Arc::new(Self {
            behavior: CaptureBehavior::Image,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            behavior: CaptureBehavior::Fail,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn blocking() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let capture = Arc::new(Self {
            behavior: CaptureBehavior::WaitForRelease(Mutex::new(rx)),
            calls: AtomicUsize::new(0),
        });
        (capture, tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CaptureProvider for MockCapture {
    fn capture_primary_display(&self) -> Result<CapturedImage, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            CaptureBehavior::Image => Ok(test_image()),
            CaptureBehavior::Fail => Err(CaptureError::NoDisplay),
            CaptureBehavior::WaitForRelease(rx) => {
                let rx = rx.lock().unwrap();
                rx.recv_timeout(Duration::from_secs(5))
                    .map_err(|e| CaptureError::Capture(e.to_string()))?;
                Ok(test_image())
            }
        }
    }

    fn name(&self) -> &str {
        "mock capture"
    }
}

pub fn test_image() -> CapturedImage {
    CapturedImage::new(RgbImage::from_pixel(8, 8, image::Rgb([200, 200, 200])))
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

type Reply = Box<dyn Fn() -> Result<ProviderResponse, InferenceError> + Send + Sync>;

pub struct MockProvider {
    reply: Reply,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<InferenceRequest>>,
}

impl MockProvider {
    pub fn new(
        reply: impl Fn() -> Result<ProviderResponse, InferenceError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn text(text: &'static str) -> Arc<Self> {
        Self::new(move || Ok(ProviderResponse::from_text(text)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    async fn generate(&self, request: &InferenceRequest) -> Result<ProviderResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        (self.reply)()
    }

    fn name(&self) -> &str {
        "mock provider"
    }
}

// ---------------------------------------------------------------------------
// Indicator
// ---------------------------------------------------------------------------

/// Counts toggles and tracks whether the "LED" is lit.
#[derive(Default)]
pub struct RecordingIndicator {
    toggles: AtomicUsize,
    /// 1-based toggle number from which every toggle fails.
    fail_from: Option<usize>,
}

impl RecordingIndicator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_from(n: usize) -> Arc<Self> {
        Arc::new(Self {
            toggles: AtomicUsize::new(0),
            fail_from: Some(n),
        })
    }

    /// Successful toggles so far.
    pub fn toggles(&self) -> usize {
        self.toggles.load(Ordering::SeqCst)
    }

    pub fn is_lit(&self) -> bool {
        self.toggles() % 2 == 1
    }
}

impl Indicator for RecordingIndicator {
    fn toggle(&self) -> Result<(), IndicatorError> {
        let attempt = self.toggles() + 1;
        if matches!(self.fail_from, Some(n) if attempt >= n) {
            return Err(IndicatorError::Input("mock key press failed".into()));
        }
        self.toggles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock led"
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn fast_timing() -> SignalTiming {
    SignalTiming {
        on: Duration::from_millis(2),
        off: Duration::from_millis(2),
        pause: Duration::from_millis(5),
    }
}

pub fn encoder(indicator: Arc<RecordingIndicator>, shutdown: ShutdownSignal) -> Arc<SignalEncoder> {
    Arc::new(SignalEncoder::new(
        SignalTable::default(),
        fast_timing(),
        indicator,
        shutdown,
    ))
}

/// A gate over mocks, spawning onto the current runtime.
pub fn gate(
    capture: Arc<MockCapture>,
    provider: Arc<MockProvider>,
    indicator: Arc<RecordingIndicator>,
    shutdown: ShutdownSignal,
) -> Arc<ProcessingGate> {
    let table = SignalTable::default();
    let inference = Arc::new(InferenceClient::new(
        provider,
        table.alphabet(),
        ClientOptions {
            timeout: Duration::from_secs(5),
            ..ClientOptions::default()
        },
    ));
    let pipeline = Pipeline::new(capture, inference, encoder(indicator, shutdown.clone()));
    Arc::new(ProcessingGate::new(
        Arc::new(AdmissionGate::new()),
        pipeline,
        shutdown,
        tokio::runtime::Handle::current(),
    ))
}
