pub mod ai;
pub mod capture;
pub mod gate;
pub mod hotkey;
pub mod indicator;
pub mod settings;
pub mod shutdown;
pub mod signal;
pub mod supervisor;

use std::process::ExitCode;
use std::sync::Arc;

use ai::gemini::GeminiVisionClient;
use ai::{InferenceClient, InferenceProvider};
use capture::XcapCapture;
use gate::{AdmissionGate, Pipeline, ProcessingGate};
use hotkey::GlobalHotkeyTrigger;
use indicator::KeyboardIndicator;
use settings::Settings;
use signal::SignalEncoder;
use supervisor::{Supervisor, SupervisorConfig};

/// Entry point for the binary.
pub fn run() -> ExitCode {
    // .env.local wins over .env; only the first one found is read.
    for env_file in [".env.local", ".env"] {
        let path = std::path::Path::new(env_file);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
            }
            break;
        }
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match Settings::load().and_then(|s| s.validate().map(|_| s)) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    log::debug!("{:?}", settings);

    let api_key = match settings.api_key() {
        Ok(key) => key,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Could not start the async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut supervisor = match build_supervisor(&settings, api_key, runtime.handle().clone()) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(supervisor.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_supervisor(
    settings: &Settings,
    api_key: String,
    runtime: tokio::runtime::Handle,
) -> Result<Supervisor, settings::ConfigError> {
    let table = settings.signal_table()?;
    let (trigger, signal) = shutdown::channel();

    let provider = Arc::new(GeminiVisionClient::new(
        &settings.endpoint,
        &api_key,
        &settings.model,
    ));
    log::info!("Using {} model {}", provider.name(), settings.model);

    let inference = Arc::new(InferenceClient::new(
        provider,
        table.alphabet(),
        settings.client_options(),
    ));
    let encoder = Arc::new(SignalEncoder::new(
        table,
        settings.signal_timing(),
        Arc::new(KeyboardIndicator::new(settings.indicator)),
        signal.clone(),
    ));
    let pipeline = Pipeline::new(Arc::new(XcapCapture::new()), inference, encoder);
    let gate = Arc::new(ProcessingGate::new(
        Arc::new(AdmissionGate::new()),
        pipeline,
        signal,
        runtime,
    ));

    Ok(Supervisor::new(
        SupervisorConfig::from(settings),
        trigger,
        gate,
        Box::new(GlobalHotkeyTrigger::new()),
    ))
}
