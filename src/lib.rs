pub mod alerts;
pub mod audio;
pub mod calibration;
pub mod capture;
pub mod geometry;
pub mod hardware;
pub mod phone;
pub mod posture;
pub mod session;
pub mod settings;
pub mod telemetry;
pub mod utils;

use anyhow::{bail, Context, Result};
use std::{path::PathBuf, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use alerts::AlertController;
use audio::{AudioEngineHandle, VoiceConfig};
use calibration::CalibrationStore;
use capture::ReplaySource;
use hardware::HardwareLink;
use phone::{PhoneBackend, PhoneUseClassifier};
use session::{loop_worker::spawn_keyboard_reader, run_frame_loop, SessionOrchestrator};
use settings::Settings;
use telemetry::{AggregatorClient, EventBatcher};

const DEFAULT_SETTINGS_FILE: &str = "settings.json";
/// Stdin reads park a blocking thread that never finishes on its own.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(if settings::debug_requested() {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    log::info!("Posture sentinel starting up...");

    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(err) => {
            log::warn!("Using default settings: {err:#}");
            Settings::default()
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(monitor(settings));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    if let Err(err) = result {
        log::error!("Posture sentinel failed: {err:#}");
        std::process::exit(1);
    }
    log::info!("Posture sentinel stopped");
}

async fn monitor(settings: Settings) -> Result<()> {
    let Some(feed) = settings.landmark_feed.as_deref() else {
        bail!("no landmark_feed configured; point it at a JSON-lines landmark stream");
    };
    let mut source = ReplaySource::open(feed)?
        .with_frame_size(settings.frame_width, settings.frame_height);

    let audio = AudioEngineHandle::new(VoiceConfig {
        api_key: settings.elevenlabs_api_key.clone(),
        voice_id: settings.voice_id.clone(),
        timeout: settings.http_timeout(),
    });

    let calibration = CalibrationStore::open(
        settings.calibration_path.clone(),
        settings.default_thresholds(),
    );
    let phone = PhoneUseClassifier::new(
        PhoneBackend::from_settings(&settings)?,
        settings.phone_check_interval(),
        settings.phone_timeout(),
    );
    let alerts = AlertController::new(Box::new(audio.clone()), settings.alert_cooldown());

    let client = AggregatorClient::new(&settings.backend_url, settings.http_timeout())?;
    let mut batcher = EventBatcher::new(client, settings.device_id.clone()).await;
    batcher.start(settings.flush_interval());

    // Opening the port blocks for the board's reset delay.
    let hardware = tokio::task::spawn_blocking({
        let settings = settings.clone();
        move || HardwareLink::connect(&settings)
    })
    .await
    .context("hardware discovery worker join failed")?;

    let mut orchestrator = SessionOrchestrator::new(
        &settings,
        calibration,
        phone,
        alerts,
        batcher,
        hardware,
        Box::new(audio.clone()),
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let keyboard = spawn_keyboard_reader(tokio::io::stdin(), tx);
    log::info!(
        "Keys: s start/stop, r reset, c calibrate, m mute, +/- volume, p music, n next sound, \
         mode <name>, q quit"
    );

    let frames = run_frame_loop(
        &mut orchestrator,
        &mut source,
        settings.frame_interval(),
        rx,
        CancellationToken::new(),
    )
    .await;
    log::info!("Processed {frames} frames");

    keyboard.abort();
    orchestrator.shutdown().await;
    tokio::task::spawn_blocking(move || audio.shutdown())
        .await
        .context("audio shutdown worker join failed")?;
    Ok(())
}
