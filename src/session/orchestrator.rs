use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::{
    alerts::{AlertCondition, AlertController},
    audio::MediaControls,
    calibration::CalibrationStore,
    capture::CapturedFrame,
    hardware::{HardwareCommand, HardwareLink},
    phone::{PhoneUseClassifier, VisionClassifier},
    posture::{analyze_pose, PostureAnalysisResult},
    settings::Settings,
    telemetry::{posture_score, EventBatcher, FlushOutcome, SessionLifecycle, TelemetryClient},
};

use super::state::{notification_for, ControlAction, Session};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "session";

use crate::{log_debug, log_error, log_info, log_warn};

/// What one frame produced.
#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// One result per person with a usable reading, primary person first.
    pub analyses: Vec<PostureAnalysisResult>,
    pub fired: Vec<AlertCondition>,
    pub enqueued: bool,
}

/// Owns every component and the session, and drives them one frame at a time.
///
/// Pose analysis runs on every frame so calibration always has a fresh reading. Phone checks,
/// alerts, telemetry and the displayed score only advance while a session is active. The
/// board gets a status line on every frame either way.
pub struct SessionOrchestrator<C: VisionClassifier, T: TelemetryClient> {
    calibration: CalibrationStore,
    phone: PhoneUseClassifier<C>,
    alerts: AlertController,
    batcher: EventBatcher<T>,
    hardware: HardwareLink,
    media: Box<dyn MediaControls>,
    session: Session,
    mode: String,
    send_interval: Duration,
    last_enqueue: Option<Instant>,
    last_primary: Option<PostureAnalysisResult>,
    last_score: u8,
    notification: &'static str,
    background: JoinSet<()>,
}

impl<C: VisionClassifier, T: TelemetryClient> SessionOrchestrator<C, T> {
    pub fn new(
        settings: &Settings,
        calibration: CalibrationStore,
        phone: PhoneUseClassifier<C>,
        alerts: AlertController,
        batcher: EventBatcher<T>,
        hardware: HardwareLink,
        media: Box<dyn MediaControls>,
    ) -> Self {
        Self {
            calibration,
            phone,
            alerts,
            batcher,
            hardware,
            media,
            session: Session::new(),
            mode: settings.initial_mode.clone(),
            send_interval: settings.event_send_interval(),
            last_enqueue: None,
            last_primary: None,
            last_score: 100,
            notification: "",
            background: JoinSet::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn last_score(&self) -> u8 {
        self.last_score
    }

    pub fn notification(&self) -> &'static str {
        self.notification
    }

    pub fn alerts_muted(&self) -> bool {
        self.alerts.is_muted()
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    pub fn batcher(&self) -> &EventBatcher<T> {
        &self.batcher
    }

    /// Applies whatever command the board sent since the last poll.
    pub fn poll_hardware(&mut self) -> Option<HardwareCommand> {
        let command = self.hardware.get_command()?;
        self.apply(ControlAction::Hardware(command.clone()));
        Some(command)
    }

    pub fn apply(&mut self, action: ControlAction) {
        let now = Utc::now();
        match action {
            ControlAction::Hardware(HardwareCommand::Start) => self.start_session(now),
            ControlAction::Hardware(HardwareCommand::Stop) => self.stop_session(now),
            ControlAction::ToggleRunning if self.session.is_running() => self.stop_session(now),
            ControlAction::ToggleRunning => self.start_session(now),
            ControlAction::Hardware(HardwareCommand::Reset) => self.reset_session(now),
            ControlAction::Hardware(HardwareCommand::VolumeUp) => self.media.volume_up(),
            ControlAction::Hardware(HardwareCommand::VolumeDown) => self.media.volume_down(),
            ControlAction::Hardware(HardwareCommand::MusicPlayPause) => self.media.toggle_music(),
            ControlAction::Hardware(HardwareCommand::MusicSkip) => self.media.skip_track(),
            ControlAction::Hardware(HardwareCommand::ModeChange(mode)) => {
                log_info!("mode {} -> {mode}", self.mode);
                self.mode = mode;
            }
            ControlAction::Calibrate => self.calibrate(),
            ControlAction::ToggleMute => {
                self.alerts.toggle_mute();
            }
            ControlAction::Quit => log_debug!("quit is handled by the frame loop"),
        }
    }

    pub async fn process_frame(&mut self, frame: &CapturedFrame) -> FrameOutcome {
        self.process_frame_at(frame, Instant::now(), Utc::now()).await
    }

    pub async fn process_frame_at(
        &mut self,
        frame: &CapturedFrame,
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> FrameOutcome {
        self.reap_background();

        let thresholds = self.calibration.thresholds();
        let mut analyses: Vec<PostureAnalysisResult> = frame
            .poses
            .iter()
            .enumerate()
            .filter_map(|(index, pose)| match analyze_pose(pose, frame.width, thresholds) {
                Ok(result) => Some(result),
                Err(err) => {
                    log_debug!("no reading for person {index}: {err}");
                    None
                }
            })
            .collect();

        let mut outcome = FrameOutcome::default();

        if self.session.is_running() && !analyses.is_empty() {
            let on_phone = self.phone.classify_at(frame, now).await;
            for analysis in analyses.iter_mut() {
                *analysis = analysis.with_phone(on_phone);
            }

            let primary = analyses[0];
            outcome.fired = self.alerts.check_and_alert_at(&primary, now);
            outcome.enqueued = self.maybe_enqueue(&primary, now, wall_clock);
            self.session.record(primary);
            self.last_score = posture_score(primary.slouching, primary.on_phone, primary.attentive);
            self.notification = notification_for(Some(&primary));
        }

        if let Some(primary) = analyses.first() {
            self.last_primary = Some(*primary);
        }
        outcome.analyses = analyses;

        self.send_status();
        outcome
    }

    pub fn send_status(&self) {
        self.hardware.send_status(
            self.last_score,
            &self.mode,
            self.session.is_running(),
            self.notification,
        );
    }

    /// Stops the hardware reader and the telemetry worker, delivering what is still queued,
    /// and waits for in-flight lifecycle calls.
    pub async fn shutdown(&mut self) -> FlushOutcome {
        self.hardware.stop();
        let flushed = self.batcher.stop().await;
        self.drain_background().await;
        log_info!("session orchestrator stopped ({flushed:?})");
        flushed
    }

    /// Waits for every spawned lifecycle and session-save call.
    pub async fn drain_background(&mut self) {
        while let Some(joined) = self.background.join_next().await {
            if let Err(err) = joined {
                log_error!("background call failed to join: {err}");
            }
        }
    }

    fn maybe_enqueue(
        &mut self,
        primary: &PostureAnalysisResult,
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> bool {
        let due = self
            .last_enqueue
            .map(|last| now.saturating_duration_since(last) >= self.send_interval)
            .unwrap_or(true);
        if due {
            self.batcher.enqueue_at(primary, wall_clock);
            self.last_enqueue = Some(now);
        }
        due
    }

    fn start_session(&mut self, now: DateTime<Utc>) {
        if !self.session.start(now) {
            log_debug!("start ignored, session {} already running", self.session.id);
            return;
        }
        log_info!("session {} started ({})", self.session.id, self.mode);
        self.notify_lifecycle(SessionLifecycle::Toggle);
    }

    fn stop_session(&mut self, now: DateTime<Utc>) {
        let Some(summary) = self.session.stop(now, &self.mode) else {
            log_debug!("stop ignored, no session running");
            return;
        };
        log_info!(
            "session {} stopped after {}s, posture avg {}",
            summary.session_id,
            summary.duration_seconds,
            summary.posture_avg
        );
        self.notify_lifecycle(SessionLifecycle::Toggle);

        let client = self.batcher.client().clone();
        self.background.spawn(async move {
            if let Err(err) = client.save_session(&summary).await {
                log_warn!("failed to save session {}: {err:#}", summary.session_id);
            }
        });
    }

    fn reset_session(&mut self, now: DateTime<Utc>) {
        self.session.reset();
        self.batcher.restart_session(now);
        self.last_enqueue = None;
        self.last_score = 100;
        self.notification = "";
        log_info!("session reset");
        self.notify_lifecycle(SessionLifecycle::Reset);
    }

    fn calibrate(&mut self) {
        let Some(reading) = self.last_primary else {
            log_warn!("calibration skipped: no pose seen yet");
            return;
        };
        match self.calibration.calibrate(&reading) {
            Ok(baseline) => log_info!(
                "calibrated at torso {:.1} deg, head {:.3}",
                baseline.torso_angle,
                baseline.head_forward
            ),
            Err(err) => log_error!("calibration failed: {err:#}"),
        }
    }

    fn notify_lifecycle(&mut self, event: SessionLifecycle) {
        let client = self.batcher.client().clone();
        self.background.spawn(async move {
            if let Err(err) = client.notify_lifecycle(event).await {
                log_warn!("{} failed: {err:#}", event.path());
            }
        });
    }

    fn reap_background(&mut self) {
        while let Some(joined) = self.background.try_join_next() {
            if let Err(err) = joined {
                log_error!("background call failed to join: {err}");
            }
        }
    }
}
