use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    hardware::HardwareCommand,
    posture::PostureAnalysisResult,
    telemetry::{posture_score, SessionSummary},
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Active,
}

/// Anything that can change session, mode or audio state, whether it came from the board
/// or the keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    Hardware(HardwareCommand),
    /// START when idle, STOP when active.
    ToggleRunning,
    Calibrate,
    ToggleMute,
    Quit,
}

impl From<HardwareCommand> for ControlAction {
    fn from(command: HardwareCommand) -> Self {
        ControlAction::Hardware(command)
    }
}

/// One focus session. Analyses are only collected while active.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    analyses: Vec<PostureAnalysisResult>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: SessionStatus::Idle,
            started_at: Utc::now(),
            analyses: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn analysis_count(&self) -> usize {
        self.analyses.len()
    }

    /// Begins a fresh session. Returns false when one is already running.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_running() {
            return false;
        }
        self.id = Uuid::new_v4().to_string();
        self.status = SessionStatus::Active;
        self.started_at = now;
        self.analyses.clear();
        true
    }

    pub fn record(&mut self, analysis: PostureAnalysisResult) {
        if self.is_running() {
            self.analyses.push(analysis);
        }
    }

    /// Ends the running session and summarises it, or returns `None` when idle.
    pub fn stop(&mut self, now: DateTime<Utc>, task_type: &str) -> Option<SessionSummary> {
        if !self.is_running() {
            return None;
        }
        self.status = SessionStatus::Idle;
        let analyses = std::mem::take(&mut self.analyses);

        Some(SessionSummary {
            session_id: self.id.clone(),
            duration_seconds: (now - self.started_at).num_seconds().max(0) as u64,
            task_type: task_type.to_string(),
            posture_avg: mean_score(&analyses),
            timestamp: now.to_rfc3339(),
        })
    }

    /// Drops the in-progress analyses and goes idle without producing a summary.
    pub fn reset(&mut self) {
        self.status = SessionStatus::Idle;
        self.analyses.clear();
    }
}

/// Mean posture score, 0 for an empty session.
fn mean_score(analyses: &[PostureAnalysisResult]) -> u8 {
    if analyses.is_empty() {
        return 0;
    }
    let total: u32 = analyses
        .iter()
        .map(|a| u32::from(posture_score(a.slouching, a.on_phone, a.attentive)))
        .sum();
    (f64::from(total) / analyses.len() as f64).round() as u8
}

/// Text shown on the board for the most urgent problem in `analysis`.
pub fn notification_for(analysis: Option<&PostureAnalysisResult>) -> &'static str {
    analysis
        .and_then(crate::alerts::AlertCondition::most_urgent)
        .map(|condition| condition.notification())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2;
    use chrono::Duration;

    fn analysis(slouching: bool, attentive: bool, on_phone: bool) -> PostureAnalysisResult {
        PostureAnalysisResult {
            torso_angle: if slouching { 25.0 } else { 3.0 },
            head_forward: if attentive { 0.02 } else { 0.2 },
            slouching,
            attentive,
            on_phone,
            shoulder_avg: Point2::default(),
            hip_avg: Point2::default(),
            nose: Point2::default(),
        }
    }

    #[test]
    fn stop_summarises_mean_score() {
        let t0 = Utc::now();
        let mut session = Session::new();
        assert!(session.start(t0));
        assert!(!session.start(t0));

        session.record(analysis(false, true, false));
        session.record(analysis(true, true, false));
        let summary = session.stop(t0 + Duration::seconds(90), "FOCUS").unwrap();

        assert_eq!(summary.session_id, session.id);
        assert_eq!(summary.duration_seconds, 90);
        assert_eq!(summary.task_type, "FOCUS");
        assert_eq!(summary.posture_avg, 80);
        assert_eq!(session.status, SessionStatus::Idle);
        assert_eq!(session.analysis_count(), 0);
        assert!(session.stop(t0, "FOCUS").is_none());
    }

    #[test]
    fn idle_session_ignores_analyses() {
        let mut session = Session::new();
        session.record(analysis(false, true, false));
        assert_eq!(session.analysis_count(), 0);
    }

    #[test]
    fn reset_discards_without_summary() {
        let mut session = Session::new();
        session.start(Utc::now());
        session.record(analysis(true, false, true));
        session.reset();

        assert!(!session.is_running());
        assert_eq!(session.analysis_count(), 0);
    }

    #[test]
    fn each_start_gets_a_new_id() {
        let mut session = Session::new();
        session.start(Utc::now());
        let first = session.id.clone();
        session.reset();
        session.start(Utc::now());
        assert_ne!(first, session.id);
    }

    #[test]
    fn notification_priority() {
        assert_eq!(notification_for(None), "");
        assert_eq!(notification_for(Some(&analysis(false, true, false))), "");
        assert_eq!(notification_for(Some(&analysis(false, false, false))), "FOCUS");
        assert_eq!(notification_for(Some(&analysis(true, false, false))), "FIX POSTURE");
        assert_eq!(
            notification_for(Some(&analysis(true, false, true))),
            "PUT PHONE AWAY"
        );
    }
}
