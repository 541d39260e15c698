use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::posture::PostureAnalysisResult;

/// Longest remote session we accept when resuming; anything larger is treated as garbage.
const MAX_RESUME_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// One outbound telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub device_id: String,
    /// Unix seconds.
    pub timestamp: f64,
    /// Unix seconds.
    pub session_start: f64,
    pub slouching: bool,
    pub on_phone: bool,
    pub attentive: bool,
    pub torso_angle: f64,
    pub head_forward: f64,
    pub posture_score: u8,
}

impl QueuedEvent {
    pub fn from_analysis(
        device_id: &str,
        session_start: DateTime<Utc>,
        timestamp: DateTime<Utc>,
        analysis: &PostureAnalysisResult,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp: unix_seconds(timestamp),
            session_start: unix_seconds(session_start),
            slouching: analysis.slouching,
            on_phone: analysis.on_phone,
            attentive: analysis.attentive,
            torso_angle: round_to(analysis.torso_angle, 2),
            head_forward: round_to(analysis.head_forward, 3),
            posture_score: posture_score(analysis.slouching, analysis.on_phone, analysis.attentive),
        }
    }
}

/// 100 minus fixed deductions (40 slouching, 40 on phone, 20 inattentive), floored at 0.
pub fn posture_score(slouching: bool, on_phone: bool, attentive: bool) -> u8 {
    let mut score: i32 = 100;
    if slouching {
        score -= 40;
    }
    if on_phone {
        score -= 40;
    }
    if !attentive {
        score -= 20;
    }
    score.max(0) as u8
}

/// Wire body of the batch upload.
#[derive(Debug, Serialize)]
pub struct EventBatch<'a> {
    pub events: &'a [QueuedEvent],
}

/// Session bookkeeping calls made on START/STOP and RESET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    Toggle,
    Reset,
}

impl SessionLifecycle {
    pub fn path(self) -> &'static str {
        match self {
            SessionLifecycle::Toggle => "/api/button/toggle",
            SessionLifecycle::Reset => "/api/button/reset",
        }
    }
}

/// Summary saved remotely when a session stops.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub duration_seconds: u64,
    pub task_type: String,
    pub posture_avg: u8,
    /// RFC 3339 stop time.
    pub timestamp: String,
}

/// Subset of the aggregator's status document used to resume a session.
#[derive(Debug, Deserialize)]
pub struct StatusReport {
    pub session_seconds: f64,
}

impl StatusReport {
    pub fn elapsed_secs(&self) -> Result<f64> {
        let secs = self.session_seconds;
        if !secs.is_finite() || secs < 0.0 || secs > MAX_RESUME_SECS {
            bail!("implausible session_seconds {secs}");
        }
        Ok(secs)
    }
}

pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
