use rand::seq::SliceRandom;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::posture::PostureAnalysisResult;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "alerts";

use crate::log_info;

/// Something that turns a line of text into audible output. Must return without waiting
/// for playback.
pub trait Speaker: Send {
    fn say(&self, phrase: &str);
}

/// Posture problems that can be announced, in display priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertCondition {
    OnPhone,
    Slouching,
    Inattentive,
}

impl AlertCondition {
    pub const ALL: [AlertCondition; 3] = [
        AlertCondition::OnPhone,
        AlertCondition::Slouching,
        AlertCondition::Inattentive,
    ];

    pub fn is_active(self, result: &PostureAnalysisResult) -> bool {
        match self {
            AlertCondition::OnPhone => result.on_phone,
            AlertCondition::Slouching => result.slouching,
            AlertCondition::Inattentive => !result.attentive,
        }
    }

    /// Highest-priority active condition: on-phone, then slouching, then inattentive.
    pub fn most_urgent(result: &PostureAnalysisResult) -> Option<AlertCondition> {
        Self::ALL.into_iter().find(|c| c.is_active(result))
    }

    /// Short text for the hardware display.
    pub fn notification(self) -> &'static str {
        match self {
            AlertCondition::OnPhone => "PUT PHONE AWAY",
            AlertCondition::Slouching => "FIX POSTURE",
            AlertCondition::Inattentive => "FOCUS",
        }
    }

    fn phrases(self) -> &'static [&'static str] {
        match self {
            AlertCondition::OnPhone => &[
                "Put the phone down and get back to it.",
                "Phone away, please.",
                "That phone can wait.",
            ],
            AlertCondition::Slouching => &[
                "Sit up straight.",
                "You're slouching. Straighten your back.",
                "Check your posture.",
            ],
            AlertCondition::Inattentive => &[
                "Eyes back on your work.",
                "Stay focused.",
                "Head back to center.",
            ],
        }
    }
}

/// Debounced spoken alerts. Each condition has its own cooldown; muting suppresses new
/// alerts but leaves the cooldown timers alone.
pub struct AlertController {
    speaker: Box<dyn Speaker>,
    cooldown: Duration,
    muted: bool,
    last_fired: HashMap<AlertCondition, Instant>,
}

impl AlertController {
    pub fn new(speaker: Box<dyn Speaker>, cooldown: Duration) -> Self {
        Self {
            speaker,
            cooldown,
            muted: false,
            last_fired: HashMap::new(),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn mute(&mut self) {
        self.muted = true;
    }

    pub fn unmute(&mut self) {
        self.muted = false;
    }

    /// Flips the mute state and returns the new value.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        log_info!("alerts {}", if self.muted { "muted" } else { "unmuted" });
        self.muted
    }

    pub fn check_and_alert(&mut self, result: &PostureAnalysisResult) -> Vec<AlertCondition> {
        self.check_and_alert_at(result, Instant::now())
    }

    /// Speaks once for every active condition whose cooldown has run out. Returns the
    /// conditions that fired.
    pub fn check_and_alert_at(
        &mut self,
        result: &PostureAnalysisResult,
        now: Instant,
    ) -> Vec<AlertCondition> {
        if self.muted {
            return Vec::new();
        }

        let mut fired = Vec::new();
        for condition in AlertCondition::ALL {
            if !condition.is_active(result) || !self.cooled_down(condition, now) {
                continue;
            }
            if let Some(phrase) = condition.phrases().choose(&mut rand::thread_rng()) {
                self.speaker.say(phrase);
            }
            self.last_fired.insert(condition, now);
            fired.push(condition);
        }
        fired
    }

    fn cooled_down(&self, condition: AlertCondition, now: Instant) -> bool {
        self.last_fired
            .get(&condition)
            .map(|last| now.saturating_duration_since(*last) >= self.cooldown)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Speaker for Recorder {
        fn say(&self, phrase: &str) {
            self.0.lock().unwrap().push(phrase.to_string());
        }
    }

    impl Recorder {
        fn spoken(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn result(slouching: bool, attentive: bool, on_phone: bool) -> PostureAnalysisResult {
        PostureAnalysisResult {
            torso_angle: if slouching { 30.0 } else { 2.0 },
            head_forward: if attentive { 0.01 } else { 0.2 },
            slouching,
            attentive,
            on_phone,
            shoulder_avg: Point2::default(),
            hip_avg: Point2::default(),
            nose: Point2::default(),
        }
    }

    const COOLDOWN: Duration = Duration::from_secs(10);

    #[test]
    fn repeated_condition_within_cooldown_speaks_once() {
        let recorder = Recorder::default();
        let mut alerts = AlertController::new(Box::new(recorder.clone()), COOLDOWN);
        let t0 = Instant::now();
        let slouch = result(true, true, false);

        assert_eq!(alerts.check_and_alert_at(&slouch, t0), vec![AlertCondition::Slouching]);
        assert!(alerts.check_and_alert_at(&slouch, t0 + Duration::from_secs(3)).is_empty());
        assert_eq!(recorder.spoken().len(), 1);
        assert!(AlertCondition::Slouching.phrases().contains(&recorder.spoken()[0].as_str()));

        assert_eq!(
            alerts.check_and_alert_at(&slouch, t0 + COOLDOWN),
            vec![AlertCondition::Slouching]
        );
        assert_eq!(recorder.spoken().len(), 2);
    }

    #[test]
    fn simultaneous_conditions_fire_independently() {
        let recorder = Recorder::default();
        let mut alerts = AlertController::new(Box::new(recorder.clone()), COOLDOWN);
        let t0 = Instant::now();

        alerts.check_and_alert_at(&result(true, true, false), t0);
        let fired =
            alerts.check_and_alert_at(&result(true, false, true), t0 + Duration::from_secs(1));

        assert_eq!(fired, vec![AlertCondition::OnPhone, AlertCondition::Inattentive]);
        assert_eq!(recorder.spoken().len(), 3);
    }

    #[test]
    fn good_posture_is_silent() {
        let recorder = Recorder::default();
        let mut alerts = AlertController::new(Box::new(recorder.clone()), COOLDOWN);
        assert!(alerts.check_and_alert(&result(false, true, false)).is_empty());
        assert!(recorder.spoken().is_empty());
    }

    #[test]
    fn mute_suppresses_without_resetting_cooldowns() {
        let recorder = Recorder::default();
        let mut alerts = AlertController::new(Box::new(recorder.clone()), COOLDOWN);
        let t0 = Instant::now();
        let slouch = result(true, true, false);

        alerts.check_and_alert_at(&slouch, t0);
        assert!(alerts.toggle_mute());
        assert!(alerts.check_and_alert_at(&slouch, t0 + COOLDOWN * 2).is_empty());

        alerts.unmute();
        assert!(!alerts.is_muted());
        // Cooldown was measured from t0, untouched by muting.
        assert!(alerts.check_and_alert_at(&slouch, t0 + Duration::from_secs(5)).is_empty());
        assert_eq!(alerts.check_and_alert_at(&slouch, t0 + COOLDOWN).len(), 1);
        assert_eq!(recorder.spoken().len(), 2);
    }

    #[test]
    fn muting_while_silent_then_unmuting_fires_immediately() {
        let recorder = Recorder::default();
        let mut alerts = AlertController::new(Box::new(recorder.clone()), COOLDOWN);
        alerts.mute();
        assert!(alerts.check_and_alert(&result(false, false, false)).is_empty());
        alerts.unmute();
        assert_eq!(
            alerts.check_and_alert(&result(false, false, false)),
            vec![AlertCondition::Inattentive]
        );
    }

    #[test]
    fn urgency_order_is_phone_then_slouch_then_focus() {
        assert_eq!(
            AlertCondition::most_urgent(&result(true, false, true)),
            Some(AlertCondition::OnPhone)
        );
        assert_eq!(
            AlertCondition::most_urgent(&result(true, false, false)),
            Some(AlertCondition::Slouching)
        );
        assert_eq!(
            AlertCondition::most_urgent(&result(false, false, false)),
            Some(AlertCondition::Inattentive)
        );
        assert_eq!(AlertCondition::most_urgent(&result(false, true, false)), None);
    }
}
