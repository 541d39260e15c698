mod gemini;

pub use gemini::GeminiClassifier;

use anyhow::Result;
use std::{
    future::Future,
    time::{Duration, Instant},
};

use crate::{capture::CapturedFrame, settings::Settings};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "phone";

use crate::{log_debug, log_info, log_warn};

/// An external service that answers "is this person using a phone?" for one frame.
pub trait VisionClassifier: Send + Sync {
    fn classify(&self, frame: &CapturedFrame) -> impl Future<Output = Result<bool>> + Send;
}

/// Runtime choice of classifier: Gemini when an API key is configured, otherwise a
/// backend that always answers "no phone".
pub enum PhoneBackend {
    Gemini(GeminiClassifier),
    Disabled,
}

impl PhoneBackend {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match settings.gemini_api_key.as_deref() {
            Some(key) => {
                let classifier =
                    GeminiClassifier::new(key, &settings.gemini_model, settings.phone_timeout())?;
                log_info!("phone detection via {}", settings.gemini_model);
                Ok(PhoneBackend::Gemini(classifier))
            }
            None => {
                log_warn!("no GEMINI_API_KEY set; phone detection disabled");
                Ok(PhoneBackend::Disabled)
            }
        }
    }
}

impl VisionClassifier for PhoneBackend {
    fn classify(&self, frame: &CapturedFrame) -> impl Future<Output = Result<bool>> + Send {
        async move {
            match self {
                PhoneBackend::Gemini(classifier) => classifier.classify(frame).await,
                PhoneBackend::Disabled => Ok(false),
            }
        }
    }
}

/// Rate-limits a slow classifier behind a time-based cache.
///
/// At most one external call per `check_interval`, counted from the last attempt whether it
/// succeeded or not. A failed call keeps the previous answer.
pub struct PhoneUseClassifier<C> {
    backend: C,
    check_interval: Duration,
    timeout: Duration,
    last_attempt: Option<Instant>,
    cached: bool,
}

impl<C: VisionClassifier> PhoneUseClassifier<C> {
    pub fn new(backend: C, check_interval: Duration, timeout: Duration) -> Self {
        Self {
            backend,
            check_interval,
            timeout,
            last_attempt: None,
            cached: false,
        }
    }

    pub fn cached(&self) -> bool {
        self.cached
    }

    pub async fn classify(&mut self, frame: &CapturedFrame) -> bool {
        self.classify_at(frame, Instant::now()).await
    }

    pub async fn classify_at(&mut self, frame: &CapturedFrame, now: Instant) -> bool {
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.check_interval {
                return self.cached;
            }
        }
        self.last_attempt = Some(now);

        match tokio::time::timeout(self.timeout, self.backend.classify(frame)).await {
            Ok(Ok(on_phone)) => {
                log_debug!("phone in use: {on_phone}");
                self.cached = on_phone;
            }
            Ok(Err(err)) => log_warn!("classifier failed, keeping last answer: {err:#}"),
            Err(_) => log_warn!(
                "classifier timed out after {:?}, keeping last answer",
                self.timeout
            ),
        }
        self.cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    /// Answers from a script, one entry per call; `None` means the call fails.
    struct Scripted {
        answers: Mutex<Vec<Option<bool>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(mut answers: Vec<Option<bool>>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl VisionClassifier for Scripted {
        fn classify(&self, _frame: &CapturedFrame) -> impl Future<Output = Result<bool>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.answers.lock().unwrap().pop().flatten();
            async move { next.ok_or_else(|| anyhow!("service unavailable")) }
        }
    }

    struct Stalled;

    impl VisionClassifier for Stalled {
        fn classify(&self, _frame: &CapturedFrame) -> impl Future<Output = Result<bool>> + Send {
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(true)
            }
        }
    }

    fn frame() -> CapturedFrame {
        CapturedFrame {
            width: 320,
            height: 240,
            image: None,
            poses: Vec::new(),
        }
    }

    const INTERVAL: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn calls_within_interval_reuse_the_cached_answer() {
        let scripted = Scripted::new(vec![Some(true), Some(false)]);
        let mut classifier = PhoneUseClassifier::new(scripted, INTERVAL, INTERVAL);
        let t0 = Instant::now();

        assert!(classifier.classify_at(&frame(), t0).await);
        assert!(classifier.classify_at(&frame(), t0 + Duration::from_secs(2)).await);
        assert!(classifier.classify_at(&frame(), t0 + Duration::from_millis(4999)).await);
        assert_eq!(classifier.backend.calls.load(Ordering::SeqCst), 1);

        assert!(!classifier.classify_at(&frame(), t0 + INTERVAL).await);
        assert_eq!(classifier.backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_keep_the_last_answer_and_still_throttle() {
        let scripted = Scripted::new(vec![Some(true), None, Some(false)]);
        let mut classifier = PhoneUseClassifier::new(scripted, INTERVAL, INTERVAL);
        let t0 = Instant::now();

        assert!(classifier.classify_at(&frame(), t0).await);
        // Fails: answer stays true, and the attempt restarts the interval.
        assert!(classifier.classify_at(&frame(), t0 + Duration::from_secs(5)).await);
        assert!(classifier.classify_at(&frame(), t0 + Duration::from_secs(9)).await);
        assert_eq!(classifier.backend.calls.load(Ordering::SeqCst), 2);

        assert!(!classifier.classify_at(&frame(), t0 + Duration::from_secs(10)).await);
        assert_eq!(classifier.backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_failure_defaults_to_no_phone() {
        let mut classifier = PhoneUseClassifier::new(Scripted::new(vec![None]), INTERVAL, INTERVAL);
        assert!(!classifier.classify(&frame()).await);
        assert!(!classifier.cached());
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_as_failures() {
        let mut classifier =
            PhoneUseClassifier::new(Stalled, INTERVAL, Duration::from_millis(100));
        assert!(!classifier.classify(&frame()).await);
        assert!(classifier.last_attempt.is_some());
    }

    #[tokio::test]
    async fn disabled_backend_never_reports_a_phone() {
        let mut classifier = PhoneUseClassifier::new(PhoneBackend::Disabled, INTERVAL, INTERVAL);
        assert!(!classifier.classify(&frame()).await);
    }
}
