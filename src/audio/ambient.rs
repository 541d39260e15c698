use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rodio::Source;
use std::f32::consts::{PI, TAU};
use std::time::Duration;

const SAMPLE_RATE: u32 = 44_100;

/// Background focus sounds, cycled by the "skip" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbientKind {
    BrownNoise,
    Rain,
    Binaural,
}

impl AmbientKind {
    pub fn next(self) -> Self {
        match self {
            AmbientKind::BrownNoise => AmbientKind::Rain,
            AmbientKind::Rain => AmbientKind::Binaural,
            AmbientKind::Binaural => AmbientKind::BrownNoise,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AmbientKind::BrownNoise => "brown noise",
            AmbientKind::Rain => "rain",
            AmbientKind::Binaural => "binaural",
        }
    }
}

/// Endless generated ambient track. Always stereo so the sink never has to
/// re-negotiate channels when the track changes.
pub struct AmbientSound {
    kind: AmbientKind,
    rng: StdRng,
    /// Integrated (brown) noise state.
    walk: f32,
    /// Band-pass history for the rain texture: x[n-1], x[n-2], y[n-1], y[n-2].
    filter: [f32; 4],
    /// Sample index within the current stereo frame pair.
    frame: u64,
    right_channel: bool,
    held: f32,
}

impl AmbientSound {
    pub fn new(kind: AmbientKind) -> Self {
        Self {
            kind,
            rng: StdRng::from_entropy(),
            walk: 0.0,
            filter: [0.0; 4],
            frame: 0,
            right_channel: false,
            held: 0.0,
        }
    }

    fn brown_step(&mut self) -> f32 {
        let white: f32 = self.rng.gen_range(-1.0..1.0);
        self.walk = ((self.walk + white * 0.02).clamp(-1.0, 1.0)) * 0.9999;
        self.walk
    }

    fn rain_step(&mut self) -> f32 {
        let input = self.brown_step();
        let [x1, x2, y1, y2] = self.filter;
        let output = 0.1 * input - 0.1 * x2 + 1.8 * y1 - 0.85 * y2;
        self.filter = [input, x1, output, y1];

        let t = self.frame as f32 / SAMPLE_RATE as f32;
        let swell = 0.7 + 0.3 * (0.3 * t % TAU).sin();
        (output * 0.8 + input * 0.2) * swell
    }

    /// One mono sample for the current frame, or a per-ear tone for binaural.
    fn sample(&mut self) -> f32 {
        match self.kind {
            AmbientKind::BrownNoise => self.brown_step() * 0.3,
            AmbientKind::Rain => self.rain_step() * 0.4,
            AmbientKind::Binaural => {
                let t = self.frame as f32 / SAMPLE_RATE as f32;
                let freq = if self.right_channel { 204.0 } else { 200.0 };
                (2.0 * PI * freq * t).sin() * 0.15
            }
        }
    }
}

impl Iterator for AmbientSound {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let value = if self.right_channel && self.kind != AmbientKind::Binaural {
            // Noise tracks are mono; repeat the left sample on the right.
            self.held
        } else {
            self.sample()
        };
        self.held = value;

        if self.right_channel {
            self.frame = self.frame.wrapping_add(1);
        }
        self.right_channel = !self.right_channel;
        Some(value)
    }
}

impl Source for AmbientSound {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
