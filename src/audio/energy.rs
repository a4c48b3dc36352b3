//! Energy-based speech detection.
//!
//! Mean absolute amplitude against a threshold calibrated from ambient
//! noise. A [`PhraseDetector`] turns a stream of chunks into one phrase.

use std::time::Duration;

use super::capture::TARGET_SAMPLE_RATE;

/// Lowest speech threshold, for near-silent rooms.
pub const MIN_THRESHOLD: f32 = 0.01;

/// Threshold used before calibration.
pub const DEFAULT_THRESHOLD: f32 = 0.02;

/// Ambient energy is scaled by this to get the speech threshold.
const AMBIENT_FACTOR: f32 = 1.5;

/// Trailing silence that ends a phrase.
pub const PAUSE: Duration = Duration::from_millis(800);

/// Mean absolute value of the samples.
pub fn detect(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let sum: f32 = chunk.iter().map(|s| s.abs()).sum();
    sum / chunk.len() as f32
}

pub fn threshold_for_ambient(ambient: f32) -> f32 {
    (ambient * AMBIENT_FACTOR).max(MIN_THRESHOLD)
}

fn samples_for(duration: Duration) -> usize {
    (duration.as_secs_f64() * TARGET_SAMPLE_RATE as f64) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// No onset yet.
    Waiting,
    Recording,
    /// Pause detected or phrase limit reached.
    Complete,
}

pub struct PhraseDetector {
    threshold: f32,
    pause_samples: usize,
    max_samples: usize,
    samples: Vec<f32>,
    trailing_silence: usize,
}

impl PhraseDetector {
    pub fn new(threshold: f32, phrase_limit: Duration) -> Self {
        Self {
            threshold,
            pause_samples: samples_for(PAUSE),
            max_samples: samples_for(phrase_limit).max(1),
            samples: Vec::new(),
            trailing_silence: 0,
        }
    }

    pub fn started(&self) -> bool {
        !self.samples.is_empty()
    }

    pub fn feed(&mut self, chunk: &[f32]) -> Feed {
        let loud = detect(chunk) > self.threshold;
        if !self.started() && !loud {
            return Feed::Waiting;
        }

        let room = self.max_samples - self.samples.len();
        self.samples.extend_from_slice(&chunk[..chunk.len().min(room)]);
        self.trailing_silence = if loud {
            0
        } else {
            self.trailing_silence + chunk.len()
        };

        if self.samples.len() >= self.max_samples || self.trailing_silence >= self.pause_samples {
            Feed::Complete
        } else {
            Feed::Recording
        }
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 480;

    #[test]
    fn test_detect() {
        assert_eq!(detect(&[]), 0.0);
        assert_eq!(detect(&[0.5, -0.5, 0.0, 0.0]), 0.25);
    }

    #[test]
    fn test_threshold_floor() {
        assert_eq!(threshold_for_ambient(0.0), MIN_THRESHOLD);
        assert_eq!(threshold_for_ambient(0.1), 0.1 * 1.5);
    }

    #[test]
    fn test_silence_never_starts() {
        let mut d = PhraseDetector::new(0.05, Duration::from_secs(10));
        for _ in 0..100 {
            assert_eq!(d.feed(&[0.001; CHUNK]), Feed::Waiting);
        }
        assert!(!d.started());
    }

    #[test]
    fn test_phrase_ends_after_pause() {
        let mut d = PhraseDetector::new(0.05, Duration::from_secs(10));
        assert_eq!(d.feed(&[0.3; CHUNK]), Feed::Recording);
        // 0.8 s of silence = 12800 samples, under 27 chunks of 480.
        let mut feeds = 0;
        while d.feed(&[0.0; CHUNK]) != Feed::Complete {
            feeds += 1;
            assert!(feeds < 30);
        }
        assert_eq!(feeds, 26);
        assert_eq!(d.into_samples().len(), CHUNK * 28);
    }

    #[test]
    fn test_phrase_limit_caps_length() {
        let mut d = PhraseDetector::new(0.05, Duration::from_millis(100));
        for _ in 0..3 {
            assert_eq!(d.feed(&[0.3; CHUNK]), Feed::Recording);
        }
        assert_eq!(d.feed(&[0.3; CHUNK]), Feed::Complete);
        assert_eq!(d.into_samples().len(), 1600);
    }
}
