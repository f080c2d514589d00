//! Audio notifier seam and the alternating-tone alarm schedule.
//!
//! The engine only needs start/stop/is-playing. [`ToneAlarm`] implements the
//! schedule (two tones alternating at a fixed cadence, self-stopping after a
//! fixed total) and leaves actual sound output to whoever polls it.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Audio output collaborator. Both transitions are idempotent.
pub trait AudioNotifier {
    fn play_alarm(&mut self);

    fn stop_alarm(&mut self);

    fn is_playing(&self) -> bool;
}

impl<N> AudioNotifier for Box<N>
where
    N: AudioNotifier + ?Sized,
{
    fn play_alarm(&mut self) {
        (**self).play_alarm()
    }

    fn stop_alarm(&mut self) {
        (**self).stop_alarm()
    }

    fn is_playing(&self) -> bool {
        (**self).is_playing()
    }
}

/// Notifier without output, for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier {
    playing: bool,
}

impl AudioNotifier for SilentNotifier {
    fn play_alarm(&mut self) {
        self.playing = true;
    }

    fn stop_alarm(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

/// Shape of the alarm sound.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TonePattern {
    pub high_hz: f64,
    pub low_hz: f64,
    /// Length of one tone before switching frequency.
    pub tone_ms: i64,
    /// Self-stop after this long.
    pub total_ms: i64,
    /// 0.0 to 1.0
    pub volume: f64,
}

impl Default for TonePattern {
    fn default() -> Self {
        Self {
            high_hz: 800.0,
            low_hz: 400.0,
            tone_ms: 200,
            total_ms: 3000,
            volume: 0.3,
        }
    }
}

impl TonePattern {
    /// Number of tones in one full alarm.
    pub fn tone_count(&self) -> i64 {
        if self.tone_ms <= 0 {
            return 0;
        }
        (self.total_ms + self.tone_ms - 1) / self.tone_ms
    }
}

/// One scheduled tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    /// Position in the schedule, starting at zero with the high tone.
    pub sequence: i64,
    pub frequency_hz: f64,
    pub volume: f64,
}

/// Alternating high/low tone alarm driven by a [`Clock`].
#[derive(Debug)]
pub struct ToneAlarm<C> {
    clock: C,
    pattern: TonePattern,
    started_at: Option<DateTime<Utc>>,
    last_emitted: Option<i64>,
}

impl<C> ToneAlarm<C>
where
    C: Clock,
{
    pub fn new(clock: C, pattern: TonePattern) -> Self {
        let mut pattern = pattern;
        pattern.volume = pattern.volume.clamp(0.0, 1.0);

        Self {
            clock,
            pattern,
            started_at: None,
            last_emitted: None,
        }
    }

    pub fn pattern(&self) -> &TonePattern {
        &self.pattern
    }

    pub fn volume(&self) -> f64 {
        self.pattern.volume
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.pattern.volume = volume.clamp(0.0, 1.0);
    }

    /// Play once regardless of any alarm rule, for checking the output path.
    pub fn test_alarm(&mut self) {
        debug!("testing alarm audio");
        self.play_alarm();
    }

    fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|started| self.clock.now() - started)
    }

    fn tone_at(&self, sequence: i64) -> Tone {
        let frequency_hz = if sequence % 2 == 0 {
            self.pattern.high_hz
        } else {
            self.pattern.low_hz
        };

        Tone {
            sequence,
            frequency_hz,
            volume: self.pattern.volume,
        }
    }

    /// Tone that should be sounding right now, if any.
    pub fn active_tone(&self) -> Option<Tone> {
        let elapsed = self.elapsed()?;
        if elapsed.num_milliseconds() >= self.pattern.total_ms || self.pattern.tone_ms <= 0 {
            return None;
        }
        Some(self.tone_at(elapsed.num_milliseconds() / self.pattern.tone_ms))
    }

    /// Advance the schedule.
    ///
    /// Returns the tone to start when the schedule has moved to a new tone since
    /// the last poll, and stops the alarm once the total duration has elapsed.
    pub fn poll(&mut self) -> Option<Tone> {
        let elapsed = self.elapsed()?;
        if elapsed.num_milliseconds() >= self.pattern.total_ms {
            debug!(elapsed_ms = elapsed.num_milliseconds(), "alarm audio timed out");
            self.stop_alarm();
            return None;
        }

        let tone = self.active_tone()?;
        if self.last_emitted == Some(tone.sequence) {
            return None;
        }
        self.last_emitted = Some(tone.sequence);
        Some(tone)
    }
}

impl<C> AudioNotifier for ToneAlarm<C>
where
    C: Clock,
{
    fn play_alarm(&mut self) {
        if self.is_playing() {
            return;
        }
        info!(volume = self.pattern.volume, "starting alarm audio");
        self.started_at = Some(self.clock.now());
        self.last_emitted = None;
    }

    fn stop_alarm(&mut self) {
        if self.started_at.take().is_some() {
            info!("stopping alarm audio");
        }
        self.last_emitted = None;
    }

    fn is_playing(&self) -> bool {
        self.elapsed()
            .is_some_and(|elapsed| elapsed.num_milliseconds() < self.pattern.total_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn alarm() -> (Arc<ManualClock>, ToneAlarm<Arc<ManualClock>>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        ));
        let alarm = ToneAlarm::new(Arc::clone(&clock), TonePattern::default());
        (clock, alarm)
    }

    #[test]
    fn test_tone_alarm_alternates_and_self_stops() {
        let (clock, mut alarm) = alarm();
        assert!(!alarm.is_playing());
        assert_eq!(alarm.poll(), None);

        alarm.play_alarm();
        assert!(alarm.is_playing());

        let first = alarm.poll().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.frequency_hz, 800.0);
        assert_eq!(alarm.poll(), None);

        clock.advance(Duration::milliseconds(250));
        let second = alarm.poll().unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.frequency_hz, 400.0);

        clock.advance(Duration::milliseconds(3000));
        assert!(!alarm.is_playing());
        assert_eq!(alarm.poll(), None);
        assert_eq!(alarm.active_tone(), None);
    }

    #[test]
    fn test_tone_alarm_play_and_stop_are_idempotent() {
        let (clock, mut alarm) = alarm();

        alarm.play_alarm();
        clock.advance(Duration::milliseconds(1000));
        alarm.play_alarm();
        // Replaying while playing keeps the original start
        clock.advance(Duration::milliseconds(2100));
        assert!(!alarm.is_playing());

        alarm.stop_alarm();
        alarm.stop_alarm();
        assert!(!alarm.is_playing());

        alarm.play_alarm();
        assert!(alarm.is_playing());
        alarm.stop_alarm();
        assert!(!alarm.is_playing());
        assert_eq!(alarm.active_tone(), None);
    }

    #[test]
    fn test_volume_is_clamped() {
        let (_, mut alarm) = alarm();
        alarm.set_volume(1.7);
        assert_eq!(alarm.volume(), 1.0);
        alarm.set_volume(-0.2);
        assert_eq!(alarm.volume(), 0.0);

        let clock = ManualClock::new(Utc::now());
        let loud = ToneAlarm::new(&clock, TonePattern { volume: 4.0, ..Default::default() });
        assert_eq!(loud.volume(), 1.0);
    }

    #[test]
    fn test_tone_count() {
        assert_eq!(TonePattern::default().tone_count(), 15);
        assert_eq!(TonePattern { tone_ms: 0, ..Default::default() }.tone_count(), 0);
    }

    #[test]
    fn test_silent_notifier_tracks_state() {
        let mut notifier: Box<dyn AudioNotifier> = Box::new(SilentNotifier::default());
        notifier.play_alarm();
        assert!(notifier.is_playing());
        notifier.stop_alarm();
        assert!(!notifier.is_playing());
    }
}
