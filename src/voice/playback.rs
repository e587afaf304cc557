//! Audio playback to speakers
//!
//! The output stream runs continuously from open to close. Buffers are queued
//! on a sample-accurate timeline and rendered when the playback clock reaches
//! their start time; silence fills any gap.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, SupportedStreamConfigRange};

use super::codec::PcmBuffer;
use super::device::OutputDevice;
use crate::{Error, Result};

/// Plays scheduled buffers on the default output device
pub struct CpalOutput {
    stream: Option<Stream>,
    timeline: Arc<Mutex<Timeline>>,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate` and start the clock
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports the requested rate
    pub fn open(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".to_string()))?;

        let supports = |channels: u16| {
            move |c: &SupportedStreamConfigRange| {
                c.channels() == channels
                    && c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            }
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(supports(1))
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(supports(2))
            })
            .ok_or_else(|| Error::Device("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let channels = usize::from(config.channels.max(1));

        let timeline = Arc::new(Mutex::new(Timeline::new(sample_rate)));
        let render_timeline = Arc::clone(&timeline);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render_timeline
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .render(data, channels);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio playback initialized"
        );

        Ok(Self {
            stream: Some(stream),
            timeline,
        })
    }

    fn timeline(&self) -> std::sync::MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.timeline().current_time()
    }

    fn schedule(&mut self, earliest: f64, buffer: PcmBuffer) -> f64 {
        self.timeline().schedule(earliest, buffer.samples)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            let dropped = self.timeline().clear();
            tracing::debug!(pending_buffers = dropped, "audio playback closed");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// A buffer waiting on the timeline
struct Scheduled {
    start: u64,
    samples: Vec<f32>,
}

/// Sample-accurate playback timeline driven by the output callback
pub struct Timeline {
    sample_rate: u32,
    position: u64,
    queue: VecDeque<Scheduled>,
}

impl Timeline {
    /// Create an empty timeline at position zero
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            position: 0,
            queue: VecDeque::new(),
        }
    }

    /// Seconds rendered so far
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_time(&self) -> f64 {
        self.position as f64 / f64::from(self.sample_rate)
    }

    /// Queue samples to start no earlier than `earliest` seconds
    ///
    /// The start is pushed past the current position and past the end of the
    /// last queued buffer, so buffers never overlap. Returns the start actually
    /// used, in seconds.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn schedule(&mut self, earliest: f64, samples: Vec<f32>) -> f64 {
        let requested = (earliest.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        let start = requested.max(self.position).max(self.tail());
        if !samples.is_empty() {
            self.queue.push_back(Scheduled { start, samples });
        }
        start as f64 / f64::from(self.sample_rate)
    }

    /// First sample after the last queued buffer
    fn tail(&self) -> u64 {
        self.queue
            .back()
            .map_or(0, |last| {
                last.start
                    .saturating_add(u64::try_from(last.samples.len()).unwrap_or(u64::MAX))
            })
    }

    /// Fill an interleaved output buffer, advancing the clock one frame per sample
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            frame.fill(self.next_sample());
        }
    }

    /// Drop all queued buffers, returning how many were pending
    pub fn clear(&mut self) -> usize {
        let pending = self.queue.len();
        self.queue.clear();
        pending
    }

    fn next_sample(&mut self) -> f32 {
        let pos = self.position;
        self.position += 1;

        while let Some(front) = self.queue.front() {
            if pos < front.start {
                return 0.0;
            }
            let offset = usize::try_from(pos - front.start).unwrap_or(usize::MAX);
            if let Some(&sample) = front.samples.get(offset) {
                return sample;
            }
            self.queue.pop_front();
        }
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::PlaybackCursor;

    #[test]
    fn test_silence_when_empty() {
        let mut timeline = Timeline::new(4);
        let mut out = [1.0f32; 8];
        timeline.render(&mut out, 1);

        assert_eq!(out, [0.0; 8]);
        assert!((timeline.current_time() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_back_to_back_buffers_are_gapless() {
        let mut timeline = Timeline::new(4);
        timeline.schedule(0.5, vec![0.1, 0.2]);
        timeline.schedule(1.0, vec![0.3, 0.4]);

        let mut out = [0.0f32; 7];
        timeline.render(&mut out, 1);

        assert_eq!(out, [0.0, 0.0, 0.1, 0.2, 0.3, 0.4, 0.0]);
    }

    #[test]
    fn test_stereo_duplicates_mono() {
        let mut timeline = Timeline::new(2);
        timeline.schedule(0.0, vec![0.5, -0.5]);

        let mut out = [0.0f32; 4];
        timeline.render(&mut out, 2);

        assert_eq!(out, [0.5, 0.5, -0.5, -0.5]);
        assert!((timeline.current_time() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_late_start_plays_from_now() {
        let mut timeline = Timeline::new(4);
        let mut out = [0.0f32; 4];
        timeline.render(&mut out, 1);

        timeline.schedule(0.0, vec![0.7, 0.8]);
        timeline.render(&mut out, 1);

        assert_eq!(out, [0.7, 0.8, 0.0, 0.0]);
    }

    #[test]
    fn test_schedule_reports_clamped_start() {
        let mut timeline = Timeline::new(4);
        let mut out = [0.0f32; 4];
        timeline.render(&mut out, 1);

        let start = timeline.schedule(0.25, vec![0.1, 0.2]);
        assert!((start - 1.0).abs() < f64::EPSILON);

        // Requested inside the first buffer, so it waits for it to finish
        let start = timeline.schedule(1.0, vec![0.3]);
        assert!((start - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_render_between_clock_read_and_schedule_keeps_audio() {
        let mut timeline = Timeline::new(4);
        let mut cursor = PlaybackCursor::new();

        // The output callback advances the clock after it was read
        let now = timeline.current_time();
        let mut out = [0.0f32; 4];
        timeline.render(&mut out, 1);

        timeline.schedule(cursor.schedule(now, 1.0), vec![0.1, 0.2, 0.3, 0.4]);
        timeline.schedule(
            cursor.schedule(timeline.current_time(), 1.0),
            vec![0.5, 0.6, 0.7, 0.8],
        );

        let mut out = [0.0f32; 8];
        timeline.render(&mut out, 1);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
    }

    #[test]
    fn test_cursor_follows_reported_start() {
        let mut timeline = Timeline::new(4);
        let mut cursor = PlaybackCursor::new();
        let mut played = Vec::new();

        for chunk in [[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]] {
            let earliest = cursor.next_start();
            let mut tick = [0.0f32; 1];
            timeline.render(&mut tick, 1);
            played.extend(tick);

            let start = timeline.schedule(earliest, chunk.to_vec());
            cursor.schedule(start, 0.5);
        }

        let mut rest = [0.0f32; 4];
        timeline.render(&mut rest, 1);
        played.extend(rest);

        assert_eq!(played, [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert!((cursor.next_start() - 1.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_drops_pending() {
        let mut timeline = Timeline::new(4);
        timeline.schedule(1.0, vec![0.1]);
        timeline.schedule(2.0, vec![0.2]);

        assert_eq!(timeline.clear(), 2);

        let mut out = [1.0f32; 12];
        timeline.render(&mut out, 1);
        assert_eq!(out, [0.0; 12]);
    }
}
