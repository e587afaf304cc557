//! Audio capture from microphone

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use super::device::{BlockCallback, InputDevice};
use crate::{Error, Result};

/// Captures audio from the default input device in fixed-size blocks
pub struct CpalInput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl CpalInput {
    /// Open the default input device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no input device supports the requested rate
    pub fn open(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let supports_rate = |c: &SupportedStreamConfigRange| {
            c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| c.channels() == 1 && supports_rate(c))
            .or_else(|| {
                // Fallback: multi-channel input, downmixed in the callback
                device.supported_input_configs().ok()?.find(supports_rate)
            })
            .ok_or_else(|| Error::Device("no suitable input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }
}

impl InputDevice for CpalInput {
    fn start(&mut self, block_size: usize, on_block: BlockCallback) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels.max(1));
        let mut framer = BlockFramer::new(block_size, on_block);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    framer.push_interleaved(data, channels);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(block_size, "audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Groups arbitrary-sized device callbacks into fixed-size mono blocks
pub struct BlockFramer {
    block_size: usize,
    pending: Vec<f32>,
    on_block: BlockCallback,
}

impl BlockFramer {
    /// Create a framer emitting blocks of `block_size` samples
    #[must_use]
    pub fn new(block_size: usize, on_block: BlockCallback) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
            on_block,
        }
    }

    /// Push interleaved samples, averaging channels down to mono
    #[allow(clippy::cast_precision_loss)]
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        if channels <= 1 {
            self.push_mono(data);
            return;
        }
        for frame in data.chunks(channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            self.push_sample(mono);
        }
    }

    /// Push mono samples
    pub fn push_mono(&mut self, data: &[f32]) {
        for &sample in data {
            self.push_sample(sample);
        }
    }

    fn push_sample(&mut self, sample: f32) {
        self.pending.push(sample);
        if self.pending.len() == self.block_size {
            let block = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
            (self.on_block)(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn collecting_framer(block_size: usize) -> (BlockFramer, Arc<Mutex<Vec<Vec<f32>>>>) {
        let blocks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&blocks);
        let framer = BlockFramer::new(
            block_size,
            Box::new(move |block: Vec<f32>| sink.lock().unwrap().push(block)),
        );
        (framer, blocks)
    }

    #[test]
    fn test_blocks_have_fixed_size() {
        let (mut framer, blocks) = collecting_framer(4);

        framer.push_mono(&[0.1, 0.2, 0.3]);
        assert!(blocks.lock().unwrap().is_empty());

        framer.push_mono(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        let blocks = blocks.lock().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(blocks[1], vec![0.5, 0.6, 0.7, 0.8]);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let (mut framer, blocks) = collecting_framer(2);

        framer.push_interleaved(&[0.2, 0.4, -1.0, 1.0], 2);

        let blocks = blocks.lock().unwrap();
        assert_eq!(blocks.len(), 1);
        assert!((blocks[0][0] - 0.3).abs() < 1e-6);
        assert!(blocks[0][1].abs() < 1e-6);
    }
}
