//! Voice processing module
//!
//! Handles PCM conversion for the streaming API, microphone capture in fixed
//! blocks, level metering, and scheduled playback.

mod capture;
pub mod codec;
mod device;
pub mod level;
mod playback;

use async_trait::async_trait;

pub use capture::{BlockFramer, CpalInput};
pub use codec::{
    EncodedFrame, FRAME_SIZE, INPUT_MIME_TYPE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, PcmBuffer,
};
pub use device::{AudioBackend, BlockCallback, InputDevice, OutputDevice};
pub use playback::{CpalOutput, Timeline};

use crate::Result;

/// Audio backend using the host's default cpal devices
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

#[async_trait(?Send)]
impl AudioBackend for CpalBackend {
    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn OutputDevice>> {
        Ok(Box::new(CpalOutput::open(sample_rate)?))
    }

    async fn open_input(&self, sample_rate: u32) -> Result<Box<dyn InputDevice>> {
        Ok(Box::new(CpalInput::open(sample_rate)?))
    }
}
