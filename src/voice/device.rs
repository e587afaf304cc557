//! Audio device abstraction
//!
//! The live controller talks to hardware only through these traits so that a
//! session can run against cpal devices or in-memory fakes.

use async_trait::async_trait;

use super::codec::PcmBuffer;
use crate::Result;

/// Receives fixed-size mono capture blocks, called on the audio thread
pub type BlockCallback = Box<dyn FnMut(Vec<f32>) + Send + 'static>;

/// Source of capture and playback devices
#[async_trait(?Send)]
pub trait AudioBackend {
    /// Open the playback device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device exists
    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn OutputDevice>>;

    /// Acquire the microphone at `sample_rate`
    ///
    /// This is the permission step of a connect and may suspend.
    ///
    /// # Errors
    ///
    /// Returns error if the microphone is unavailable or access is denied
    async fn open_input(&self, sample_rate: u32) -> Result<Box<dyn InputDevice>>;
}

/// An acquired microphone
pub trait InputDevice {
    /// Start delivering blocks of `block_size` samples to `on_block`
    ///
    /// # Errors
    ///
    /// Returns error if the capture stream cannot be started
    fn start(&mut self, block_size: usize, on_block: BlockCallback) -> Result<()>;

    /// Stop capturing and release the stream
    fn stop(&mut self);
}

/// An open playback device with its own clock
pub trait OutputDevice {
    /// Playback clock in seconds since the device was opened
    fn current_time(&self) -> f64;

    /// Queue `buffer` to start no earlier than `earliest` seconds on the playback clock
    ///
    /// The device pushes the start past its clock and past anything already
    /// queued in one step. Returns the start actually used.
    fn schedule(&mut self, earliest: f64, buffer: PcmBuffer) -> f64;

    /// Stop playback and drop anything still queued
    fn close(&mut self);
}
