//! Shared test utilities

#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use mentor_live::live::{Link, LinkRemote, ServerMessage, link_pair};
use mentor_live::voice::{BlockCallback, InputDevice, OutputDevice, PcmBuffer};
use mentor_live::{AudioBackend, Connector, Error, LiveEvent, Result, SessionSetup, Status};

/// How long a test waits for the controller before failing
pub const PATIENCE: Duration = Duration::from_secs(2);

/// Observations shared between the fakes and the test body
#[derive(Default)]
pub struct Recorder {
    /// Playback clock reported by the fake output
    pub clock: Mutex<f64>,
    /// `(start, samples)` of every scheduled buffer
    pub scheduled: Mutex<Vec<(f64, usize)>>,
    /// Capture callback while the fake microphone is running
    pub capture: Mutex<Option<BlockCallback>>,
    /// Setups passed to the connector
    pub setups: Mutex<Vec<SessionSetup>>,
    pub inputs_stopped: AtomicUsize,
    pub inputs_dropped: AtomicUsize,
    pub outputs_closed: AtomicUsize,
}

impl Recorder {
    /// Deliver one block as if the microphone produced it
    ///
    /// Returns false if capture is not running.
    pub fn push_block(&self, block: Vec<f32>) -> bool {
        match self.capture.lock().unwrap().as_mut() {
            Some(on_block) => {
                on_block(block);
                true
            }
            None => false,
        }
    }

    pub fn set_clock(&self, seconds: f64) {
        *self.clock.lock().unwrap() = seconds;
    }

    pub fn scheduled(&self) -> Vec<(f64, usize)> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// In-memory audio backend
pub struct FakeBackend {
    pub recorder: Arc<Recorder>,
    pub deny_mic: bool,
}

#[async_trait(?Send)]
impl AudioBackend for FakeBackend {
    fn open_output(&self, _sample_rate: u32) -> Result<Box<dyn OutputDevice>> {
        Ok(Box::new(FakeOutput {
            recorder: Arc::clone(&self.recorder),
        }))
    }

    async fn open_input(&self, _sample_rate: u32) -> Result<Box<dyn InputDevice>> {
        if self.deny_mic {
            return Err(Error::Device("permission denied".to_string()));
        }
        Ok(Box::new(FakeInput {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct FakeInput {
    recorder: Arc<Recorder>,
}

impl InputDevice for FakeInput {
    fn start(&mut self, _block_size: usize, on_block: BlockCallback) -> Result<()> {
        *self.recorder.capture.lock().unwrap() = Some(on_block);
        Ok(())
    }

    fn stop(&mut self) {
        self.recorder.capture.lock().unwrap().take();
        self.recorder.inputs_stopped.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeInput {
    fn drop(&mut self) {
        self.recorder.inputs_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeOutput {
    recorder: Arc<Recorder>,
}

impl OutputDevice for FakeOutput {
    fn current_time(&self) -> f64 {
        *self.recorder.clock.lock().unwrap()
    }

    fn schedule(&mut self, earliest: f64, buffer: PcmBuffer) -> f64 {
        let start = earliest.max(self.current_time());
        self.recorder.scheduled.lock().unwrap().push((start, buffer.len()));
        start
    }

    fn close(&mut self) {
        self.recorder.outputs_closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector handing the remote end of every opened link to the test
pub struct FakeConnector {
    pub recorder: Arc<Recorder>,
    pub remotes: mpsc::UnboundedSender<LinkRemote>,
    /// Held open until the test releases it
    pub gate: RefCell<Option<oneshot::Receiver<()>>>,
    /// Refuse every session with this reason
    pub refuse: Option<String>,
}

#[async_trait(?Send)]
impl Connector for FakeConnector {
    async fn open(&self, setup: &SessionSetup) -> Result<Link> {
        self.recorder.setups.lock().unwrap().push(setup.clone());

        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            gate.await
                .map_err(|_| Error::Session("gate dropped".to_string()))?;
        }
        if let Some(reason) = &self.refuse {
            return Err(Error::Session(reason.clone()));
        }

        let (link, remote) = link_pair(8);
        self.remotes.send(remote).ok();
        Ok(link)
    }
}

/// Fakes plus the handles a test needs to drive them
pub struct Rig {
    pub recorder: Arc<Recorder>,
    pub backend: FakeBackend,
    pub connector: FakeConnector,
    pub remotes: mpsc::UnboundedReceiver<LinkRemote>,
    pub gate: Option<oneshot::Sender<()>>,
}

impl Rig {
    /// Working microphone and a connector that opens immediately
    pub fn new() -> Self {
        let recorder = Arc::new(Recorder::default());
        let (remotes_tx, remotes) = mpsc::unbounded_channel();
        Self {
            backend: FakeBackend {
                recorder: Arc::clone(&recorder),
                deny_mic: false,
            },
            connector: FakeConnector {
                recorder: Arc::clone(&recorder),
                remotes: remotes_tx,
                gate: RefCell::new(None),
                refuse: None,
            },
            recorder,
            remotes,
            gate: None,
        }
    }

    /// Microphone access is refused
    pub fn deny_mic(mut self) -> Self {
        self.backend.deny_mic = true;
        self
    }

    /// The first session open waits for [`Rig::gate`] to fire
    pub fn gated(mut self) -> Self {
        let (tx, rx) = oneshot::channel();
        *self.connector.gate.borrow_mut() = Some(rx);
        self.gate = Some(tx);
        self
    }

    /// The remote side refuses every session
    pub fn refusing(mut self, reason: &str) -> Self {
        self.connector.refuse = Some(reason.to_string());
        self
    }
}

pub fn setup() -> SessionSetup {
    SessionSetup::audio("test-live-model", "Be a mentor. You are speaking to the student now.", "Kore")
}

/// Next status event, skipping level updates
pub async fn next_status(events: &mut mpsc::UnboundedReceiver<LiveEvent>) -> Status {
    tokio::time::timeout(PATIENCE, async {
        loop {
            match events.recv().await {
                Some(LiveEvent::Status(status)) => return status,
                Some(LiveEvent::Level(_)) => {}
                None => panic!("controller stopped"),
            }
        }
    })
    .await
    .expect("timed out waiting for status")
}

/// Next level event, skipping status updates
pub async fn next_level(events: &mut mpsc::UnboundedReceiver<LiveEvent>) -> f32 {
    tokio::time::timeout(PATIENCE, async {
        loop {
            match events.recv().await {
                Some(LiveEvent::Level(level)) => return level,
                Some(LiveEvent::Status(_)) => {}
                None => panic!("controller stopped"),
            }
        }
    })
    .await
    .expect("timed out waiting for level")
}

/// Yield until `condition` holds
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(PATIENCE, async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

/// Server message carrying one inline audio part per entry of `chunks`
pub fn audio_message(chunks: &[(&str, &str)]) -> Box<ServerMessage> {
    let parts: Vec<serde_json::Value> = chunks
        .iter()
        .map(|(mime_type, data)| {
            serde_json::json!({ "inlineData": { "mimeType": mime_type, "data": data } })
        })
        .collect();
    let value = serde_json::json!({ "serverContent": { "modelTurn": { "role": "model", "parts": parts } } });
    Box::new(ServerMessage::parse(value.to_string().as_bytes()).unwrap())
}
