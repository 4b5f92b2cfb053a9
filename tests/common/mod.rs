//! Shared test utilities
//!
//! Mock collaborators for the orchestrator and playback engine. Anything
//! with a [`Gate`] blocks inside its async call until the test opens it, so
//! tests can act while a request is in flight.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Semaphore, oneshot};

use webvoice::acquisition::{Acquisition, ContentRetriever};
use webvoice::generator::{GeneratedReply, GenerationRequest, RawCitation, ResponseBackend, TurnGenerator};
use webvoice::voice::{AudioOutput, DeviceEvent, PcmBuffer, PlaybackEngine, SpeechSynthesizer};
use webvoice::{Orchestrator, Result};

/// Text of the page used throughout the tests
pub const EXAMPLE_TEXT: &str = "Example Domain This domain is for use in illustrative examples in documents.";

/// Holds async calls until released
pub struct Gate {
    entered: Semaphore,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }

    /// Called by a mock: signal arrival, then wait to be released
    pub async fn pass(&self) {
        self.entered.add_permits(1);
        self.release
            .acquire()
            .await
            .expect("gate closed")
            .forget();
    }

    /// Wait until one call has arrived at the gate
    pub async fn entered(&self) {
        self.entered
            .acquire()
            .await
            .expect("gate closed")
            .forget();
    }

    /// Release `n` waiting (or future) calls
    pub fn open(&self, n: usize) {
        self.release.add_permits(n);
    }
}

/// Retriever returning a fixed acquisition
pub struct StaticRetriever {
    result: Acquisition,
    gate: Option<Arc<Gate>>,
    pub calls: AtomicUsize,
}

impl StaticRetriever {
    pub fn page(content: &str, title: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Acquisition::success(content, title),
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unreachable(url: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Acquisition::failed(url),
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn gated(content: &str, title: &str, gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            result: Acquisition::success(content, title),
            gate: Some(gate),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ContentRetriever for StaticRetriever {
    async fn acquire(&self, _url: &str) -> Acquisition {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        self.result.clone()
    }
}

/// Backend answering from a script; replies "ok" once the script runs out
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<GeneratedReply>>>,
    gate: Option<Arc<Gate>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<GeneratedReply>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    pub fn gated(script: Vec<Result<GeneratedReply>>, gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ResponseBackend for ScriptedBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedReply> {
        self.requests.lock().unwrap().push(request);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(reply("ok", vec![])))
    }
}

/// Build a backend reply
pub fn reply(text: &str, citations: Vec<RawCitation>) -> GeneratedReply {
    GeneratedReply {
        text: Some(text.to_string()),
        citations,
    }
}

pub fn cite(uri: Option<&str>, title: Option<&str>) -> RawCitation {
    RawCitation {
        uri: uri.map(str::to_string),
        title: title.map(str::to_string),
    }
}

/// Synthesizer returning a short fixed clip for any text
#[derive(Default)]
pub struct RecordingSynth {
    gate: Option<Arc<Gate>>,
    pub spoken: Mutex<Vec<String>>,
}

impl RecordingSynth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated(gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynth {
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>> {
        self.spoken.lock().unwrap().push(text.to_string());
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        // 0.0, -1.0, ~1.0
        Ok(Some(vec![0x00, 0x00, 0x00, 0x80, 0xFF, 0x7F]))
    }
}

/// Output device whose renderings end only when the test says so
#[derive(Default)]
pub struct ManualOutput {
    pending: Mutex<Vec<oneshot::Sender<DeviceEvent>>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl ManualOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Take the completion sender of the `n`th rendering (in start order)
    ///
    /// Already-taken entries stay in place so indexes are stable.
    pub fn take(&self, n: usize) -> oneshot::Sender<DeviceEvent> {
        let mut pending = self.pending.lock().unwrap();
        let (placeholder, _) = oneshot::channel();
        std::mem::replace(&mut pending[n], placeholder)
    }

    /// Finish the `n`th rendering naturally
    pub fn complete(&self, n: usize) {
        let _ = self.take(n).send(DeviceEvent::Completed);
    }
}

impl AudioOutput for ManualOutput {
    fn start(&self, _buffer: PcmBuffer) -> Result<oneshot::Receiver<DeviceEvent>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push(tx);
        Ok(rx)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// An orchestrator wired to mocks
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub retriever: Arc<StaticRetriever>,
    pub backend: Arc<ScriptedBackend>,
    pub synth: Arc<RecordingSynth>,
    pub output: Arc<ManualOutput>,
}

impl Harness {
    pub fn new(retriever: Arc<StaticRetriever>, backend: Arc<ScriptedBackend>) -> Self {
        let synth = RecordingSynth::new();
        let output = ManualOutput::new();
        let playback = PlaybackEngine::new(synth.clone(), output.clone());
        let orchestrator = Orchestrator::new(retriever.clone(), TurnGenerator::new(backend.clone()), playback);

        Self {
            orchestrator,
            retriever,
            backend,
            synth,
            output,
        }
    }

    /// The "Example Domain" page with a backend replying from `script`
    pub fn example(script: Vec<Result<GeneratedReply>>) -> Self {
        Self::new(
            StaticRetriever::page(EXAMPLE_TEXT, "Example Domain"),
            ScriptedBackend::new(script),
        )
    }
}
