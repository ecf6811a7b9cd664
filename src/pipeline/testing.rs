//! In-memory fakes for running whole calls in tests.

use crate::audio::container::wrap_wav;
use crate::audio::{AudioFrame, AudioParams, Transcoder};
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::generation::TextGenerator;
use crate::pipeline::{AudioSink, CallSession, PipelineServices, TurnSettings};
use crate::recognition::{
    RecognitionEvent, RecognitionProvider, RecognitionSession, RecognitionStream,
};
use crate::state::SharedMetrics;
use crate::synthesis::{SpeechSynthesizer, SynthesizedAudio, VoiceConfig};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify, Semaphore};

pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't process that request.";

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Recognition provider that records writes and lets tests inject results.
pub struct FakeRecognizer {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<AtomicUsize>,
    events: Mutex<Option<mpsc::Sender<RecognitionEvent>>>,
    refuse: AtomicBool,
    failing_writes: Arc<AtomicBool>,
    open_delay: Mutex<Duration>,
    blocked: watch::Sender<bool>,
}

impl FakeRecognizer {
    pub fn new() -> Self {
        Self {
            writes: Arc::default(),
            closes: Arc::default(),
            events: Mutex::new(None),
            refuse: AtomicBool::new(false),
            failing_writes: Arc::default(),
            open_delay: Mutex::default(),
            blocked: watch::channel(false).0,
        }
    }

    fn sender(&self) -> mpsc::Sender<RecognitionEvent> {
        self.events
            .lock()
            .unwrap()
            .clone()
            .expect("recognition stream not opened")
    }

    pub async fn emit(&self, text: &str, is_final: bool) {
        self.sender()
            .send(RecognitionEvent::Result {
                text: text.to_string(),
                is_final,
            })
            .await
            .unwrap();
    }

    pub async fn fail(&self, err: PipelineError) {
        self.sender()
            .send(RecognitionEvent::Failed(err))
            .await
            .unwrap();
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn refuse_open(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Make `open` take this long, like a slow upstream handshake.
    pub fn delay_open(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = delay;
    }

    /// Make every later write fail as if the upstream socket dropped.
    pub fn fail_writes(&self) {
        self.failing_writes.store(true, Ordering::SeqCst);
    }

    pub fn block_writes(&self) {
        self.blocked.send_replace(true);
    }

    pub fn unblock_writes(&self) {
        self.blocked.send_replace(false);
    }
}

#[async_trait]
impl RecognitionProvider for FakeRecognizer {
    async fn open(&self, params: AudioParams) -> Result<RecognitionSession, PipelineError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(PipelineError::RecognitionFailure(
                "connection refused".to_string(),
            ));
        }
        assert_eq!(params, AudioParams::TELEPHONY);
        let delay = *self.open_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (tx, rx) = mpsc::channel(16);
        *self.events.lock().unwrap() = Some(tx);

        Ok(RecognitionSession {
            writer: Box::new(FakeStream {
                writes: self.writes.clone(),
                closes: self.closes.clone(),
                failing: self.failing_writes.clone(),
                blocked: self.blocked.subscribe(),
            }),
            events: rx,
        })
    }
}

struct FakeStream {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    blocked: watch::Receiver<bool>,
}

#[async_trait]
impl RecognitionStream for FakeStream {
    async fn write(&mut self, frame: AudioFrame) -> Result<(), PipelineError> {
        let _ = self.blocked.wait_for(|blocked| !*blocked).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(PipelineError::RecognitionFailure("write failed".to_string()));
        }
        self.writes.lock().unwrap().push(frame.into_bytes());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Generator that replays scripted results, then echoes `re: <text>`.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, PipelineError>>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
    entered: Notify,
}

impl ScriptedGenerator {
    pub fn echo() -> Self {
        Self::replies(Vec::new())
    }

    pub fn replies(replies: Vec<Result<String, PipelineError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::default(),
            gate: None,
            entered: Notify::new(),
        }
    }

    /// Hold every call until `release` hands out a permit.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    /// Resolves once a call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _system_prompt: &str, user_text: &str) -> Result<String, PipelineError> {
        self.calls.lock().unwrap().push(user_text.to_string());
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let scripted = self.replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(format!("re: {}", user_text)))
    }
}

/// Synthesizer whose sample payload is the reply text itself.
pub struct FakeSynthesizer {
    header_len: usize,
    failures_left: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl FakeSynthesizer {
    pub fn new() -> Self {
        Self::with_header_len(44)
    }

    /// Produce a container with a header of `header_len` bytes.
    pub fn with_header_len(header_len: usize) -> Self {
        Self {
            header_len,
            failures_left: AtomicUsize::new(0),
            texts: Mutex::default(),
        }
    }

    pub fn failing_first(failures: usize) -> Self {
        let synthesizer = Self::new();
        synthesizer.failures_left.store(failures, Ordering::SeqCst);
        synthesizer
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceConfig,
    ) -> Result<SynthesizedAudio, PipelineError> {
        self.texts.lock().unwrap().push(text.to_string());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PipelineError::SynthesisFailure("service unavailable".to_string()));
        }

        if self.header_len == 44 {
            return SynthesizedAudio::from_wav(wrap_wav(&AudioParams::TELEPHONY, text.as_bytes()));
        }
        let mut bytes = vec![0u8; self.header_len];
        bytes.extend_from_slice(text.as_bytes());
        Ok(SynthesizedAudio::new(bytes, self.header_len, AudioParams::TELEPHONY))
    }
}

/// Sink that keeps every payload in order.
pub struct CollectingSink {
    sent: Mutex<Vec<Vec<u8>>>,
    hang_ups: AtomicUsize,
    broken: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            sent: Mutex::default(),
            hang_ups: AtomicUsize::new(0),
            broken: false,
        }
    }

    /// A sink whose connection is already gone.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn hang_ups(&self) -> usize {
        self.hang_ups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for CollectingSink {
    async fn send_audio(&self, payload: Vec<u8>) -> Result<(), PipelineError> {
        if self.broken {
            return Err(PipelineError::TransportError("socket closed".to_string()));
        }
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }

    fn hang_up(&self) {
        self.hang_ups.fetch_add(1, Ordering::SeqCst);
    }
}

/// One fake of each collaborator, wired into `PipelineServices`.
pub struct Harness {
    pub recognizer: Arc<FakeRecognizer>,
    pub generator: Arc<ScriptedGenerator>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub sink: Arc<CollectingSink>,
    pub metrics: SharedMetrics,
    queue_capacity: usize,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            recognizer: Arc::new(FakeRecognizer::new()),
            generator: Arc::new(ScriptedGenerator::echo()),
            synthesizer: Arc::new(FakeSynthesizer::new()),
            sink: Arc::new(CollectingSink::new()),
            metrics: SharedMetrics::default(),
            queue_capacity: 64,
        }
    }

    pub fn with_generator(mut self, generator: ScriptedGenerator) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: FakeSynthesizer) -> Self {
        self.synthesizer = Arc::new(synthesizer);
        self
    }

    pub fn with_sink(mut self, sink: CollectingSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_blocked_writes(self) -> Self {
        self.recognizer.block_writes();
        self
    }

    pub fn services(&self) -> PipelineServices {
        PipelineServices {
            recognizer: self.recognizer.clone(),
            generator: self.generator.clone(),
            synthesizer: self.synthesizer.clone(),
            transcoder: Transcoder::new(44, AudioParams::TELEPHONY),
            turns: Arc::new(TurnSettings {
                system_prompt: "You are a test receptionist.".to_string(),
                fallback_reply: FALLBACK_REPLY.to_string(),
                voice: VoiceConfig::from_config(&AppConfig::default().synthesis),
            }),
            frame_queue_capacity: self.queue_capacity,
            capture: None,
            metrics: self.metrics.clone(),
        }
    }

    pub async fn open(&self) -> CallSession {
        CallSession::open(&self.services(), self.sink.clone())
            .await
            .unwrap()
    }
}
