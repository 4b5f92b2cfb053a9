//! Audio output device
//!
//! The `cpal` stream is not `Send`, so [`CpalOutput`] keeps the device and
//! the live stream on a dedicated audio thread and talks to it over a
//! channel. The thread is spawned on first use and lives as long as the
//! output; it is never recreated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::oneshot;

use super::pcm::PcmBuffer;
use crate::{Error, Result};

/// Terminal outcome of one device rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Every sample was handed to the device
    Completed,
    /// The device reported an error mid-stream
    Failed(String),
}

/// A device that renders PCM buffers
///
/// Each `start` replaces whatever was playing. The returned receiver yields
/// exactly one [`DeviceEvent`]; if the rendering is stopped or replaced the
/// sender is dropped instead.
pub trait AudioOutput: Send + Sync {
    /// Begin rendering `buffer`
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot accept the buffer
    fn start(&self, buffer: PcmBuffer) -> Result<oneshot::Receiver<DeviceEvent>>;

    /// Stop the current rendering
    ///
    /// Must be a no-op when nothing is playing and safe to call repeatedly.
    fn stop(&self);
}

enum Command {
    Play {
        buffer: PcmBuffer,
        done: oneshot::Sender<DeviceEvent>,
    },
    Stop,
}

/// Plays audio on the default output device
#[derive(Default)]
pub struct CpalOutput {
    commands: Mutex<Option<mpsc::Sender<Command>>>,
}

impl CpalOutput {
    /// Create an output; the device is opened on first playback
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self) -> Result<mpsc::Sender<Command>> {
        let mut guard = self.commands.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("webvoice-audio".to_string())
            .spawn(move || run_audio_thread(&rx))
            .map_err(|e| Error::Audio(format!("failed to spawn audio thread: {e}")))?;

        tracing::debug!("audio output thread started");
        *guard = Some(tx.clone());
        Ok(tx)
    }
}

impl AudioOutput for CpalOutput {
    fn start(&self, buffer: PcmBuffer) -> Result<oneshot::Receiver<DeviceEvent>> {
        let (done, rx) = oneshot::channel();
        self.sender()?
            .send(Command::Play { buffer, done })
            .map_err(|_| Error::Audio("audio thread has exited".to_string()))?;
        Ok(rx)
    }

    fn stop(&self) {
        let guard = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(Command::Stop);
        }
    }
}

/// A live stream and whether it has drained
struct ActiveStream {
    _stream: Stream,
    finished: Arc<AtomicBool>,
}

fn run_audio_thread(commands: &mpsc::Receiver<Command>) {
    let mut device: Option<(Device, StreamConfig)> = None;
    let mut current: Option<ActiveStream> = None;

    loop {
        match commands.recv_timeout(Duration::from_millis(100)) {
            Ok(Command::Play { buffer, done }) => {
                // Dropping the previous stream drops its completion sender
                current = None;

                if device.is_none() {
                    match open_device() {
                        Ok(opened) => device = Some(opened),
                        Err(e) => {
                            tracing::error!(error = %e, "failed to open output device");
                            let _ = done.send(DeviceEvent::Failed(e.to_string()));
                            continue;
                        }
                    }
                }

                let Some((dev, config)) = device.as_ref() else {
                    continue;
                };

                let done = Arc::new(Mutex::new(Some(done)));
                match play(dev, config, buffer, Arc::clone(&done)) {
                    Ok(stream) => current = Some(stream),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to start playback");
                        if let Some(tx) = done.lock().unwrap_or_else(PoisonError::into_inner).take() {
                            let _ = tx.send(DeviceEvent::Failed(e.to_string()));
                        }
                    }
                }
            }
            Ok(Command::Stop) => {
                if current.take().is_some() {
                    tracing::debug!("playback stopped");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if current
                    .as_ref()
                    .is_some_and(|s| s.finished.load(Ordering::Acquire))
                {
                    current = None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::debug!("audio output thread exiting");
}

/// Open the default output device with a 24 kHz configuration
fn open_device() -> Result<(Device, StreamConfig)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let rate = SampleRate(super::pcm::PLAYBACK_SAMPLE_RATE);
    let supports = |channels: u16| {
        move |c: &cpal::SupportedStreamConfigRange| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        }
    };

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(supports(1))
        .or_else(|| {
            // Fallback: stereo, mono samples duplicated
            device.supported_output_configs().ok()?.find(supports(2))
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config = supported_config.with_sample_rate(rate).config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = rate.0,
        channels = config.channels,
        "audio output initialized"
    );

    Ok((device, config))
}

type SharedDone = Arc<Mutex<Option<oneshot::Sender<DeviceEvent>>>>;

fn play(device: &Device, config: &StreamConfig, buffer: PcmBuffer, done: SharedDone) -> Result<ActiveStream> {
    let channels = usize::from(config.channels);
    let samples = buffer.samples;
    let mut position = 0usize;

    let finished = Arc::new(AtomicBool::new(false));
    let finished_cb = Arc::clone(&finished);
    let done_err = Arc::clone(&done);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(position).copied().unwrap_or(0.0);
                    frame.fill(sample);
                    position = position.saturating_add(1);
                }

                if position >= samples.len() && !finished_cb.swap(true, Ordering::AcqRel) {
                    if let Some(tx) = done.lock().unwrap_or_else(PoisonError::into_inner).take() {
                        let _ = tx.send(DeviceEvent::Completed);
                    }
                }
            },
            move |err| {
                tracing::error!(error = %err, "audio playback error");
                if let Some(tx) = done_err.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    let _ = tx.send(DeviceEvent::Failed(err.to_string()));
                }
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(ActiveStream {
        _stream: stream,
        finished,
    })
}
