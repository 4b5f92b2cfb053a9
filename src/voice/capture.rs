//! Microphone input at the speech sample rate

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for speech capture and transcription uploads
pub const SAMPLE_RATE: u32 = 16_000;

/// The default input device, recording only while a listening session runs
pub struct Microphone {
    device: Device,
    config: StreamConfig,
    pending: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl Microphone {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if there is no input device or it cannot record
    /// 32-bit float samples at 16 kHz
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;
        let config = speech_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            pending: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start recording; samples left from an earlier session are dropped
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn resume(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        lock(&self.pending).clear();
        let pending = Arc::clone(&self.pending);
        let channels = usize::from(self.config.channels);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    append_mono(&mut lock(&pending), data, channels);
                },
                |err| tracing::warn!(error = %err, "microphone stream error"),
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("microphone recording");
        Ok(())
    }

    /// Stop recording; no-op when already paused
    pub fn pause(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("microphone paused");
        }
    }

    /// Take the mono samples recorded since the last call
    #[must_use]
    pub fn drain(&self) -> Vec<f32> {
        std::mem::take(&mut *lock(&self.pending))
    }
}

fn lock(pending: &Mutex<Vec<f32>>) -> MutexGuard<'_, Vec<f32>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pick the input configuration with the fewest channels that records
/// `f32` at [`SAMPLE_RATE`]
fn speech_config(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(SAMPLE_RATE);

    device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| {
            c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        })
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .map(|c| c.with_sample_rate(rate).config())
        .ok_or_else(|| Error::Audio("input device cannot record at 16 kHz".to_string()))
}

/// Append interleaved frames to `out`, averaging channels down to mono
fn append_mono(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }

    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

/// Encode mono samples as a 16-bit WAV file at [`SAMPLE_RATE`]
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn encode_wav(samples: &[f32]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

    for &sample in samples {
        writer
            .write_sample(quantize(sample))
            .map_err(|e| Error::Audio(e.to_string()))?;
    }
    writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(cursor.into_inner())
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
