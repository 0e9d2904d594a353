//! Microphone capture for the local platform adapter.
//!
//! Captures at the device's native configuration, then converts to the
//! relay wire format: 20ms frames of 48kHz stereo 16-bit PCM.

use crate::audio::frame::{self, FrameChunker};
use crate::config::AudioConfig;
use crate::error::{RelayError, Result};
use crate::pipeline::messages::{Frame, SpeakerId};
use crate::platform::FrameSink;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Audio capture from the system microphone via cpal.
///
/// All captured audio is attributed to a single fixed speaker id — the
/// local adapter has exactly one participant.
pub struct LocalCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    speaker: SpeakerId,
}

impl LocalCapture {
    /// Create a new capture instance for the given speaker id.
    ///
    /// Uses the device's default configuration for maximum compatibility;
    /// conversion to the wire format happens in software.
    ///
    /// # Errors
    ///
    /// Returns an error if no input device is available.
    pub fn new(config: &AudioConfig, speaker: SpeakerId) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| RelayError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| RelayError::Audio(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| RelayError::Audio("no default input device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        // Use the device's default config for best compatibility
        let default_config = device
            .default_input_config()
            .map_err(|e| RelayError::Audio(format!("no default input config: {e}")))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();

        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            "native input config: {}Hz, {} channels",
            native_rate, native_channels
        );

        if native_rate != frame::SAMPLE_RATE {
            info!(
                "will resample from {}Hz to {}Hz",
                native_rate,
                frame::SAMPLE_RATE
            );
        }

        Ok(Self {
            device,
            stream_config,
            speaker,
        })
    }

    /// Run the capture loop, delivering wire frames to the sink.
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio stream cannot be created.
    pub async fn run(&self, sink: FrameSink, cancel: CancellationToken) -> Result<()> {
        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let speaker = self.speaker;
        let mut chunker = FrameChunker::new();

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    // Mix down, resample to 48kHz, then duplicate to stereo i16
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };

                    let wire = if native_rate != frame::SAMPLE_RATE {
                        frame::resample_linear(&mono, native_rate, frame::SAMPLE_RATE)
                    } else {
                        mono
                    };

                    let mut interleaved = Vec::with_capacity(wire.len() * 2);
                    for s in &wire {
                        let v = frame::f32_to_i16(*s);
                        interleaved.push(v);
                        interleaved.push(v);
                    }

                    // deliver() never blocks the audio thread
                    for pcm in chunker.push(&interleaved) {
                        sink.deliver(Frame {
                            speaker,
                            pcm,
                            captured_at: Instant::now(),
                        });
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| RelayError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| RelayError::Audio(format!("failed to start input stream: {e}")))?;

        info!(
            "audio capture started: native {}Hz -> wire {}Hz",
            native_rate,
            frame::SAMPLE_RATE
        );

        // Hold the stream alive until cancelled
        cancel.cancelled().await;

        drop(stream);
        info!("audio capture stopped");
        Ok(())
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| RelayError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}
