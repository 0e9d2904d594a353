//! Local loopback platform: the sound card stands in for a voice channel.
//!
//! One participant (the person at the machine, speaker id 0), frames from
//! the microphone, replies rendered to the speakers, and text printed to
//! stdout. Lets the whole relay run without any chat service attached.

use crate::audio::capture::LocalCapture;
use crate::audio::playback::LocalPlayback;
use crate::config::AudioConfig;
use crate::pipeline::messages::{ChannelId, SpeakerId};
use crate::platform::{FrameSink, TextSink, VoiceChannelId, VoiceConnection, VoiceConnector};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The local participant's fixed speaker id.
pub const LOCAL_SPEAKER: SpeakerId = 0;

/// Connects the relay to the local sound card.
pub struct LocalPlatform {
    audio: AudioConfig,
}

impl LocalPlatform {
    pub fn new(audio: AudioConfig) -> Self {
        Self { audio }
    }
}

#[async_trait]
impl VoiceConnector for LocalPlatform {
    async fn connect(&self, channel: VoiceChannelId) -> anyhow::Result<Arc<dyn VoiceConnection>> {
        info!("local voice loop connected (channel {channel})");
        Ok(Arc::new(LocalConnection {
            audio: self.audio.clone(),
            playing: AtomicBool::new(false),
            capture_cancel: Mutex::new(None),
        }))
    }
}

/// One live loopback "connection": microphone in, speakers out.
struct LocalConnection {
    audio: AudioConfig,
    playing: AtomicBool,
    capture_cancel: Mutex<Option<CancellationToken>>,
}

#[async_trait]
impl VoiceConnection for LocalConnection {
    fn start_capture(&self, sink: FrameSink) -> anyhow::Result<()> {
        // Open the device here so a missing microphone fails the join
        // instead of dying quietly inside the capture task.
        let capture = LocalCapture::new(&self.audio, LOCAL_SPEAKER)?;
        let cancel = CancellationToken::new();
        {
            let mut slot = self
                .capture_cancel
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(prev) = slot.take() {
                prev.cancel();
            }
            *slot = Some(cancel.clone());
        }
        tokio::spawn(async move {
            if let Err(e) = capture.run(sink, cancel).await {
                error!("local capture stopped with error: {e}");
            }
        });
        Ok(())
    }

    fn stop_capture(&self) {
        let mut slot = self
            .capture_cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(cancel) = slot.take() {
            cancel.cancel();
        }
    }

    async fn move_to(&self, channel: VoiceChannelId) -> anyhow::Result<()> {
        // There is only one sound card; nothing to move.
        info!("local voice loop renumbered to channel {channel}");
        Ok(())
    }

    async fn play(&self, audio: Bytes) -> anyhow::Result<()> {
        self.playing.store(true, Ordering::SeqCst);
        let config = self.audio.clone();
        let result = tokio::task::spawn_blocking(move || -> crate::error::Result<()> {
            let playback = LocalPlayback::new(&config)?;
            playback.play_wav(&audio)
        })
        .await;
        self.playing.store(false, Ordering::SeqCst);
        result??;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn speaker_name(&self, speaker: SpeakerId) -> Option<String> {
        (speaker == LOCAL_SPEAKER).then(|| "you".to_string())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.stop_capture();
        info!("local voice loop disconnected");
        Ok(())
    }
}

/// Prints relay output to stdout, standing in for a chat text channel.
pub struct ConsoleSink;

#[async_trait]
impl TextSink for ConsoleSink {
    async fn send(&self, _channel: ChannelId, text: &str) -> anyhow::Result<()> {
        println!("{text}");
        Ok(())
    }
}
