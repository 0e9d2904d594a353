//! Relay facade: sessions, commands, and the wiring between them.
//!
//! Owns the conversation store, the session registry, and the turn
//! pipeline, and exposes the verbs a host (CLI, chat-service adapter)
//! drives: join/leave a voice channel, toggle auto-speak, speak on
//! demand, and feed text messages into the shared conversation.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::events::RelayEvent;
use crate::history::{ConversationStore, ConversationTurn};
use crate::llm::DialogueModel;
use crate::pipeline::messages::{ChannelId, SessionId};
use crate::pipeline::router::{FRAME_CHANNEL_SIZE, run_frame_router};
use crate::pipeline::turn::TurnPipeline;
use crate::platform::{FrameSink, TextSink, VoiceChannelId, VoiceConnector};
use crate::playback::{PlaybackSequencer, SpeakOutcome};
use crate::session::{SessionRegistry, VoiceSession};
use crate::stt::Transcriber;
use crate::tts::SpeechSynthesizer;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

const EVENT_CHANNEL_SIZE: usize = 64;

/// The conversational voice relay.
pub struct Relay {
    config: RelayConfig,
    connector: Arc<dyn VoiceConnector>,
    registry: SessionRegistry,
    store: Arc<ConversationStore>,
    pipeline: Arc<TurnPipeline>,
    sequencer: Arc<PlaybackSequencer>,
    events: broadcast::Sender<RelayEvent>,
}

impl Relay {
    /// Assemble a relay from its collaborators.
    pub fn new(
        config: RelayConfig,
        connector: Arc<dyn VoiceConnector>,
        text: Arc<dyn TextSink>,
        transcriber: Arc<dyn Transcriber>,
        model: Arc<dyn DialogueModel>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let store = Arc::new(ConversationStore::new(config.history.max_turns));
        let sequencer = Arc::new(
            PlaybackSequencer::new(synthesizer, &config.tts).with_events(events.clone()),
        );
        let pipeline = Arc::new(
            TurnPipeline::new(
                transcriber,
                model,
                Arc::clone(&sequencer),
                Arc::clone(&store),
                text,
                &config,
            )
            .with_events(events.clone()),
        );

        Self {
            config,
            connector,
            registry: SessionRegistry::new(),
            store,
            pipeline,
            sequencer,
            events,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Subscribe to relay events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Join a voice channel and start routing its frames.
    ///
    /// Joining while the session is already open moves it: the prior
    /// session's segmentation stops and its per-speaker state is dropped
    /// before the new one starts, reusing the platform connection.
    ///
    /// # Errors
    ///
    /// `RelayError::Session` when the platform refuses the connect or
    /// move, `RelayError::Audio` when capture cannot start.
    pub async fn join(
        &self,
        session_id: SessionId,
        voice_channel: VoiceChannelId,
        text_channel: ChannelId,
    ) -> Result<Arc<VoiceSession>> {
        let session = if let Some(existing) = self.registry.get(session_id) {
            info!("moving session {session_id} to voice channel {voice_channel}");
            let connection = Arc::clone(existing.connection());
            connection
                .move_to(voice_channel)
                .await
                .map_err(|e| RelayError::Session(format!("failed to move voice channel: {e}")))?;
            let session = VoiceSession::new(session_id, voice_channel, text_channel, connection);
            self.registry.replace(Arc::clone(&session));
            session
        } else {
            let connection = self
                .connector
                .connect(voice_channel)
                .await
                .map_err(|e| RelayError::Session(format!("failed to join voice channel: {e}")))?;
            let session = VoiceSession::new(session_id, voice_channel, text_channel, connection);
            self.registry.open(Arc::clone(&session))?;
            session
        };

        if let Err(e) = self.start_routing(&session) {
            if let Some(stale) = self.registry.close(session_id) {
                let _ = stale.connection().disconnect().await;
            }
            return Err(e);
        }

        let _ = self.events.send(RelayEvent::SessionOpened {
            session: session_id,
            channel: voice_channel,
        });
        Ok(session)
    }

    /// Leave the session's voice channel. A no-op when nothing is open.
    pub async fn leave(&self, session_id: SessionId) {
        if let Some(session) = self.registry.close(session_id) {
            if let Err(e) = session.connection().disconnect().await {
                warn!("disconnect failed for session {session_id}: {e}");
            }
            let _ = self.events.send(RelayEvent::SessionClosed {
                session: session_id,
            });
        }
    }

    /// Toggle whether replies are spoken back into the voice channel.
    ///
    /// # Errors
    ///
    /// `RelayError::NoSession` when the session is not open.
    pub fn set_auto_speak(&self, session_id: SessionId, enabled: bool) -> Result<()> {
        let session = self
            .registry
            .get(session_id)
            .ok_or(RelayError::NoSession(session_id))?;
        session.set_auto_speak(enabled);
        Ok(())
    }

    /// Speak `text` on the session's voice connection.
    ///
    /// # Errors
    ///
    /// `RelayError::NoSession` when the session is not open; otherwise
    /// the playback sequencer's errors pass through.
    pub async fn speak(&self, session_id: SessionId, text: &str) -> Result<SpeakOutcome> {
        let session = self
            .registry
            .get(session_id)
            .ok_or(RelayError::NoSession(session_id))?;
        self.sequencer.speak(&session, text).await
    }

    /// Run a text message through the conversation pipeline.
    pub async fn handle_text(&self, channel: ChannelId, text: &str) {
        self.pipeline.run_text_turn(channel, text).await;
    }

    /// Snapshot of a channel's conversation, oldest first.
    pub fn conversation(&self, channel: ChannelId) -> Vec<ConversationTurn> {
        self.store.snapshot(channel)
    }

    /// Close every open session and disconnect.
    pub async fn shutdown(&self) {
        for id in self.registry.open_ids() {
            self.leave(id).await;
        }
    }

    fn start_routing(&self, session: &Arc<VoiceSession>) -> Result<()> {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_SIZE);
        session
            .connection()
            .start_capture(FrameSink::new(frame_tx))
            .map_err(|e| RelayError::Audio(format!("failed to start capture: {e}")))?;
        tokio::spawn(run_frame_router(
            Arc::clone(session),
            Arc::clone(&self.pipeline),
            self.config.segmenter.clone(),
            frame_rx,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::platform::VoiceConnection;
    use crate::test_utils::{
        CountingSynth, FakeVoiceConnection, FixedModel, FixedTranscriber, RecordingSink,
        flat_frame,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeConnector {
        connections: Mutex<Vec<Arc<FakeVoiceConnection>>>,
    }

    #[async_trait]
    impl VoiceConnector for FakeConnector {
        async fn connect(
            &self,
            _channel: VoiceChannelId,
        ) -> anyhow::Result<Arc<dyn VoiceConnection>> {
            let conn = Arc::new(FakeVoiceConnection::default());
            self.connections.lock().unwrap().push(Arc::clone(&conn));
            Ok(conn)
        }
    }

    fn relay() -> (Relay, Arc<FakeConnector>, Arc<RecordingSink>) {
        let connector = Arc::new(FakeConnector::default());
        let sink = Arc::new(RecordingSink::default());
        let relay = Relay::new(
            RelayConfig::default(),
            connector.clone(),
            sink.clone(),
            Arc::new(FixedTranscriber::hears("hello")),
            Arc::new(FixedModel::replies("hi there")),
            Arc::new(CountingSynth::default()),
        );
        (relay, connector, sink)
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 2s");
    }

    #[tokio::test]
    async fn join_then_leave_lifecycle() {
        let (relay, _, _) = relay();
        let mut events = relay.subscribe();

        let session = relay.join(1, 10, 20).await.unwrap();
        assert_eq!(session.channel(), 10);
        assert!(matches!(
            events.recv().await.unwrap(),
            RelayEvent::SessionOpened {
                session: 1,
                channel: 10
            }
        ));

        relay.leave(1).await;
        assert!(session.cancel_token().is_cancelled());
        assert!(matches!(
            events.recv().await.unwrap(),
            RelayEvent::SessionClosed { session: 1 }
        ));

        // Leaving again is a no-op, not an error.
        relay.leave(1).await;
    }

    #[tokio::test]
    async fn joining_again_moves_the_session() {
        let (relay, connector, _) = relay();

        let first = relay.join(1, 10, 20).await.unwrap();
        let second = relay.join(1, 11, 20).await.unwrap();

        assert!(first.cancel_token().is_cancelled());
        assert!(!second.cancel_token().is_cancelled());
        assert_eq!(second.channel(), 11);
        // The platform connection was moved, not re-established.
        assert_eq!(connector.connections.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn auto_speak_requires_an_open_session() {
        let (relay, _, _) = relay();
        let err = relay.set_auto_speak(9, false).unwrap_err();
        assert!(matches!(err, RelayError::NoSession(9)));
    }

    #[tokio::test]
    async fn captured_frames_flow_to_the_text_channel() {
        let (relay, connector, sink) = relay();
        relay.join(1, 10, 20).await.unwrap();

        let conn = Arc::clone(&connector.connections.lock().unwrap()[0]);
        let frames = conn.sink();
        // Yield between frames so the router keeps pace with the sink.
        for _ in 0..30 {
            frames.deliver(flat_frame(7, 3000));
            tokio::task::yield_now().await;
        }
        for _ in 0..55 {
            frames.deliver(flat_frame(7, 0));
            tokio::task::yield_now().await;
        }

        wait_for(|| !sink.posts.lock().unwrap().is_empty()).await;
        assert_eq!(
            sink.posts.lock().unwrap()[0],
            (20, "user7: hello\nhi there".to_string())
        );
        assert_eq!(relay.conversation(20).len(), 2);
    }

    #[tokio::test]
    async fn text_messages_share_the_conversation() {
        let (relay, _, sink) = relay();

        relay.handle_text(42, "good morning").await;

        let turns = relay.conversation(42);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ConversationTurn::user("good morning"));
        assert_eq!(
            sink.posts.lock().unwrap().as_slice(),
            &[(42, "hi there".to_string())]
        );
    }
}
