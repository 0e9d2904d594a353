//! Voice session lifecycle and registry.
//!
//! A [`VoiceSession`] owns everything scoped to one live voice
//! connection: the platform handle, the bound text channel, the
//! per-speaker admission gate, and the cancellation token that stops
//! frame routing when the session ends. [`SessionRegistry`] maps session
//! ids to live sessions and enforces the open/replace/close rules.

use crate::error::{RelayError, Result};
use crate::gate::ProcessingGate;
use crate::pipeline::messages::{ChannelId, SessionId};
use crate::platform::{VoiceChannelId, VoiceConnection};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// State scoped to one live voice connection.
pub struct VoiceSession {
    id: SessionId,
    channel: VoiceChannelId,
    text_channel: ChannelId,
    connection: Arc<dyn VoiceConnection>,
    auto_speak: AtomicBool,
    playback_busy: Arc<AtomicBool>,
    gate: ProcessingGate,
    cancel: CancellationToken,
}

impl VoiceSession {
    /// Create a session for a freshly established connection.
    ///
    /// Auto-speak starts enabled; replies are spoken back into the voice
    /// channel until a caller turns it off.
    pub fn new(
        id: SessionId,
        channel: VoiceChannelId,
        text_channel: ChannelId,
        connection: Arc<dyn VoiceConnection>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            channel,
            text_channel,
            connection,
            auto_speak: AtomicBool::new(true),
            playback_busy: Arc::new(AtomicBool::new(false)),
            gate: ProcessingGate::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Voice channel this session is connected to.
    pub fn channel(&self) -> VoiceChannelId {
        self.channel
    }

    /// Text channel replies and notices are posted to.
    pub fn text_channel(&self) -> ChannelId {
        self.text_channel
    }

    pub fn connection(&self) -> &Arc<dyn VoiceConnection> {
        &self.connection
    }

    /// Whether replies should be spoken back into the voice channel.
    pub fn auto_speak(&self) -> bool {
        self.auto_speak.load(Ordering::Relaxed)
    }

    pub fn set_auto_speak(&self, enabled: bool) {
        self.auto_speak.store(enabled, Ordering::Relaxed);
    }

    /// Busy flag held by the playback sequencer across the synthesis and
    /// playback window.
    pub(crate) fn playback_busy(&self) -> &Arc<AtomicBool> {
        &self.playback_busy
    }

    /// Per-speaker turn admission gate.
    pub fn gate(&self) -> &ProcessingGate {
        &self.gate
    }

    /// Cancelled when the session closes; the session's routing tasks
    /// select on it and exit, dropping their segmenter state.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop capture and cancel routing. Safe to call more than once.
    fn begin_shutdown(&self) {
        self.cancel.cancel();
        self.connection.stop_capture();
    }
}

/// Live sessions keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<VoiceSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session.
    ///
    /// # Errors
    ///
    /// `RelayError::SessionExists` when the id already has an open
    /// session. Callers that mean to move an existing session use
    /// [`replace`](Self::replace) instead.
    pub fn open(&self, session: Arc<VoiceSession>) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(&session.id()) {
            return Err(RelayError::SessionExists(session.id()));
        }
        info!(
            "session {} opened on channel {}",
            session.id(),
            session.channel()
        );
        sessions.insert(session.id(), session);
        Ok(())
    }

    /// Install a session, shutting down any prior session under the same
    /// id first. Returns the replaced session so the caller can finish
    /// disconnecting it.
    pub fn replace(&self, session: Arc<VoiceSession>) -> Option<Arc<VoiceSession>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let prior = sessions.remove(&session.id());
        if let Some(old) = &prior {
            old.begin_shutdown();
            info!("session {} replaced", old.id());
        }
        sessions.insert(session.id(), session);
        prior
    }

    /// Remove and shut down a session. Closing an id with no open
    /// session is a no-op.
    pub fn close(&self, id: SessionId) -> Option<Arc<VoiceSession>> {
        let removed = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.remove(&id)
        };
        if let Some(session) = &removed {
            session.begin_shutdown();
            info!("session {id} closed");
        }
        removed
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<VoiceSession>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(&id).cloned()
    }

    /// Ids of all open sessions.
    pub fn open_ids(&self) -> Vec<SessionId> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::pipeline::messages::SpeakerId;
    use crate::platform::FrameSink;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeConnection {
        capture_stops: AtomicUsize,
    }

    #[async_trait]
    impl VoiceConnection for FakeConnection {
        fn start_capture(&self, _sink: FrameSink) -> anyhow::Result<()> {
            Ok(())
        }

        fn stop_capture(&self) {
            self.capture_stops.fetch_add(1, Ordering::SeqCst);
        }

        async fn move_to(&self, _channel: VoiceChannelId) -> anyhow::Result<()> {
            Ok(())
        }

        async fn play(&self, _audio: Bytes) -> anyhow::Result<()> {
            Ok(())
        }

        fn is_playing(&self) -> bool {
            false
        }

        fn speaker_name(&self, _speaker: SpeakerId) -> Option<String> {
            None
        }

        async fn disconnect(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn session(id: SessionId) -> Arc<VoiceSession> {
        VoiceSession::new(id, 100, 200, Arc::new(FakeConnection::default()))
    }

    #[test]
    fn open_rejects_duplicate_id() {
        let registry = SessionRegistry::new();
        registry.open(session(1)).unwrap();

        let err = registry.open(session(1)).unwrap_err();
        assert!(matches!(err, RelayError::SessionExists(1)));
        assert!(registry.get(1).is_some());
    }

    #[test]
    fn replace_shuts_down_prior_session() {
        let registry = SessionRegistry::new();
        let conn = Arc::new(FakeConnection::default());
        let old = VoiceSession::new(7, 100, 200, conn.clone());
        registry.open(old.clone()).unwrap();

        let replaced = registry.replace(session(7)).unwrap();
        assert!(replaced.cancel_token().is_cancelled());
        assert_eq!(conn.capture_stops.load(Ordering::SeqCst), 1);

        // The new session is live and untouched.
        let current = registry.get(7).unwrap();
        assert!(!current.cancel_token().is_cancelled());
    }

    #[test]
    fn close_is_idempotent() {
        let registry = SessionRegistry::new();
        let conn = Arc::new(FakeConnection::default());
        registry.open(VoiceSession::new(3, 10, 20, conn.clone())).unwrap();

        let closed = registry.close(3).unwrap();
        assert!(closed.cancel_token().is_cancelled());
        assert_eq!(conn.capture_stops.load(Ordering::SeqCst), 1);

        assert!(registry.close(3).is_none());
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn auto_speak_defaults_on_and_toggles() {
        let s = session(5);
        assert!(s.auto_speak());
        s.set_auto_speak(false);
        assert!(!s.auto_speak());
    }
}
