//! Per-session frame routing into per-speaker segmenter lanes.
//!
//! One router task owns the session's frame receiver. The first frame
//! from a speaker spawns that speaker's lane: a task that exclusively
//! owns the speaker's [`SpeechSegmenter`] and drains a bounded channel
//! of that speaker's frames, so no segmenter state is ever touched from
//! two tasks. A finalized utterance claims the speaker's gate slot and
//! runs as its own turn task, keeping slow collaborator calls off the
//! frame path.

use crate::config::SegmenterConfig;
use crate::gate::SpeakerSlot;
use crate::pipeline::messages::{Frame, SpeakerId, Utterance};
use crate::pipeline::turn::TurnPipeline;
use crate::segment::SpeechSegmenter;
use crate::session::VoiceSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Capacity of the session-wide frame channel fed by the platform sink.
pub(crate) const FRAME_CHANNEL_SIZE: usize = 64;
/// Capacity of each per-speaker lane channel.
const LANE_CHANNEL_SIZE: usize = 64;

/// Drain `rx` and fan frames out to per-speaker lanes until the session
/// is cancelled or the sink side closes.
pub async fn run_frame_router(
    session: Arc<VoiceSession>,
    pipeline: Arc<TurnPipeline>,
    config: SegmenterConfig,
    mut rx: mpsc::Receiver<Frame>,
) {
    let cancel = session.cancel_token().clone();
    let mut lanes: HashMap<SpeakerId, mpsc::Sender<Frame>> = HashMap::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        let speaker = frame.speaker;
                        if !lanes.contains_key(&speaker) {
                            debug!("starting segmenter lane for speaker {speaker}");
                            let (lane_tx, lane_rx) = mpsc::channel(LANE_CHANNEL_SIZE);
                            let segmenter =
                                SpeechSegmenter::new(&config, session.gate().slot(speaker));
                            tokio::spawn(run_speaker_lane(
                                speaker,
                                segmenter,
                                Arc::clone(&session),
                                Arc::clone(&pipeline),
                                lane_rx,
                            ));
                            lanes.insert(speaker, lane_tx);
                        }
                        if let Some(lane) = lanes.get(&speaker)
                            && lane.send(frame).await.is_err()
                        {
                            // Lane already exited; drop it so a later frame
                            // from this speaker starts a fresh one.
                            lanes.remove(&speaker);
                        }
                    }
                    None => break,
                }
            }
        }
    }
    debug!("frame router for session {} stopped", session.id());
}

/// Drive one speaker's segmenter, dispatching finalized utterances.
async fn run_speaker_lane(
    speaker: SpeakerId,
    mut segmenter: SpeechSegmenter,
    session: Arc<VoiceSession>,
    pipeline: Arc<TurnPipeline>,
    mut rx: mpsc::Receiver<Frame>,
) {
    let cancel = session.cancel_token().clone();
    let slot = session.gate().slot(speaker);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Some(utterance) = segmenter.on_frame(&frame) {
                            dispatch_turn(&slot, utterance, &session, &pipeline);
                        }
                    }
                    None => break,
                }
            }
        }
    }
    debug!("segmenter lane for speaker {speaker} stopped");
}

/// Claim the speaker's slot and run the turn as its own task.
fn dispatch_turn(
    slot: &SpeakerSlot,
    utterance: Utterance,
    session: &Arc<VoiceSession>,
    pipeline: &Arc<TurnPipeline>,
) {
    let Some(guard) = slot.try_admit() else {
        // Only this lane admits turns for its speaker, so a finalized
        // utterance should always win the slot.
        warn!(
            "speaker {} slot contended at admission, dropping utterance",
            utterance.speaker
        );
        return;
    };
    let session = Arc::clone(session);
    let pipeline = Arc::clone(pipeline);
    tokio::spawn(async move {
        let _in_flight = guard;
        pipeline.run_voice_turn(&session, utterance).await;
    });
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::config::RelayConfig;
    use crate::history::ConversationStore;
    use crate::platform::VoiceConnection;
    use crate::playback::PlaybackSequencer;
    use crate::test_utils::{
        CountingSynth, FakeVoiceConnection, FixedModel, FixedTranscriber, RecordingSink,
        flat_frame,
    };
    use std::time::Duration;

    struct Rig {
        session: Arc<VoiceSession>,
        pipeline: Arc<TurnPipeline>,
        sink: Arc<RecordingSink>,
        store: Arc<ConversationStore>,
        config: RelayConfig,
    }

    fn rig() -> Rig {
        let config = RelayConfig::default();
        let store = Arc::new(ConversationStore::new(config.history.max_turns));
        let sink = Arc::new(RecordingSink::default());
        let conn = Arc::new(FakeVoiceConnection::default());
        let session = VoiceSession::new(1, 10, 20, conn as Arc<dyn VoiceConnection>);
        let sequencer = Arc::new(PlaybackSequencer::new(
            Arc::new(CountingSynth::default()),
            &config.tts,
        ));
        let pipeline = Arc::new(TurnPipeline::new(
            Arc::new(FixedTranscriber::hears("hello")),
            Arc::new(FixedModel::replies("hi there")),
            sequencer,
            store.clone(),
            sink.clone(),
            &config,
        ));
        Rig {
            session,
            pipeline,
            sink,
            store,
            config,
        }
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
    async fn frames_route_through_to_a_reply() {
        let rig = rig();
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_SIZE);
        tokio::spawn(run_frame_router(
            rig.session.clone(),
            rig.pipeline.clone(),
            rig.config.segmenter.clone(),
            rx,
        ));

        // 600 ms of speech, then enough silence to finalize.
        for _ in 0..30 {
            tx.send(flat_frame(7, 3000)).await.unwrap();
        }
        for _ in 0..55 {
            tx.send(flat_frame(7, 0)).await.unwrap();
        }

        wait_for(|| !rig.sink.posts.lock().unwrap().is_empty()).await;
        let posts = rig.sink.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0], (20, "user7: hello\nhi there".to_string()));
        assert_eq!(rig.store.len(20), 2);
    }

    #[tokio::test]
    async fn each_speaker_gets_its_own_lane() {
        let rig = rig();
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_SIZE);
        tokio::spawn(run_frame_router(
            rig.session.clone(),
            rig.pipeline.clone(),
            rig.config.segmenter.clone(),
            rx,
        ));

        for _ in 0..30 {
            tx.send(flat_frame(1, 3000)).await.unwrap();
            tx.send(flat_frame(2, 3000)).await.unwrap();
        }
        for _ in 0..55 {
            tx.send(flat_frame(1, 0)).await.unwrap();
            tx.send(flat_frame(2, 0)).await.unwrap();
        }

        wait_for(|| rig.sink.posts.lock().unwrap().len() == 2).await;
        let posts = rig.sink.posts.lock().unwrap();
        let names: Vec<&str> = posts
            .iter()
            .map(|(_, text)| text.split(':').next().unwrap())
            .collect();
        assert!(names.contains(&"user1"));
        assert!(names.contains(&"user2"));
    }

    #[tokio::test]
    async fn cancellation_stops_the_router() {
        let rig = rig();
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_SIZE);
        let handle = tokio::spawn(run_frame_router(
            rig.session.clone(),
            rig.pipeline.clone(),
            rig.config.segmenter.clone(),
            rx,
        ));

        tx.send(flat_frame(1, 3000)).await.unwrap();
        rig.session.cancel_token().cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
