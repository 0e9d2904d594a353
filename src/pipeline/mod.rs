//! Frame-to-reply pipeline.
//!
//! Frames from the platform fan out through [`router`] into per-speaker
//! segmenter lanes; finalized utterances run through [`turn`] as
//! individual tasks gated to one in flight per speaker.

pub mod messages;
pub mod router;
pub mod turn;
