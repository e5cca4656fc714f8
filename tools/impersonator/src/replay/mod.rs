//! Record/replay of method invocations.
//!
//! # Overview
//!
//! A [`recording::Recording`] runs in one of two modes for its whole life:
//! 1. **Record** – intercepted calls reach the real object; each call's
//!    [`method::Method`] descriptor, callback invocations and return value are
//!    appended to an ordered list that is persisted on finish.
//! 2. **Replay** – the persisted list is loaded as a FIFO queue; each
//!    intercepted call must match the head of the queue and is answered from
//!    it without touching the real object.

pub mod method;
pub mod recorder;
pub mod recording;
pub mod replayer;
