//! captiond - live speech captioning daemon
//!
//! Runs as a background service and is driven over a Unix socket: `toggle`
//! starts or stops a captioning session, `status` reports it, `quit` shuts
//! the daemon down. A session streams microphone PCM to a speech
//! recognizer, routes finalized utterances through translation, submits the
//! results to a broadcast caption endpoint in order, and optionally plays
//! synthesized speech locally.

pub mod config;
pub mod daemon;
pub mod ipc;
pub mod session;
pub mod sink;

pub use config::DaemonConfig;
pub use daemon::Daemon;
pub use session::RecordingSession;
pub use sink::RodioSink;
