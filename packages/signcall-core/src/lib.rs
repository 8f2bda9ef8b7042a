//! # SignCall Core
//!
//! Client library for one-to-one video calls with in-call chat, plus the
//! wire protocol shared with `signcall-relay`.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SIGNCALL CLIENT                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   UI ── CallCommand ──►┌──────────────────────────┐── CallNotice ──► UI │
//! │                        │  CallSessionCoordinator  │                     │
//! │                        │  (call state machine)    │                     │
//! │                        └───┬──────────┬───────┬───┘                     │
//! │                            │          │       │                         │
//! │            ClientEvent /   │          │       │ LocalMedia              │
//! │            ServerEvent     │          │       │                         │
//! │                  ┌─────────▼───┐  ┌───▼────┐ ┌▼────────────┐            │
//! │                  │  Signaling  │  │  Peer  │ │ MediaSource │            │
//! │                  │  Channel    │  │Adapter │ │             │            │
//! │                  └──────┬──────┘  └───┬────┘ └─────────────┘            │
//! │                         │             │                                 │
//! └─────────────────────────┼─────────────┼─────────────────────────────────┘
//!                           ▼             ▼
//!                    signcall-relay   WebRTC engine (PeerConnector)
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`protocol`] - Wire events shared with the relay
//! - [`error`] - Error types for the library
//! - [`call`] - Call state machine and chat history
//! - [`peer`] - Peer connection adapter, the `webrtc` engine and the loopback
//!   engine used in tests
//! - [`media`] - Local tracks and the encoded samples fed into them
//! - [`channel`] - WebSocket connection to the relay
//! - [`gesture`] - Sign-language recognition service client
//! - [`config`] - Client settings

pub mod call;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod gesture;
pub mod media;
pub mod peer;
pub mod protocol;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use call::{CallCommand, CallNotice, CallSessionCoordinator, CallState};
pub use channel::SignalingChannel;
pub use client::CallClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use peer::rtc::WebRtcConnector;
pub use protocol::{ClientEvent, OnlineUser, Profile, ServerEvent};
