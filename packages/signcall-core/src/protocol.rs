//! # Wire Protocol
//!
//! Every frame on the signaling channel is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`. Event names and payload fields
//! are camelCase so browser clients can speak the protocol directly.
//!
//! ```text
//! ┌──────────────┐   addNewUser / call / webrtcSignal / hangup / message   ┌─────────┐
//! │    Client    │ ─────────────────────────────────────────────────────► │  Relay  │
//! │              │ ◄───────────────────────────────────────────────────── │         │
//! └──────────────┘   getUsers / incomingCall / webrtcSignal / hangup /     └─────────┘
//!                    receiveMessage / messageError / callUnreachable
//! ```
//!
//! The relay never interprets SDP or chat text. It only reads the
//! participant user ids to decide where an event goes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Opaque stable user identifier supplied by the identity provider.
pub type UserId = String;

// ── Identities ───────────────────────────────────────────────────────────────

/// Address of one signaling connection. Assigned by the relay on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// Allocate a fresh channel id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Display profile from the identity provider.
///
/// Only `id` is interpreted. Unknown fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            full_name: None,
            image_url: None,
            extra: Map::new(),
        }
    }

    pub fn with_full_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }
}

/// A user currently connected to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub profile: Profile,
}

// ── Calls ────────────────────────────────────────────────────────────────────

/// The two parties of a call. Fixed once the call is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participants {
    pub caller: OnlineUser,
    pub receiver: OnlineUser,
    /// Fresh for every call attempt. Peers that do not send one match on
    /// the user-id pair alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<Uuid>,
}

impl Participants {
    pub fn new(caller: OnlineUser, receiver: OnlineUser) -> Self {
        Self {
            caller,
            receiver,
            call_id: None,
        }
    }

    /// Tag these participants with a new call id.
    pub fn with_new_call_id(mut self) -> Self {
        self.call_id = Some(Uuid::new_v4());
        self
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.caller.user_id == user_id || self.receiver.user_id == user_id
    }

    /// The participant that is not `user_id`, or `None` when `user_id` is not
    /// part of this call.
    pub fn other(&self, user_id: &str) -> Option<&OnlineUser> {
        if self.caller.user_id == user_id {
            Some(&self.receiver)
        } else if self.receiver.user_id == user_id {
            Some(&self.caller)
        } else {
            None
        }
    }

    /// Call identity is the (caller, receiver) user-id pair plus the call id
    /// when both copies carry one. Channel ids and profiles may differ
    /// between the two sides' copies.
    pub fn same_call(&self, other: &Participants) -> bool {
        let ids_match = match (self.call_id, other.call_id) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        ids_match
            && self.caller.user_id == other.caller.user_id
            && self.receiver.user_id == other.receiver.user_id
    }
}

/// The call a client is currently part of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OngoingCall {
    pub participants: Participants,
    pub is_ringing: bool,
}

// ── WebRTC signaling ─────────────────────────────────────────────────────────

/// A single trickled ICE candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// One unit of negotiation data produced by a peer engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SignalData {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
}

impl SignalData {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalData::Offer { .. } => "offer",
            SignalData::Answer { .. } => "answer",
            SignalData::Candidate { .. } => "candidate",
        }
    }
}

/// Signal data plus the call it belongs to.
///
/// `is_caller` tells whether the sender of this envelope is the call's caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    pub sdp: SignalData,
    pub ongoing_call: OngoingCall,
    pub is_caller: bool,
}

impl SignalEnvelope {
    /// The participant that sent this envelope.
    pub fn sender(&self) -> &OnlineUser {
        let participants = &self.ongoing_call.participants;
        if self.is_caller {
            &participants.caller
        } else {
            &participants.receiver
        }
    }
}

/// Why a call was hung up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HangupReason {
    /// Normal hangup by a participant.
    Ended,
    /// The receiver was already in another call.
    Busy,
    /// The receiver declined while ringing.
    Declined,
    /// ICE connectivity was lost.
    ConnectionLost,
    /// The receiver was not online when the call was placed.
    Unreachable,
}

impl fmt::Display for HangupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HangupReason::Ended => "ended",
            HangupReason::Busy => "busy",
            HangupReason::Declined => "declined",
            HangupReason::ConnectionLost => "connection lost",
            HangupReason::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HangupPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ongoing_call: Option<OngoingCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_hangingup_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<HangupReason>,
}

// ── Chat ─────────────────────────────────────────────────────────────────────

/// A chat line exchanged during a call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Client → relay chat submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub sender_id: UserId,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ongoing_call: Option<OngoingCall>,
    /// Sender's local timestamp. The relay stamps its own clock when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Reasons the relay refuses to deliver a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageErrorKind {
    #[error("Sender not online")]
    SenderNotOnline,
    #[error("No active call")]
    NoActiveCall,
    #[error("Sender not in this call")]
    SenderNotInCall,
    #[error("Recipient not online")]
    RecipientNotOnline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageError {
    pub error: MessageErrorKind,
    pub message: String,
}

impl From<MessageErrorKind> for MessageError {
    fn from(kind: MessageErrorKind) -> Self {
        Self {
            error: kind,
            message: kind.to_string(),
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Events sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Announce the identity behind this connection.
    AddNewUser(Profile),
    /// Ring the receiver.
    Call(Participants),
    /// Offer, answer or ICE candidate for the other participant.
    WebrtcSignal(SignalEnvelope),
    Hangup(HangupPayload),
    Message(MessagePayload),
    Ping,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::AddNewUser(_) => "addNewUser",
            ClientEvent::Call(_) => "call",
            ClientEvent::WebrtcSignal(_) => "webrtcSignal",
            ClientEvent::Hangup(_) => "hangup",
            ClientEvent::Message(_) => "message",
            ClientEvent::Ping => "ping",
        }
    }
}

/// Events sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full presence listing, in join order.
    GetUsers(Vec<OnlineUser>),
    IncomingCall(Participants),
    /// The receiver of a `call` is not online.
    CallUnreachable { participants: Participants },
    WebrtcSignal(SignalEnvelope),
    Hangup(HangupPayload),
    ReceiveMessage(ChatMessage),
    MessageError(MessageError),
    /// Protocol-level problem with a frame this client sent.
    Error { message: String },
    Pong,
}
