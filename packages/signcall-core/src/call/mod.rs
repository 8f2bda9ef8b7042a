//! # Call Session Coordinator
//!
//! Client-side state machine for one-to-one calls.
//!
//! ```text
//!          initiate_call                 remote answer / offer
//!   Idle ───────────────► OutgoingRinging ─────────────────────┐
//!    │                                                          ▼
//!    │ incomingCall                accept_call              Connecting ──► Active
//!    └──────────────► IncomingRinging ──────────────────────────▲   remote stream
//!
//!   any state ── hangup / remote hangup / ICE lost ──► Ended ──(timer)──► Idle
//! ```
//!
//! The coordinator owns everything a call holds: the [`OngoingCall`], the
//! local media, the [`PeerSession`] and the chat log. Teardown releases all
//! of them in one place, so every path that ends a call leaves no live
//! local track and no chat history behind.
//!
//! ## Event Loop
//!
//! [`CallSessionCoordinator::run`] multiplexes, in one task:
//!
//! - UI commands ([`CallCommand`])
//! - relay events ([`ServerEvent`])
//! - peer engine events ([`PeerEvent`])
//! - a pending media acquisition
//! - the timer that returns `Ended` to `Idle`
//!
//! Media acquisition runs as a pending future inside the loop, so relay
//! events keep being handled while the camera opens. Every teardown bumps
//! an epoch; an acquisition that completes under a stale epoch, or finds a
//! different call in place, releases its media instead of using it.

pub mod chat;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::media::{LocalMedia, MediaSource};
use crate::peer::{PeerConfig, PeerConnectionAdapter, PeerConnector, PeerEvent, RemoteStream};
use crate::protocol::{
    ChatMessage, ClientEvent, HangupPayload, HangupReason, MessageError, MessagePayload,
    OngoingCall, OnlineUser, Participants, Profile, ServerEvent, SignalEnvelope,
};
use crate::time;

pub use chat::ChatLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    OutgoingRinging,
    IncomingRinging,
    Connecting,
    Active,
    Ended,
}

impl CallState {
    pub fn name(self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::OutgoingRinging => "ringing out",
            CallState::IncomingRinging => "ringing in",
            CallState::Connecting => "connecting",
            CallState::Active => "in a call",
            CallState::Ended => "ending a call",
        }
    }
}

/// Things the UI should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum CallNotice {
    OnlineUsers(Vec<OnlineUser>),
    StateChanged(CallState),
    IncomingCall(Participants),
    AlreadyInAnotherCall,
    MediaUnavailable(String),
    /// The receiver was offline when the call was placed.
    CallUnreachable(Participants),
    /// The receiver was busy or declined.
    CallRejected { reason: HangupReason },
    RemoteStreamReady(RemoteStream),
    MessageReceived(ChatMessage),
    MessageError(MessageError),
    CallEnded { reason: HangupReason },
    ServerError(String),
}

/// Requests from the UI.
#[derive(Debug, Clone)]
pub enum CallCommand {
    Call(OnlineUser),
    Accept,
    Decline,
    Hangup,
    SendMessage(String),
    Shutdown,
}

/// The peer side of the current call.
pub struct PeerSession {
    adapter: PeerConnectionAdapter,
    participant_user: OnlineUser,
    stream: Option<RemoteStream>,
}

impl PeerSession {
    /// The other participant.
    pub fn participant_user(&self) -> &OnlineUser {
        &self.participant_user
    }

    pub fn stream(&self) -> Option<&RemoteStream> {
        self.stream.as_ref()
    }
}

#[derive(Debug)]
enum MediaIntent {
    Call(Participants),
    Accept(Participants),
}

struct MediaOutcome {
    intent: MediaIntent,
    epoch: u64,
    result: Result<LocalMedia>,
}

type PendingMedia = BoxFuture<'static, MediaOutcome>;

pub struct CallSessionCoordinator {
    me: Profile,
    config: ClientConfig,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    notices: mpsc::UnboundedSender<CallNotice>,
    media_source: Arc<dyn MediaSource>,
    connector: Arc<dyn PeerConnector>,

    online_users: Vec<OnlineUser>,
    state: CallState,
    ongoing_call: Option<OngoingCall>,
    local_media: Option<LocalMedia>,
    peer: Option<PeerSession>,
    chat: ChatLog,

    pending_media: Option<PendingMedia>,
    epoch: u64,
    ended_deadline: Option<Instant>,
}

impl CallSessionCoordinator {
    pub fn new(
        me: Profile,
        config: ClientConfig,
        outbound: mpsc::UnboundedSender<ClientEvent>,
        notices: mpsc::UnboundedSender<CallNotice>,
        media_source: Arc<dyn MediaSource>,
        connector: Arc<dyn PeerConnector>,
    ) -> Self {
        Self {
            me,
            config,
            outbound,
            notices,
            media_source,
            connector,
            online_users: Vec::new(),
            state: CallState::Idle,
            ongoing_call: None,
            local_media: None,
            peer: None,
            chat: ChatLog::new(),
            pending_media: None,
            epoch: 0,
            ended_deadline: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn ongoing_call(&self) -> Option<&OngoingCall> {
        self.ongoing_call.as_ref()
    }

    pub fn peer_session(&self) -> Option<&PeerSession> {
        self.peer.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.chat.messages()
    }

    pub fn online_users(&self) -> &[OnlineUser] {
        &self.online_users
    }

    /// Live local tracks still held by this coordinator.
    pub fn retained_track_count(&self) -> usize {
        self.local_media
            .as_ref()
            .map(LocalMedia::live_track_count)
            .unwrap_or(0)
    }

    /// The local user's entry in the latest presence listing.
    pub fn current_user(&self) -> Option<&OnlineUser> {
        self.online_users.iter().find(|u| u.user_id == self.me.id)
    }

    // ── Plumbing ─────────────────────────────────────────────────────────────

    fn send(&self, event: ClientEvent) -> Result<()> {
        tracing::trace!(event = event.name(), "Sending to relay");
        self.outbound.send(event).map_err(|_| Error::ChannelClosed)
    }

    fn notify(&self, notice: CallNotice) {
        // Nobody listening is fine for headless use.
        let _ = self.notices.send(notice);
    }

    fn set_state(&mut self, state: CallState) {
        if self.state != state {
            tracing::debug!(from = self.state.name(), to = state.name(), "Call state changed");
            self.state = state;
            self.notify(CallNotice::StateChanged(state));
        }
    }

    /// Announce the local user to the relay.
    pub fn announce(&self) -> Result<()> {
        self.send(ClientEvent::AddNewUser(self.me.clone()))
    }

    // ── Placing and answering ────────────────────────────────────────────────

    /// Call `target`. Acquires local media before ringing.
    pub async fn initiate_call(&mut self, target: OnlineUser) -> Result<()> {
        let pending = self.begin_call(target)?;
        let outcome = pending.await;
        self.complete_media(outcome).await
    }

    /// Accept the ringing incoming call and start negotiating as the offerer.
    pub async fn accept_call(&mut self) -> Result<()> {
        let pending = self.begin_accept()?;
        let outcome = pending.await;
        self.complete_media(outcome).await
    }

    pub async fn decline_call(&mut self) -> Result<()> {
        if self.state != CallState::IncomingRinging {
            return Err(Error::InvalidState {
                action: "decline a call",
                state: self.state.name(),
            });
        }
        self.end_call(HangupReason::Declined, true).await;
        Ok(())
    }

    /// End the current call from this side. Valid in any state.
    pub async fn hangup(&mut self) {
        self.end_call(HangupReason::Ended, true).await;
    }

    fn begin_call(&mut self, target: OnlineUser) -> Result<PendingMedia> {
        if self.ongoing_call.is_some() || self.pending_media.is_some() {
            tracing::info!(target = %target.user_id, "Refusing to call while another call exists");
            self.notify(CallNotice::AlreadyInAnotherCall);
            return Err(Error::AlreadyInCall);
        }
        if target.user_id == self.me.id {
            tracing::info!("Refusing to call the local user");
            return Err(Error::CannotCallSelf);
        }
        let me = self.current_user().cloned().ok_or(Error::NotRegistered)?;
        let participants = Participants::new(me, target).with_new_call_id();
        Ok(self.acquire_media(MediaIntent::Call(participants)))
    }

    fn begin_accept(&mut self) -> Result<PendingMedia> {
        if self.state != CallState::IncomingRinging || self.pending_media.is_some() {
            return Err(Error::InvalidState {
                action: "accept a call",
                state: self.state.name(),
            });
        }
        let call = self.ongoing_call.as_mut().ok_or(Error::NoActiveCall)?;
        call.is_ringing = false;
        let participants = call.participants.clone();
        Ok(self.acquire_media(MediaIntent::Accept(participants)))
    }

    fn acquire_media(&self, intent: MediaIntent) -> PendingMedia {
        let source = self.media_source.clone();
        let constraints = self.config.media.clone();
        let existing = self.local_media.clone();
        let epoch = self.epoch;

        Box::pin(async move {
            let result = match existing {
                Some(media) => Ok(media),
                None => source.acquire(&constraints).await,
            };
            MediaOutcome {
                intent,
                epoch,
                result,
            }
        })
    }

    async fn complete_media(&mut self, outcome: MediaOutcome) -> Result<()> {
        let MediaOutcome {
            intent,
            epoch,
            result,
        } = outcome;

        let media = match result {
            Ok(media) => media,
            Err(e) => {
                tracing::warn!(error = %e, "Could not acquire local media");
                self.notify(CallNotice::MediaUnavailable(e.to_string()));
                if matches!(intent, MediaIntent::Accept(_)) && epoch == self.epoch {
                    if let Some(call) = self.ongoing_call.as_mut() {
                        call.is_ringing = true;
                    }
                }
                return Err(e);
            }
        };

        if epoch != self.epoch {
            tracing::info!(?intent, "Call ended while acquiring media");
            self.release_unretained(&media);
            return Ok(());
        }

        match intent {
            MediaIntent::Call(participants) => self.finish_call(participants, media).await,
            MediaIntent::Accept(participants) => self.finish_accept(participants, media).await,
        }
    }

    async fn finish_call(&mut self, participants: Participants, media: LocalMedia) -> Result<()> {
        if self.ongoing_call.is_some() {
            tracing::info!("Another call arrived while acquiring media");
            self.release_unretained(&media);
            self.notify(CallNotice::AlreadyInAnotherCall);
            return Err(Error::AlreadyInCall);
        }

        self.ended_deadline = None;
        self.local_media = Some(media);
        self.ongoing_call = Some(OngoingCall {
            participants: participants.clone(),
            is_ringing: true,
        });
        self.set_state(CallState::OutgoingRinging);
        tracing::info!(receiver = %participants.receiver.user_id, "Calling");

        if let Err(e) = self.send(ClientEvent::Call(participants)) {
            self.end_call(HangupReason::Ended, false).await;
            return Err(e);
        }
        Ok(())
    }

    async fn finish_accept(&mut self, participants: Participants, media: LocalMedia) -> Result<()> {
        let still_ringing = self.state == CallState::IncomingRinging
            && self
                .ongoing_call
                .as_ref()
                .is_some_and(|c| c.participants.same_call(&participants));
        if !still_ringing {
            self.release_unretained(&media);
            return Err(Error::NoActiveCall);
        }

        self.local_media = Some(media.clone());
        if let Err(e) = self.open_peer(true, participants.caller.clone(), media).await {
            tracing::warn!(error = %e, "Could not create peer connection");
            if let Some(media) = self.local_media.take() {
                media.stop_all();
            }
            if let Some(call) = self.ongoing_call.as_mut() {
                call.is_ringing = true;
            }
            return Err(e);
        }

        self.set_state(CallState::Connecting);
        tracing::info!(caller = %participants.caller.user_id, "Call accepted");
        self.flush_peer_events().await;
        Ok(())
    }

    /// Stop `media` unless it is the stream this coordinator keeps.
    fn release_unretained(&self, media: &LocalMedia) {
        let retained = self.local_media.as_ref().map(LocalMedia::id);
        if retained != Some(media.id()) {
            media.stop_all();
        }
    }

    async fn open_peer(
        &mut self,
        initiator: bool,
        participant_user: OnlineUser,
        media: LocalMedia,
    ) -> Result<()> {
        let config = PeerConfig::new(initiator, self.config.ice_servers.clone());
        let adapter = PeerConnectionAdapter::open(self.connector.as_ref(), config, media).await?;
        self.peer = Some(PeerSession {
            adapter,
            participant_user,
            stream: None,
        });
        Ok(())
    }

    // ── Teardown ─────────────────────────────────────────────────────────────

    async fn end_call(&mut self, reason: HangupReason, locally_initiated: bool) {
        self.epoch += 1;
        let call = self.ongoing_call.take();

        if locally_initiated {
            if let Some(call) = &call {
                let payload = HangupPayload {
                    ongoing_call: Some(call.clone()),
                    user_hangingup_id: Some(self.me.id.clone()),
                    reason: Some(reason),
                };
                if let Err(e) = self.send(ClientEvent::Hangup(payload)) {
                    tracing::warn!(error = %e, "Could not send hangup");
                }
            }
        }

        if let Some(mut peer) = self.peer.take() {
            peer.adapter.close().await;
        }
        if let Some(media) = self.local_media.take() {
            let stopped = media.stop_all();
            tracing::debug!(stopped, "Local media released");
        }
        self.chat.clear();

        self.set_state(CallState::Ended);
        self.ended_deadline = Some(Instant::now() + self.config.ended_notice());
        tracing::info!(%reason, had_call = call.is_some(), "Call ended");
        self.notify(CallNotice::CallEnded { reason });
    }

    /// Return from `Ended` to `Idle` once the notice period is over.
    pub fn expire_ended_notice(&mut self, now: Instant) -> bool {
        match self.ended_deadline {
            Some(deadline) if self.state == CallState::Ended && now >= deadline => {
                self.ended_deadline = None;
                self.set_state(CallState::Idle);
                true
            }
            _ => false,
        }
    }

    // ── Chat ─────────────────────────────────────────────────────────────────

    /// Send a chat line to the other participant. Blank text is ignored.
    pub fn send_message(&mut self, text: &str) -> Result<()> {
        let Some(call) = self.ongoing_call.clone() else {
            return Err(Error::NoActiveCall);
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let message = ChatMessage {
            sender_id: self.me.id.clone(),
            message: text.to_string(),
            timestamp: time::now(),
        };
        self.chat.push(message.clone());

        self.send(ClientEvent::Message(MessagePayload {
            sender_id: message.sender_id,
            message: message.message,
            ongoing_call: Some(call),
            timestamp: Some(message.timestamp),
        }))
    }

    fn receive_message(&mut self, message: ChatMessage) {
        if self.ongoing_call.is_none() {
            tracing::debug!(sender = %message.sender_id, "Dropping chat message outside a call");
            return;
        }
        if self.chat.push(message.clone()) {
            self.notify(CallNotice::MessageReceived(message));
        } else {
            tracing::trace!(sender = %message.sender_id, "Duplicate chat message");
        }
    }

    // ── Relay events ─────────────────────────────────────────────────────────

    pub async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::GetUsers(users) => {
                tracing::debug!(count = users.len(), "Presence listing updated");
                self.online_users = users.clone();
                self.notify(CallNotice::OnlineUsers(users));
            }
            ServerEvent::IncomingCall(participants) => self.handle_incoming_call(participants),
            ServerEvent::CallUnreachable { participants } => {
                self.handle_call_unreachable(participants).await
            }
            ServerEvent::WebrtcSignal(envelope) => self.handle_signal(envelope).await,
            ServerEvent::Hangup(payload) => self.handle_remote_hangup(payload).await,
            ServerEvent::ReceiveMessage(message) => self.receive_message(message),
            ServerEvent::MessageError(error) => {
                tracing::warn!(code = ?error.error, "Relay refused chat message: {}", error.message);
                self.notify(CallNotice::MessageError(error));
            }
            ServerEvent::Error { message } => {
                tracing::warn!("Relay error: {}", message);
                self.notify(CallNotice::ServerError(message));
            }
            ServerEvent::Pong => tracing::trace!("Pong"),
        }
    }

    fn handle_incoming_call(&mut self, participants: Participants) {
        if participants.receiver.user_id != self.me.id {
            tracing::warn!(receiver = %participants.receiver.user_id, "Incoming call addressed to someone else");
            return;
        }

        if self.ongoing_call.is_some() {
            tracing::info!(caller = %participants.caller.user_id, "Busy, rejecting incoming call");
            let payload = HangupPayload {
                ongoing_call: Some(OngoingCall {
                    participants,
                    is_ringing: false,
                }),
                user_hangingup_id: Some(self.me.id.clone()),
                reason: Some(HangupReason::Busy),
            };
            if let Err(e) = self.send(ClientEvent::Hangup(payload)) {
                tracing::warn!(error = %e, "Could not reject incoming call");
            }
            return;
        }

        tracing::info!(caller = %participants.caller.user_id, "Incoming call");
        self.ended_deadline = None;
        self.ongoing_call = Some(OngoingCall {
            participants: participants.clone(),
            is_ringing: true,
        });
        self.set_state(CallState::IncomingRinging);
        self.notify(CallNotice::IncomingCall(participants));
    }

    async fn handle_call_unreachable(&mut self, participants: Participants) {
        let is_current = self
            .ongoing_call
            .as_ref()
            .is_some_and(|c| c.participants.same_call(&participants));
        if !is_current {
            tracing::debug!("callUnreachable for another call");
            return;
        }
        tracing::info!(receiver = %participants.receiver.user_id, "Receiver is not online");
        self.notify(CallNotice::CallUnreachable(participants));
        self.end_call(HangupReason::Unreachable, false).await;
    }

    async fn handle_signal(&mut self, envelope: SignalEnvelope) {
        let Some(call) = self.ongoing_call.as_ref() else {
            tracing::debug!(kind = envelope.sdp.kind(), "No ongoing call, dropping signal");
            return;
        };
        if !call.participants.same_call(&envelope.ongoing_call.participants) {
            tracing::debug!(kind = envelope.sdp.kind(), "Signal for another call, dropping");
            return;
        }
        let sender = envelope.sender().clone();
        if sender.user_id == self.me.id {
            tracing::warn!("Signal claims to come from the local user, dropping");
            return;
        }

        if self.peer.is_none() {
            let Some(media) = self.local_media.clone() else {
                tracing::warn!(kind = envelope.sdp.kind(), "No local media to answer with");
                return;
            };
            if let Err(e) = self.open_peer(false, sender, media).await {
                tracing::warn!(error = %e, "Could not create peer connection");
                return;
            }
            if let Some(call) = self.ongoing_call.as_mut() {
                call.is_ringing = false;
            }
            self.set_state(CallState::Connecting);
        }

        if let Some(peer) = self.peer.as_mut() {
            if let Err(e) = peer.adapter.signal(envelope.sdp).await {
                tracing::warn!(error = %e, "Could not apply remote signal");
            }
        }
        self.flush_peer_events().await;
    }

    async fn handle_remote_hangup(&mut self, payload: HangupPayload) {
        let Some(current) = self.ongoing_call.as_ref() else {
            tracing::debug!("Hangup without an ongoing call");
            return;
        };
        if let Some(theirs) = &payload.ongoing_call {
            if !current.participants.same_call(&theirs.participants) {
                tracing::debug!("Hangup for another call, ignoring");
                return;
            }
        }

        let reason = payload.reason.unwrap_or(HangupReason::Ended);
        tracing::info!(by = ?payload.user_hangingup_id, %reason, "Remote hangup");
        if matches!(reason, HangupReason::Busy | HangupReason::Declined) {
            self.notify(CallNotice::CallRejected { reason });
        }
        self.end_call(reason, false).await;
    }

    // ── Peer events ──────────────────────────────────────────────────────────

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Signal(data) => {
                let Some(call) = self.ongoing_call.clone() else {
                    return;
                };
                let is_caller = call.participants.caller.user_id == self.me.id;
                let envelope = SignalEnvelope {
                    sdp: data,
                    ongoing_call: call,
                    is_caller,
                };
                if let Err(e) = self.send(ClientEvent::WebrtcSignal(envelope)) {
                    tracing::warn!(error = %e, "Could not send signal");
                }
            }
            PeerEvent::RemoteStream(stream) => {
                let Some(peer) = self.peer.as_mut() else {
                    return;
                };
                tracing::info!(stream = %stream.id, tracks = stream.tracks.len(), "Remote stream received");
                peer.stream = Some(stream.clone());
                self.set_state(CallState::Active);
                self.notify(CallNotice::RemoteStreamReady(stream));
            }
            PeerEvent::ConnectionLost(state) => {
                tracing::warn!(?state, "Peer connection lost, ending call");
                self.end_call(HangupReason::ConnectionLost, true).await;
            }
        }
    }

    /// Handle every peer event that is already queued.
    pub async fn flush_peer_events(&mut self) {
        while let Some(event) = self.peer.as_mut().and_then(|p| p.adapter.try_next_event()) {
            self.handle_peer_event(event).await;
        }
    }

    // ── Event loop ───────────────────────────────────────────────────────────

    /// Run until shutdown, or until either channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<CallCommand>,
        mut inbound: mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        tracing::info!(user = %self.me.id, "Call coordinator starting");
        if let Err(e) = self.announce() {
            tracing::error!(error = %e, "Could not announce to relay");
            return;
        }

        loop {
            let deadline = self.ended_deadline;

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                tracing::info!("Shutdown requested");
                                break;
                            }
                        }
                        None => {
                            tracing::info!("Command channel closed");
                            break;
                        }
                    }
                }

                event = inbound.recv() => {
                    match event {
                        Some(event) => self.handle_server_event(event).await,
                        None => {
                            tracing::warn!("Signaling channel closed");
                            if self.ongoing_call.is_some() {
                                self.end_call(HangupReason::ConnectionLost, false).await;
                            }
                            break;
                        }
                    }
                }

                Some(event) = next_peer_event(&mut self.peer) => {
                    self.handle_peer_event(event).await;
                }

                outcome = media_ready(&mut self.pending_media) => {
                    self.pending_media = None;
                    if let Err(e) = self.complete_media(outcome).await {
                        log_command_error(&e);
                    }
                }

                _ = ended_timer(deadline) => {
                    self.expire_ended_notice(Instant::now());
                }
            }
        }

        // Stop anything still held.
        if let Some(mut peer) = self.peer.take() {
            peer.adapter.close().await;
        }
        if let Some(media) = self.local_media.take() {
            media.stop_all();
        }
        tracing::info!("Call coordinator stopped");
    }

    /// Returns `false` when the loop should stop.
    async fn handle_command(&mut self, command: CallCommand) -> bool {
        tracing::debug!(?command, "Handling command");

        let result = match command {
            CallCommand::Call(target) => self.begin_call(target).map(|pending| {
                self.pending_media = Some(pending);
            }),
            CallCommand::Accept => self.begin_accept().map(|pending| {
                self.pending_media = Some(pending);
            }),
            CallCommand::Decline => self.decline_call().await,
            CallCommand::Hangup => {
                self.pending_media = None;
                self.hangup().await;
                Ok(())
            }
            CallCommand::SendMessage(text) => self.send_message(&text),
            CallCommand::Shutdown => {
                if self.ongoing_call.is_some() {
                    self.hangup().await;
                }
                return false;
            }
        };

        if let Err(e) = result {
            log_command_error(&e);
        }
        true
    }
}

fn log_command_error(e: &Error) {
    if e.is_user_facing() {
        tracing::info!(code = e.code(), "{}", e);
    } else {
        tracing::warn!(code = e.code(), "{}", e);
    }
}

async fn next_peer_event(peer: &mut Option<PeerSession>) -> Option<PeerEvent> {
    match peer {
        Some(peer) => peer.adapter.next_event().await,
        None => std::future::pending().await,
    }
}

async fn media_ready(pending: &mut Option<PendingMedia>) -> MediaOutcome {
    match pending {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn ended_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
