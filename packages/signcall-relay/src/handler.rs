//! WebSocket connection handler.
//!
//! Manages individual WebSocket connections: parsing client events, routing
//! them through the relay state, and sending responses.
//!
//! Routing never trusts the channel ids a client writes into its payloads.
//! Every target is looked up in the presence registry by user id at the
//! moment the event is handled.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use signcall_core::protocol::{
    ChannelId, ClientEvent, HangupPayload, Participants, Profile, ServerEvent, SignalEnvelope,
};

use crate::relay;
use crate::state::RelayState;

/// Handle a single WebSocket connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Allocates a channel id and registers the outbound sender
/// 2. Spawns a sender task to forward outbound events
/// 3. Processes incoming events until the connection closes
/// 4. Drops the channel and any presence bound to it
pub async fn handle_websocket(socket: WebSocket, state: RelayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // ── Step 1: Open Channel ──────────────────────────────────────────────

    let channel_id = ChannelId::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.open_channel(channel_id, tx);
    tracing::info!(channel = %channel_id, "WebSocket connected");

    // ── Step 2: Spawn Sender Task ─────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server event: {}", e);
                }
            }
        }
    });

    // ── Step 3: Process Events ────────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(&state, channel_id, event),
                Err(e) => {
                    tracing::warn!(
                        channel = %channel_id,
                        error = %e,
                        "Failed to parse client event"
                    );
                    state.send_to_channel(
                        channel_id,
                        ServerEvent::Error {
                            message: format!("Invalid message format: {}", e),
                        },
                    );
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(channel = %channel_id, "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(channel = %channel_id, error = %e, "WebSocket error");
                break;
            }
            _ => {} // Binary, Ping, Pong; axum answers pings itself
        }
    }

    // ── Step 4: Cleanup ───────────────────────────────────────────────────

    state.close_channel(channel_id);
    sender_task.abort();
    tracing::info!(channel = %channel_id, "WebSocket disconnected");
}

/// Handle one parsed client event arriving on `origin`.
pub fn handle_client_event(state: &RelayState, origin: ChannelId, event: ClientEvent) {
    tracing::trace!(channel = %origin, event = event.name(), "Client event");

    match event {
        ClientEvent::AddNewUser(profile) => handle_add_new_user(state, origin, profile),
        ClientEvent::Call(participants) => handle_call(state, origin, participants),
        ClientEvent::WebrtcSignal(envelope) => handle_webrtc_signal(state, origin, envelope),
        ClientEvent::Hangup(payload) => handle_hangup(state, origin, payload),
        ClientEvent::Message(payload) => relay::relay_message(state, origin, payload),
        ClientEvent::Ping => {
            state.send_to_channel(origin, ServerEvent::Pong);
        }
    }
}

// ── Event Handlers ────────────────────────────────────────────────────────────

fn send_error(state: &RelayState, origin: ChannelId, message: &str) {
    state.send_to_channel(
        origin,
        ServerEvent::Error {
            message: message.to_string(),
        },
    );
}

/// Register the user behind this channel and broadcast presence.
fn handle_add_new_user(state: &RelayState, origin: ChannelId, profile: Profile) {
    if profile.id.trim().is_empty() {
        send_error(state, origin, "Profile id must not be empty");
        return;
    }
    state.register_user(origin, profile);
}

/// Ring the receiver, or tell the caller the receiver is offline.
fn handle_call(state: &RelayState, origin: ChannelId, participants: Participants) {
    let Some(caller) = state.user_for_channel(origin) else {
        send_error(state, origin, "Must register before placing a call");
        return;
    };
    if caller.user_id != participants.caller.user_id {
        tracing::warn!(
            channel = %origin,
            claimed = participants.caller.user_id.as_str(),
            actual = caller.user_id.as_str(),
            "Call placed on behalf of another user"
        );
        send_error(state, origin, "Only the caller can place a call");
        return;
    }

    let receiver_id = participants.receiver.user_id.clone();
    tracing::info!(
        caller = caller.user_id.as_str(),
        receiver = receiver_id.as_str(),
        "Call"
    );

    if !state.send_to_user(&receiver_id, ServerEvent::IncomingCall(participants.clone())) {
        tracing::info!(receiver = receiver_id.as_str(), "Receiver offline");
        state.send_to_channel(origin, ServerEvent::CallUnreachable { participants });
    }
}

/// Forward offer / answer / candidate data to the other participant.
fn handle_webrtc_signal(state: &RelayState, origin: ChannelId, envelope: SignalEnvelope) {
    let Some(sender) = state.user_for_channel(origin) else {
        tracing::warn!(channel = %origin, "Signal from unregistered channel dropped");
        return;
    };
    let Some(target) = envelope.ongoing_call.participants.other(&sender.user_id) else {
        tracing::warn!(
            sender = sender.user_id.as_str(),
            "Signal from non-participant dropped"
        );
        return;
    };
    let target_id = target.user_id.clone();

    tracing::debug!(
        from = sender.user_id.as_str(),
        to = target_id.as_str(),
        kind = envelope.sdp.kind(),
        "Forwarding signal"
    );
    if !state.send_to_user(&target_id, ServerEvent::WebrtcSignal(envelope)) {
        tracing::warn!(to = target_id.as_str(), "Signal target offline, dropped");
    }
}

/// Forward a hangup to the other participant.
fn handle_hangup(state: &RelayState, origin: ChannelId, payload: HangupPayload) {
    let Some(call) = &payload.ongoing_call else {
        tracing::debug!(channel = %origin, "Hangup without a call ignored");
        return;
    };
    let Some(sender) = state.user_for_channel(origin) else {
        tracing::warn!(channel = %origin, "Hangup from unregistered channel dropped");
        return;
    };
    let Some(target) = call.participants.other(&sender.user_id) else {
        tracing::warn!(
            sender = sender.user_id.as_str(),
            "Hangup from non-participant dropped"
        );
        return;
    };
    let target_id = target.user_id.clone();

    tracing::info!(
        from = sender.user_id.as_str(),
        to = target_id.as_str(),
        reason = ?payload.reason,
        "Hangup"
    );
    if !state.send_to_user(&target_id, ServerEvent::Hangup(payload)) {
        tracing::debug!(to = target_id.as_str(), "Hangup target offline");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RelayConfig;
    use signcall_core::protocol::{HangupReason, OngoingCall, SignalData};

    struct Client {
        channel: ChannelId,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    impl Client {
        fn events(&mut self) -> Vec<ServerEvent> {
            std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
        }
    }

    fn open(state: &RelayState) -> Client {
        let channel = ChannelId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        state.open_channel(channel, tx);
        Client { channel, rx }
    }

    fn join(state: &RelayState, id: &str) -> Client {
        let client = open(state);
        handle_client_event(state, client.channel, ClientEvent::AddNewUser(Profile::new(id)));
        client
    }

    fn participants(state: &RelayState, caller: &str, receiver: &str) -> Participants {
        Participants::new(
            state.find_user(caller).unwrap(),
            state.find_user(receiver).unwrap(),
        )
    }

    fn offer_envelope(participants: Participants, is_caller: bool) -> SignalEnvelope {
        SignalEnvelope {
            sdp: SignalData::Offer {
                sdp: "v=0".to_string(),
            },
            ongoing_call: OngoingCall {
                participants,
                is_ringing: false,
            },
            is_caller,
        }
    }

    #[test]
    fn test_add_new_user_broadcasts_listing() {
        let state = RelayState::new(RelayConfig::default());
        let mut alice = join(&state, "alice");
        let mut bob = join(&state, "bob");

        let alice_events = alice.events();
        assert_eq!(alice_events.len(), 2);
        assert!(matches!(
            alice_events.last(),
            Some(ServerEvent::GetUsers(users)) if users.len() == 2 && users[0].user_id == "alice"
        ));
        assert_eq!(bob.events().len(), 1);
    }

    #[test]
    fn test_empty_profile_id_is_rejected() {
        let state = RelayState::new(RelayConfig::default());
        let mut client = open(&state);

        handle_client_event(&state, client.channel, ClientEvent::AddNewUser(Profile::new("  ")));
        assert!(matches!(&client.events()[..], [ServerEvent::Error { .. }]));
        assert_eq!(state.online_count(), 0);
    }

    #[test]
    fn test_call_reaches_receiver_verbatim() {
        let state = RelayState::new(RelayConfig::default());
        let mut alice = join(&state, "alice");
        let mut bob = join(&state, "bob");
        alice.events();
        bob.events();

        let p = participants(&state, "alice", "bob").with_new_call_id();
        handle_client_event(&state, alice.channel, ClientEvent::Call(p.clone()));

        assert_eq!(bob.events(), vec![ServerEvent::IncomingCall(p)]);
        assert!(alice.events().is_empty());
    }

    #[test]
    fn test_call_to_offline_receiver_is_unreachable() {
        let state = RelayState::new(RelayConfig::default());
        let mut alice = join(&state, "alice");
        let bob = join(&state, "bob");
        let p = participants(&state, "alice", "bob");
        state.close_channel(bob.channel);
        alice.events();

        handle_client_event(&state, alice.channel, ClientEvent::Call(p.clone()));
        assert_eq!(
            alice.events(),
            vec![ServerEvent::CallUnreachable { participants: p }]
        );
    }

    #[test]
    fn test_call_on_behalf_of_someone_else_is_refused() {
        let state = RelayState::new(RelayConfig::default());
        let mut alice = join(&state, "alice");
        let mut bob = join(&state, "bob");
        let mut mallory = join(&state, "mallory");
        for c in [&mut alice, &mut bob, &mut mallory] {
            c.events();
        }

        let p = participants(&state, "alice", "bob");
        handle_client_event(&state, mallory.channel, ClientEvent::Call(p));

        assert!(matches!(&mallory.events()[..], [ServerEvent::Error { .. }]));
        assert!(bob.events().is_empty());
    }

    #[test]
    fn test_signal_goes_to_other_participant() {
        let state = RelayState::new(RelayConfig::default());
        let mut alice = join(&state, "alice");
        let mut bob = join(&state, "bob");
        alice.events();
        bob.events();

        let p = participants(&state, "alice", "bob");
        let from_bob = offer_envelope(p.clone(), false);
        handle_client_event(&state, bob.channel, ClientEvent::WebrtcSignal(from_bob.clone()));
        assert_eq!(alice.events(), vec![ServerEvent::WebrtcSignal(from_bob)]);
        assert!(bob.events().is_empty());

        let from_alice = offer_envelope(p, true);
        handle_client_event(&state, alice.channel, ClientEvent::WebrtcSignal(from_alice.clone()));
        assert_eq!(bob.events(), vec![ServerEvent::WebrtcSignal(from_alice)]);
    }

    #[test]
    fn test_signal_routes_by_current_channel() {
        let state = RelayState::new(RelayConfig::default());
        let mut alice = join(&state, "alice");
        let bob = join(&state, "bob");
        let p = participants(&state, "alice", "bob");

        // Bob reconnects; the envelope still names his old channel.
        let mut bob_again = join(&state, "bob");
        state.close_channel(bob.channel);
        alice.events();
        bob_again.events();

        handle_client_event(&state, alice.channel, ClientEvent::WebrtcSignal(offer_envelope(p, true)));
        assert_eq!(bob_again.events().len(), 1);
    }

    #[test]
    fn test_signal_from_outsider_is_dropped() {
        let state = RelayState::new(RelayConfig::default());
        let mut alice = join(&state, "alice");
        let mut bob = join(&state, "bob");
        let mut mallory = join(&state, "mallory");
        for c in [&mut alice, &mut bob, &mut mallory] {
            c.events();
        }

        let p = participants(&state, "alice", "bob");
        handle_client_event(&state, mallory.channel, ClientEvent::WebrtcSignal(offer_envelope(p, true)));

        assert!(alice.events().is_empty());
        assert!(bob.events().is_empty());
        assert!(mallory.events().is_empty());
    }

    #[test]
    fn test_hangup_forwarded_to_other_side_only() {
        let state = RelayState::new(RelayConfig::default());
        let mut alice = join(&state, "alice");
        let mut bob = join(&state, "bob");
        alice.events();
        bob.events();

        let payload = HangupPayload {
            ongoing_call: Some(OngoingCall {
                participants: participants(&state, "alice", "bob"),
                is_ringing: true,
            }),
            user_hangingup_id: Some("bob".into()),
            reason: Some(HangupReason::Declined),
        };
        handle_client_event(&state, bob.channel, ClientEvent::Hangup(payload.clone()));

        assert_eq!(alice.events(), vec![ServerEvent::Hangup(payload)]);
        assert!(bob.events().is_empty());
    }

    #[test]
    fn test_hangup_without_call_is_ignored() {
        let state = RelayState::new(RelayConfig::default());
        let mut alice = join(&state, "alice");
        let mut bob = join(&state, "bob");
        alice.events();
        bob.events();

        handle_client_event(&state, alice.channel, ClientEvent::Hangup(HangupPayload::default()));
        assert!(alice.events().is_empty());
        assert!(bob.events().is_empty());
    }

    #[test]
    fn test_ping_pong() {
        let state = RelayState::new(RelayConfig::default());
        let mut client = open(&state);
        handle_client_event(&state, client.channel, ClientEvent::Ping);
        assert_eq!(client.events(), vec![ServerEvent::Pong]);
    }
}
