//! In-call chat relay.
//!
//! A chat line is delivered only between the two participants of the call it
//! names, and only when the sender really is the user bound to the channel
//! it arrived on. Rejections go back to the sender as `messageError`; they
//! never close the connection.

use signcall_core::protocol::{
    ChannelId, ChatMessage, MessageError, MessageErrorKind, MessagePayload, OnlineUser, ServerEvent,
};
use signcall_core::time;

use crate::registry::PresenceRegistry;
use crate::state::RelayState;

/// Check `payload` against the registry, returning the recipient's entry.
///
/// Checks run in a fixed order and the first failure wins:
/// sender online on `origin`, call attached, sender in call, recipient online.
pub fn validate(
    registry: &PresenceRegistry,
    origin: ChannelId,
    payload: &MessagePayload,
) -> Result<OnlineUser, MessageErrorKind> {
    let sender_online = registry
        .find_by_user(&payload.sender_id)
        .is_some_and(|u| u.channel_id == origin);
    if !sender_online {
        return Err(MessageErrorKind::SenderNotOnline);
    }

    let call = payload
        .ongoing_call
        .as_ref()
        .ok_or(MessageErrorKind::NoActiveCall)?;

    let recipient = call
        .participants
        .other(&payload.sender_id)
        .ok_or(MessageErrorKind::SenderNotInCall)?;

    registry
        .find_by_user(&recipient.user_id)
        .cloned()
        .ok_or(MessageErrorKind::RecipientNotOnline)
}

/// Validate and forward one chat message.
pub fn relay_message(state: &RelayState, origin: ChannelId, payload: MessagePayload) {
    let validated = validate(&state.registry(), origin, &payload);

    let recipient = match validated {
        Ok(recipient) => recipient,
        Err(kind) => {
            tracing::warn!(
                sender = payload.sender_id.as_str(),
                code = ?kind,
                "Rejected chat message"
            );
            state.send_to_channel(origin, ServerEvent::MessageError(MessageError::from(kind)));
            return;
        }
    };

    let message = ChatMessage {
        sender_id: payload.sender_id,
        message: payload.message,
        timestamp: payload.timestamp.unwrap_or_else(time::now),
    };
    tracing::debug!(
        sender = message.sender_id.as_str(),
        recipient = recipient.user_id.as_str(),
        "Relaying chat message"
    );

    if !state.send_to_channel(recipient.channel_id, ServerEvent::ReceiveMessage(message)) {
        state.send_to_channel(
            origin,
            ServerEvent::MessageError(MessageErrorKind::RecipientNotOnline.into()),
        );
    }
}
