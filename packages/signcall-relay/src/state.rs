//! Server state management.
//!
//! Tracks open WebSocket channels and the presence registry. Channel senders
//! live in a DashMap; the registry is a single ordered table behind a mutex
//! that is only ever held for synchronous work.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;

use signcall_core::protocol::{ChannelId, OnlineUser, Profile, ServerEvent};

use crate::registry::{PresenceRegistry, RegisterOutcome};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerEvent>;

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// Channel id → sender for every open connection, registered or not.
    pub channels: Arc<DashMap<ChannelId, ClientSender>>,

    /// Users that announced themselves with `addNewUser`.
    registry: Arc<Mutex<PresenceRegistry>>,

    /// Server configuration.
    pub config: RelayConfig,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            registry: Arc::new(Mutex::new(PresenceRegistry::new())),
            config,
        }
    }

    /// Lock the presence registry. Never hold the guard across an await.
    ///
    /// Lock order is registry first, then the channel map.
    pub fn registry(&self) -> MutexGuard<'_, PresenceRegistry> {
        self.registry.lock()
    }

    // ── Channel Management ────────────────────────────────────────────────

    pub fn open_channel(&self, channel_id: ChannelId, sender: ClientSender) {
        tracing::debug!(channel = %channel_id, "Channel opened");
        self.channels.insert(channel_id, sender);
    }

    /// Forget a closed channel. Returns the user that was bound to it and
    /// re-broadcasts presence when there was one.
    pub fn close_channel(&self, channel_id: ChannelId) -> Option<OnlineUser> {
        self.channels.remove(&channel_id);
        let mut registry = self.registry();
        let removed = registry.unregister(channel_id);

        if let Some(user) = &removed {
            tracing::info!(user = user.user_id.as_str(), channel = %channel_id, "User went offline");
            self.send_listing(&registry);
        }
        removed
    }

    /// Send an event to one channel. Returns true if it was queued.
    pub fn send_to_channel(&self, channel_id: ChannelId, event: ServerEvent) -> bool {
        if let Some(sender) = self.channels.get(&channel_id) {
            sender.send(event).is_ok()
        } else {
            false
        }
    }

    /// Send an event to the channel a user is currently registered on.
    pub fn send_to_user(&self, user_id: &str, event: ServerEvent) -> bool {
        let channel = self.registry().find_by_user(user_id).map(|u| u.channel_id);
        match channel {
            Some(channel) => self.send_to_channel(channel, event),
            None => false,
        }
    }

    // ── Presence ──────────────────────────────────────────────────────────

    /// Register `profile` on `channel_id` and broadcast the new listing.
    pub fn register_user(&self, channel_id: ChannelId, profile: Profile) -> RegisterOutcome {
        let user_id = profile.id.clone();
        let mut registry = self.registry();
        let outcome = registry.register(&user_id, channel_id, profile);

        match outcome {
            RegisterOutcome::Added => {
                tracing::info!(user = user_id.as_str(), channel = %channel_id, "User online")
            }
            RegisterOutcome::Rebound { previous } => tracing::info!(
                user = user_id.as_str(),
                channel = %channel_id,
                previous = %previous,
                "User reconnected"
            ),
            RegisterOutcome::Unchanged => {
                tracing::debug!(user = user_id.as_str(), "Repeated registration")
            }
        }

        self.send_listing(&registry);
        outcome
    }

    /// Send the full listing to every open channel.
    pub fn broadcast_presence(&self) {
        self.send_listing(&self.registry());
    }

    /// Queue `registry`'s listing on every channel. Callers hold the
    /// registry lock so listings reach each channel in mutation order.
    fn send_listing(&self, registry: &PresenceRegistry) {
        let users = registry.list();
        for entry in self.channels.iter() {
            let _ = entry.value().send(ServerEvent::GetUsers(users.clone()));
        }
    }

    /// The user bound to `channel_id`, if any.
    pub fn user_for_channel(&self, channel_id: ChannelId) -> Option<OnlineUser> {
        self.registry().find_by_channel(channel_id).cloned()
    }

    pub fn find_user(&self, user_id: &str) -> Option<OnlineUser> {
        self.registry().find_by_user(user_id).cloned()
    }

    pub fn online_count(&self) -> usize {
        self.registry().len()
    }

    pub fn open_channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(state: &RelayState) -> (ChannelId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = ChannelId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        state.open_channel(id, tx);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 4000);
        assert_eq!(config.bind_addr(), "0.0.0.0:4000");
    }

    #[test]
    fn test_register_broadcasts_to_every_channel() {
        let state = RelayState::new(RelayConfig::default());
        let (alice, mut alice_rx) = channel(&state);
        let (_lurker, mut lurker_rx) = channel(&state);

        state.register_user(alice, Profile::new("alice"));

        for rx in [&mut alice_rx, &mut lurker_rx] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            assert!(matches!(&events[0], ServerEvent::GetUsers(users) if users.len() == 1));
        }
        assert_eq!(state.online_count(), 1);
        assert_eq!(state.open_channel_count(), 2);
    }

    #[test]
    fn test_close_registered_channel_rebroadcasts() {
        let state = RelayState::new(RelayConfig::default());
        let (alice, _alice_rx) = channel(&state);
        let (bob, mut bob_rx) = channel(&state);
        state.register_user(alice, Profile::new("alice"));
        state.register_user(bob, Profile::new("bob"));
        drain(&mut bob_rx);

        let removed = state.close_channel(alice).unwrap();
        assert_eq!(removed.user_id, "alice");

        let events = drain(&mut bob_rx);
        assert!(matches!(
            &events[..],
            [ServerEvent::GetUsers(users)] if users.len() == 1 && users[0].user_id == "bob"
        ));
    }

    #[test]
    fn test_close_unregistered_channel_is_quiet() {
        let state = RelayState::new(RelayConfig::default());
        let (lurker, _rx) = channel(&state);
        let (bob, mut bob_rx) = channel(&state);
        state.register_user(bob, Profile::new("bob"));
        drain(&mut bob_rx);

        assert!(state.close_channel(lurker).is_none());
        assert!(drain(&mut bob_rx).is_empty());
        assert_eq!(state.open_channel_count(), 1);
    }

    #[test]
    fn test_send_to_user_follows_reconnect() {
        let state = RelayState::new(RelayConfig::default());
        let (old, mut old_rx) = channel(&state);
        let (new, mut new_rx) = channel(&state);

        state.register_user(old, Profile::new("alice"));
        state.register_user(new, Profile::new("alice"));
        drain(&mut old_rx);
        drain(&mut new_rx);

        assert!(state.send_to_user("alice", ServerEvent::Pong));
        assert!(drain(&mut old_rx).is_empty());
        assert_eq!(drain(&mut new_rx), vec![ServerEvent::Pong]);
        assert!(!state.send_to_user("nobody", ServerEvent::Pong));
    }

    #[test]
    fn test_last_listing_matches_registry_under_concurrent_registration() {
        use std::sync::Barrier;

        for _ in 0..200 {
            let state = RelayState::new(RelayConfig::default());
            let (_observer, mut observer_rx) = channel(&state);
            let registrants: Vec<ChannelId> = (0..4).map(|_| channel(&state).0).collect();
            let barrier = Arc::new(Barrier::new(registrants.len()));

            let handles: Vec<_> = registrants
                .into_iter()
                .enumerate()
                .map(|(i, id)| {
                    let state = state.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        state.register_user(id, Profile::new(format!("user-{i}")));
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let last = drain(&mut observer_rx)
                .into_iter()
                .filter_map(|e| match e {
                    ServerEvent::GetUsers(users) => Some(users),
                    _ => None,
                })
                .last()
                .unwrap();
            assert_eq!(last.len(), state.online_count());
        }
    }

    #[test]
    fn test_send_to_closed_channel_returns_false() {
        let state = RelayState::new(RelayConfig::default());
        assert!(!state.send_to_channel(ChannelId::new(), ServerEvent::Pong));
    }
}
