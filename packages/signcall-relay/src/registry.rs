//! Presence registry.
//!
//! Ordered table of the users currently connected, one entry per user id.
//! Entries keep the position of their first registration, so the `getUsers`
//! listing is stable across reconnects.

use signcall_core::protocol::{ChannelId, OnlineUser, Profile};

/// What [`PresenceRegistry::register`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// New entry appended.
    Added,
    /// The user was already registered on this channel.
    Unchanged,
    /// The user reconnected on a new channel; the entry now points there.
    Rebound { previous: ChannelId },
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: Vec<OnlineUser>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `channel_id`.
    ///
    /// A channel speaks for one user: if it was bound to a different user,
    /// that entry is dropped first.
    pub fn register(&mut self, user_id: &str, channel_id: ChannelId, profile: Profile) -> RegisterOutcome {
        self.entries
            .retain(|e| e.channel_id != channel_id || e.user_id == user_id);

        match self.entries.iter_mut().find(|e| e.user_id == user_id) {
            Some(entry) if entry.channel_id == channel_id => RegisterOutcome::Unchanged,
            Some(entry) => {
                let previous = entry.channel_id;
                entry.channel_id = channel_id;
                entry.profile = profile;
                RegisterOutcome::Rebound { previous }
            }
            None => {
                self.entries.push(OnlineUser {
                    user_id: user_id.to_string(),
                    channel_id,
                    profile,
                });
                RegisterOutcome::Added
            }
        }
    }

    /// Remove the entry bound to `channel_id`, if any.
    pub fn unregister(&mut self, channel_id: ChannelId) -> Option<OnlineUser> {
        let index = self.entries.iter().position(|e| e.channel_id == channel_id)?;
        Some(self.entries.remove(index))
    }

    pub fn list(&self) -> Vec<OnlineUser> {
        self.entries.clone()
    }

    pub fn find_by_user(&self, user_id: &str) -> Option<&OnlineUser> {
        self.entries.iter().find(|e| e.user_id == user_id)
    }

    pub fn find_by_channel(&self, channel_id: ChannelId) -> Option<&OnlineUser> {
        self.entries.iter().find(|e| e.channel_id == channel_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ids(registry: &PresenceRegistry) -> Vec<String> {
        registry.list().into_iter().map(|u| u.user_id).collect()
    }

    #[test]
    fn test_register_appends_in_order() {
        let mut registry = PresenceRegistry::new();
        assert_eq!(
            registry.register("alice", ChannelId::new(), Profile::new("alice")),
            RegisterOutcome::Added
        );
        registry.register("bob", ChannelId::new(), Profile::new("bob"));
        assert_eq!(ids(&registry), vec!["alice", "bob"]);
    }

    #[test]
    fn test_same_channel_is_noop() {
        let mut registry = PresenceRegistry::new();
        let channel = ChannelId::new();
        registry.register("alice", channel, Profile::new("alice"));
        assert_eq!(
            registry.register("alice", channel, Profile::new("alice")),
            RegisterOutcome::Unchanged
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reconnect_rebinds_in_place() {
        let mut registry = PresenceRegistry::new();
        let old = ChannelId::new();
        let new = ChannelId::new();
        registry.register("alice", old, Profile::new("alice"));
        registry.register("bob", ChannelId::new(), Profile::new("bob"));

        let outcome = registry.register("alice", new, Profile::new("alice").with_full_name("Alice"));
        assert_eq!(outcome, RegisterOutcome::Rebound { previous: old });
        assert_eq!(ids(&registry), vec!["alice", "bob"]);

        let alice = registry.find_by_user("alice").unwrap();
        assert_eq!(alice.channel_id, new);
        assert_eq!(alice.profile.full_name.as_deref(), Some("Alice"));

        // The stale channel's disconnect must not remove the rebound entry.
        assert!(registry.unregister(old).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_channel_switching_user_drops_old_binding() {
        let mut registry = PresenceRegistry::new();
        let channel = ChannelId::new();
        registry.register("alice", channel, Profile::new("alice"));
        registry.register("bob", channel, Profile::new("bob"));

        assert_eq!(ids(&registry), vec!["bob"]);
        assert_eq!(registry.find_by_channel(channel).unwrap().user_id, "bob");
    }

    #[test]
    fn test_unregister_removes_matching_entry() {
        let mut registry = PresenceRegistry::new();
        let channel = ChannelId::new();
        registry.register("alice", channel, Profile::new("alice"));

        let removed = registry.unregister(channel).unwrap();
        assert_eq!(removed.user_id, "alice");
        assert!(registry.is_empty());
        assert!(registry.unregister(channel).is_none());
    }

    #[test]
    fn test_register_unregister_sequences_never_duplicate() {
        let users = ["alice", "bob", "carol"];
        let mut registry = PresenceRegistry::new();
        let mut channels = Vec::new();

        // Deterministic interleaving of connects, reconnects and disconnects.
        for step in 0..60usize {
            let user = users[step % users.len()];
            if step % 7 == 3 && !channels.is_empty() {
                let (_, channel): (&str, ChannelId) = channels.remove(step % channels.len());
                registry.unregister(channel);
            } else {
                let channel = ChannelId::new();
                registry.register(user, channel, Profile::new(user));
                channels.push((user, channel));
            }

            let listing = registry.list();
            let unique: HashSet<_> = listing.iter().map(|u| u.user_id.clone()).collect();
            assert_eq!(unique.len(), listing.len(), "duplicate user at step {}", step);
        }
    }
}
