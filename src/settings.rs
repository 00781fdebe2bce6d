//! Per-channel, per-server and per-(user, server) settings, and the flat set of
//! changes that can be applied to them.
//!
//! Settings rows are created lazily with default values on first write and are
//! only ever flag-flipped afterwards.

use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, ForumTagId, GuildId, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub channel_id: ChannelId,
    pub indexing_enabled: bool,
    pub mark_solution_enabled: bool,
    /// Posting in this channel already grants public-display consent.
    pub forum_guidelines_consent_enabled: bool,
    /// Forum tag applied to a thread to mark it solved.
    pub solution_tag_id: Option<ForumTagId>,
    /// Newest message already persisted for this channel.
    pub last_indexed_snowflake: Option<MessageId>,
}

impl ChannelSettings {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            indexing_enabled: false,
            mark_solution_enabled: false,
            forum_guidelines_consent_enabled: false,
            solution_tag_id: None,
            last_indexed_snowflake: None,
        }
    }

    pub fn apply(&mut self, change: ChannelSettingsChange) {
        match change {
            ChannelSettingsChange::EnableIndexing => self.indexing_enabled = true,
            ChannelSettingsChange::DisableIndexing => self.indexing_enabled = false,
            ChannelSettingsChange::SetMarkSolution(enabled) => self.mark_solution_enabled = enabled,
            ChannelSettingsChange::SetSolutionTag(tag) => self.solution_tag_id = tag,
            ChannelSettingsChange::SetForumGuidelinesConsent(enabled) => {
                self.forum_guidelines_consent_enabled = enabled
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSettingsChange {
    EnableIndexing,
    DisableIndexing,
    SetMarkSolution(bool),
    SetSolutionTag(Option<ForumTagId>),
    SetForumGuidelinesConsent(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub server_id: GuildId,
    pub consider_all_messages_public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserServerSettings {
    pub user_id: UserId,
    pub server_id: GuildId,
    pub message_indexing_disabled: bool,
    pub can_publicly_display_messages: bool,
}

impl UserServerSettings {
    pub fn new(user_id: UserId, server_id: GuildId) -> Self {
        Self {
            user_id,
            server_id,
            message_indexing_disabled: false,
            can_publicly_display_messages: false,
        }
    }

    /// Applies `change` and re-establishes the invariant that a user with
    /// indexing disabled never has public-display consent.
    pub fn apply(&mut self, change: UserSettingsChange) {
        match change {
            UserSettingsChange::DisableIndexing => self.message_indexing_disabled = true,
            UserSettingsChange::EnableIndexing => self.message_indexing_disabled = false,
            UserSettingsChange::GrantConsent => self.can_publicly_display_messages = true,
            UserSettingsChange::RevokeConsent => self.can_publicly_display_messages = false,
        }
        if self.message_indexing_disabled {
            self.can_publicly_display_messages = false;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSettingsChange {
    DisableIndexing,
    EnableIndexing,
    GrantConsent,
    RevokeConsent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_settings_invariant() {
        let mut settings = UserServerSettings::new(UserId::new(1), GuildId::new(2));
        settings.apply(UserSettingsChange::GrantConsent);
        assert!(settings.can_publicly_display_messages);

        settings.apply(UserSettingsChange::DisableIndexing);
        assert!(settings.message_indexing_disabled);
        assert!(!settings.can_publicly_display_messages);

        // Consent cannot be granted while indexing stays disabled.
        settings.apply(UserSettingsChange::GrantConsent);
        assert!(!settings.can_publicly_display_messages);

        settings.apply(UserSettingsChange::EnableIndexing);
        settings.apply(UserSettingsChange::GrantConsent);
        assert!(settings.can_publicly_display_messages);
    }

    #[test]
    fn test_channel_settings_changes() {
        let mut settings = ChannelSettings::new(ChannelId::new(5));
        assert!(!settings.indexing_enabled);

        settings.apply(ChannelSettingsChange::EnableIndexing);
        settings.apply(ChannelSettingsChange::SetMarkSolution(true));
        settings.apply(ChannelSettingsChange::SetSolutionTag(Some(ForumTagId::new(9))));
        assert!(settings.indexing_enabled);
        assert!(settings.mark_solution_enabled);
        assert_eq!(settings.solution_tag_id, Some(ForumTagId::new(9)));

        settings.apply(ChannelSettingsChange::SetSolutionTag(None));
        assert_eq!(settings.solution_tag_id, None);
    }
}
