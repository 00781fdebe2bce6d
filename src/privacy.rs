//! Drops messages whose authors opted out of indexing on a server.

use std::collections::{BTreeSet, HashSet};

use serenity::model::id::{GuildId, UserId};
use tracing::debug;

use crate::db::Database;
use crate::model::RawMessage;
use crate::settings::UserServerSettings;

/// Removes every message authored by a user with indexing disabled on
/// `server_id`. System messages are kept whoever their author is.
///
/// A failed settings lookup fails the whole filter; nothing is indexed
/// unchecked.
pub async fn filter_messages(
    db: &Database,
    messages: Vec<RawMessage>,
    server_id: GuildId,
) -> anyhow::Result<Vec<RawMessage>> {
    if messages.is_empty() {
        return Ok(messages);
    }

    let authors: BTreeSet<UserId> = messages.iter().map(|m| m.author.id).collect();
    let pairs: Vec<(UserId, GuildId)> = authors.into_iter().map(|a| (a, server_id)).collect();
    let settings = db
        .run_blocking(move |db| db.find_user_server_settings_many(&pairs))
        .await?;

    let before = messages.len();
    let kept = retain_permitted(messages, &settings);
    if kept.len() != before {
        debug!(
            server = server_id.get(),
            dropped = before - kept.len(),
            "Privacy filter removed opted-out messages"
        );
    }
    Ok(kept)
}

/// The pure half of [`filter_messages`].
pub fn retain_permitted(messages: Vec<RawMessage>, settings: &[UserServerSettings]) -> Vec<RawMessage> {
    let opted_out: HashSet<UserId> = settings
        .iter()
        .filter(|s| s.message_indexing_disabled)
        .map(|s| s.user_id)
        .collect();
    if opted_out.is_empty() {
        return messages;
    }
    messages
        .into_iter()
        .filter(|m| m.system || !opted_out.contains(&m.author.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::UserSettingsChange;
    use crate::testing;

    fn test_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_system_messages_survive_opt_out() {
        let mut joined = testing::message(3, 10, 7);
        joined.system = true;
        let messages = vec![testing::message(1, 10, 7), testing::message(2, 10, 8), joined];

        let mut opted_out = UserServerSettings::new(UserId::new(7), GuildId::new(1));
        opted_out.message_indexing_disabled = true;

        let kept = retain_permitted(messages, &[opted_out]);
        let ids: Vec<u64> = kept.iter().map(|m| m.id.get()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_filter_is_scoped_to_server() {
        let db = test_db();
        db.update_user_server_settings(UserId::new(7), GuildId::new(2), UserSettingsChange::DisableIndexing)
            .unwrap();
        db.update_user_server_settings(UserId::new(8), GuildId::new(1), UserSettingsChange::DisableIndexing)
            .unwrap();
        db.update_user_server_settings(UserId::new(8), GuildId::new(1), UserSettingsChange::EnableIndexing)
            .unwrap();

        let messages = vec![
            testing::message(1, 10, 7),
            testing::message(2, 10, 8),
            testing::message(3, 10, 9),
        ];
        let kept = filter_messages(&db, messages, GuildId::new(1)).await.unwrap();
        assert_eq!(kept.len(), 3);

        let messages = vec![testing::message(4, 10, 7), testing::message(5, 10, 9)];
        let kept = filter_messages(&db, messages, GuildId::new(2)).await.unwrap();
        let ids: Vec<u64> = kept.iter().map(|m| m.id.get()).collect();
        assert_eq!(ids, vec![5]);
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_closed() {
        let db = test_db();
        db.execute_raw("DROP TABLE user_server_settings;");
        let result = filter_messages(&db, vec![testing::message(1, 10, 7)], GuildId::new(1)).await;
        assert!(result.is_err());
    }
}
