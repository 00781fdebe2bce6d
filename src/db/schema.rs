/// Idempotent schema. Snowflakes are stored as INTEGER; flattened collections
/// (attachments, embeds, reactions, tags, solutions) as JSON text.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS servers (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        icon TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS server_settings (
        server_id INTEGER PRIMARY KEY,
        consider_all_messages_public BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS channels (
        id INTEGER PRIMARY KEY,
        server_id INTEGER NOT NULL REFERENCES servers (id),
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        parent_id INTEGER,
        invite_code TEXT,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_channels_server ON channels (server_id);

    CREATE TABLE IF NOT EXISTS channel_settings (
        channel_id INTEGER PRIMARY KEY,
        indexing_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        mark_solution_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        forum_guidelines_consent_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        solution_tag_id INTEGER,
        last_indexed_snowflake INTEGER,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS user_server_settings (
        user_id INTEGER NOT NULL,
        server_id INTEGER NOT NULL,
        message_indexing_disabled BOOLEAN NOT NULL DEFAULT FALSE,
        can_publicly_display_messages BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (user_id, server_id)
    );

    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        avatar TEXT
    );

    CREATE TABLE IF NOT EXISTS threads (
        id INTEGER PRIMARY KEY,
        server_id INTEGER NOT NULL,
        parent_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        archived BOOLEAN NOT NULL DEFAULT FALSE,
        archived_at DATETIME,
        applied_tags TEXT NOT NULL DEFAULT '[]'
    );
    CREATE INDEX IF NOT EXISTS idx_threads_parent ON threads (parent_id);

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY,
        channel_id INTEGER NOT NULL,
        server_id INTEGER NOT NULL,
        author_id INTEGER NOT NULL,
        thread_id INTEGER,
        parent_channel_id INTEGER,
        content TEXT NOT NULL,
        solutions TEXT NOT NULL DEFAULT '[]',
        attachments TEXT NOT NULL DEFAULT '[]',
        embeds TEXT NOT NULL DEFAULT '[]',
        reactions TEXT NOT NULL DEFAULT '[]',
        created_at DATETIME NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages (channel_id, id);

    CREATE TABLE IF NOT EXISTS thread_backlog (
        thread_id INTEGER PRIMARY KEY,
        channel_id INTEGER NOT NULL,
        resume_after INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_thread_backlog_channel ON thread_backlog (channel_id);
    CREATE INDEX IF NOT EXISTS idx_messages_author ON messages (author_id, server_id);
";
