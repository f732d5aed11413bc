//! Table definitions used by the fixtures.

/// A plain keyed table: `items(id, title, body, modified_at)`.
pub fn items(prefix: &str) -> String {
    format!(
        "CREATE TABLE {prefix}items (
            id INTEGER PRIMARY KEY,
            title TEXT,
            body TEXT,
            modified_at TEXT
        );"
    )
}

/// A cut-down content schema: posts, postmeta, comments and options.
pub fn content(prefix: &str) -> String {
    format!(
        "CREATE TABLE {prefix}posts (
            ID INTEGER PRIMARY KEY,
            post_parent INTEGER NOT NULL DEFAULT 0,
            post_type TEXT NOT NULL DEFAULT 'post',
            post_title TEXT,
            post_content TEXT,
            post_modified TEXT
        );
        CREATE TABLE {prefix}postmeta (
            meta_id INTEGER PRIMARY KEY,
            post_id INTEGER NOT NULL,
            meta_key TEXT,
            meta_value TEXT
        );
        CREATE TABLE {prefix}comments (
            comment_ID INTEGER PRIMARY KEY,
            comment_post_ID INTEGER NOT NULL,
            comment_content TEXT
        );
        CREATE TABLE {prefix}options (
            option_id INTEGER PRIMARY KEY,
            option_name TEXT NOT NULL,
            option_value TEXT
        );"
    )
}
