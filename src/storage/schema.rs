use rusqlite::{Connection, functions::FunctionFlags};

pub mod tables {
    pub const TRACKS: &str = "tracks";

    pub const ALL_TABLES: &[&str] = &[TRACKS];
}

pub mod columns {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const ARTIST: &str = "artist";
    pub const DESCRIPTION: &str = "description";
    pub const CATEGORY: &str = "category";
    pub const DURATION: &str = "duration";
    pub const FILE_URL: &str = "file_url";
    pub const FILE_SIZE: &str = "file_size";
    pub const COVER_IMAGE: &str = "cover_image";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

pub use columns::*;
pub use tables::*;

// AUTOINCREMENT keeps ids of deleted rows from being handed out again
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    artist TEXT NOT NULL,
    description TEXT,
    category TEXT NOT NULL,
    duration INTEGER NOT NULL DEFAULT 0,
    file_url TEXT,
    file_size INTEGER,
    cover_image TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK ((file_url IS NULL) = (file_size IS NULL))
);

CREATE INDEX IF NOT EXISTS tracks_category ON tracks (category);
"#;

/// SQL name of the Unicode-aware lowercase function, SQLite's own `lower` folds ASCII only
pub const FOLD_CASE: &str = "fold_case";

/// Registers connection-local SQL functions. Has to run on every new connection.
pub fn register_functions(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.create_scalar_function(
        FOLD_CASE,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )
}

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    register_functions(conn)?;
    conn.execute_batch(SCHEMA)
}
