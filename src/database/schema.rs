pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS t_files (
        file_id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_name TEXT,
        file_path TEXT,
        import_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS t_tags (
        tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
        parent TEXT NOT NULL,
        name TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS t_files_tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL,
        tag_id INTEGER NOT NULL,
        FOREIGN KEY(file_id) REFERENCES t_files(file_id) ON DELETE CASCADE,
        FOREIGN KEY(tag_id) REFERENCES t_tags(tag_id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_tags_parent_name ON t_tags(parent, name);
    CREATE INDEX IF NOT EXISTS idx_files_tags_tag ON t_files_tags(tag_id);
    CREATE INDEX IF NOT EXISTS idx_files_tags_file ON t_files_tags(file_id);
";

/// Name stored in `t_tags.name` for the row that only records a dimension.
pub const SENTINEL_TAG: &str = "";
