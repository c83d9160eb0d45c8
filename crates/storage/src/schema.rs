use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS classes (
    class_id BLOB PRIMARY KEY CHECK (length(class_id) = 16),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    class_type TEXT NOT NULL,
    credit_hours INTEGER NOT NULL CHECK (credit_hours > 0),
    is_favorite INTEGER NOT NULL DEFAULT 0,
    color BLOB NOT NULL,
    sort_key INTEGER NOT NULL UNIQUE
);

-- Every sort key ever issued. AUTOINCREMENT keys are never reused.
CREATE TABLE IF NOT EXISTS sort_keys (
    sort_key INTEGER PRIMARY KEY AUTOINCREMENT
);

CREATE TABLE IF NOT EXISTS semesters (
    semester_id BLOB PRIMARY KEY CHECK (length(semester_id) = 16),
    class_id BLOB NOT NULL UNIQUE REFERENCES classes (class_id) ON DELETE CASCADE,
    term TEXT NOT NULL,
    year INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_semesters_term_year ON semesters (term, year);

CREATE TABLE IF NOT EXISTS grades (
    grade_id BLOB PRIMARY KEY CHECK (length(grade_id) = 16),
    class_id BLOB NOT NULL UNIQUE REFERENCES classes (class_id) ON DELETE CASCADE,
    score REAL NOT NULL,
    letter TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rubrics (
    rubric_id BLOB PRIMARY KEY CHECK (length(rubric_id) = 16),
    class_id BLOB NOT NULL REFERENCES classes (class_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    weight REAL NOT NULL CHECK (weight >= 0)
);
CREATE INDEX IF NOT EXISTS idx_rubrics_class ON rubrics (class_id, position);

CREATE TABLE IF NOT EXISTS assignments (
    assignment_id BLOB PRIMARY KEY CHECK (length(assignment_id) = 16),
    class_id BLOB NOT NULL REFERENCES classes (class_id) ON DELETE CASCADE,
    rubric_id BLOB REFERENCES rubrics (rubric_id) ON DELETE SET NULL,
    name TEXT NOT NULL,
    date TEXT NOT NULL,
    score REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments (class_id, date);

CREATE TABLE IF NOT EXISTS grade_scale (
    scale_key INTEGER PRIMARY KEY CHECK (scale_key = 1),
    scale_type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS grade_percentages (
    scale_key INTEGER NOT NULL REFERENCES grade_scale (scale_key) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    letter TEXT NOT NULL,
    lower_bound REAL NOT NULL,
    upper_bound REAL NOT NULL,
    PRIMARY KEY (scale_key, position)
);
";
