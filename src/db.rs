use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::model::User;

/// Fixed slot for the single durable session row. Absence means logged out.
const SESSION_SLOT: &str = "current";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("madrasa.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            code TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            name TEXT NOT NULL,
            class TEXT NOT NULL,
            subject TEXT,
            group_type TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role_class ON users(role, class)",
        [],
    )?;

    // Grades are append-only history; no uniqueness across (student, subject).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_code TEXT NOT NULL,
            subject_key TEXT NOT NULL,
            value TEXT NOT NULL,
            term TEXT,
            teacher_code TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_code, created_at)",
        [],
    )?;

    // One row per (student, date, kind); repeated submissions overwrite the
    // status instead of accumulating. Enforced here, not left to callers.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_code TEXT NOT NULL,
            date TEXT NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            teacher_code TEXT NOT NULL,
            UNIQUE(student_code, date, kind)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_code, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session(
            slot TEXT PRIMARY KEY,
            user_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn session_save(conn: &Connection, user: &User) -> anyhow::Result<()> {
    let payload = serde_json::to_string(user)?;
    conn.execute(
        "INSERT INTO session(slot, user_json) VALUES(?, ?)
         ON CONFLICT(slot) DO UPDATE SET user_json = excluded.user_json",
        (SESSION_SLOT, &payload),
    )?;
    Ok(())
}

pub fn session_load(conn: &Connection) -> anyhow::Result<Option<User>> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT user_json FROM session WHERE slot = ?",
            [SESSION_SLOT],
            |r| r.get(0),
        )
        .optional()?;
    match payload {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn session_clear(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("DELETE FROM session WHERE slot = ?", [SESSION_SLOT])?;
    Ok(())
}
