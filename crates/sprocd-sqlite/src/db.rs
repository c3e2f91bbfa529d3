use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Create the procedure table. Safe to call on every connect (idempotent).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS stored_procedures (
            name        TEXT PRIMARY KEY,
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    )
}

/// Insert or replace the SQL body stored under `name`.
pub fn register_procedure(conn: &Connection, name: &str, body: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO stored_procedures (name, body, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(name) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        params![name, body, now],
    )?;
    Ok(())
}

pub fn procedure_body(conn: &Connection, name: &str) -> Result<Option<String>> {
    let body = conn
        .query_row(
            "SELECT body FROM stored_procedures WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(body)
}

/// Registered procedure names, alphabetically.
pub fn list_procedures(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM stored_procedures ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}
