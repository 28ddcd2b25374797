use crate::codes;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, user_row_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, User};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub fn fetch_user(conn: &Connection, code: &str) -> rusqlite::Result<Option<(User, String)>> {
    conn.query_row(
        "SELECT code, role, name, class, subject, group_type, created_at
         FROM users WHERE code = ?",
        [code],
        |r| {
            Ok((
                User {
                    code: r.get(0)?,
                    role: r.get(1)?,
                    name: r.get(2)?,
                    class: r.get(3)?,
                    subject: r.get(4)?,
                    group_type: r.get(5)?,
                },
                r.get::<_, String>(6)?,
            ))
        },
    )
    .optional()
}

/// Everything, newest account first. Ties on created_at fall back to
/// insertion order.
pub fn list_users(conn: &Connection) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT code, role, name, class, subject, group_type, created_at
             FROM users
             ORDER BY created_at DESC, rowid DESC",
        )
        .map_err(HandlerErr::db)?;
    stmt.query_map([], |r| {
        let user = User {
            code: r.get(0)?,
            role: r.get(1)?,
            name: r.get(2)?,
            class: r.get(3)?,
            subject: r.get(4)?,
            group_type: r.get(5)?,
        };
        let created_at: String = r.get(6)?;
        Ok(user_row_json(&user, &created_at))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db)
}

pub fn role_counts(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    conn.query_row(
        "SELECT
           COUNT(*),
           COUNT(*) FILTER (WHERE role = 'admin'),
           COUNT(*) FILTER (WHERE role = 'teacher'),
           COUNT(*) FILTER (WHERE role = 'student')
         FROM users",
        [],
        |r| {
            Ok(json!({
                "total": r.get::<_, i64>(0)?,
                "admins": r.get::<_, i64>(1)?,
                "teachers": r.get::<_, i64>(2)?,
                "students": r.get::<_, i64>(3)?,
            }))
        },
    )
    .map_err(HandlerErr::db)
}

fn users_create(conn: &Connection, params: &serde_json::Value) -> Result<User, HandlerErr> {
    let code = codes::normalize(&get_required_str(params, "code")?);
    if !codes::is_valid(&code) {
        // Re-checked here even though the login form validates too; the
        // admin form is another entry point for arbitrary codes.
        return Err(HandlerErr::new(
            "malformed_code",
            "code must be two letters followed by two digits",
        ));
    }
    let role = get_required_str(params, "role")?;
    if !model::ROLES.contains(&role.as_str()) {
        return Err(HandlerErr::bad_params(format!("unknown role: {}", role)));
    }
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let class = get_required_str(params, "class")?.trim().to_string();
    if class.is_empty() {
        return Err(HandlerErr::bad_params("class must not be empty"));
    }
    let subject = get_optional_str(params, "subject");
    let group_type = get_optional_str(params, "groupType");
    if let Some(g) = group_type.as_deref() {
        if !model::GROUP_TYPES.contains(&g) {
            return Err(HandlerErr::bad_params(format!("unknown group type: {}", g)));
        }
    }

    let user = User {
        code,
        role,
        name,
        class,
        subject,
        group_type,
    };
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    conn.execute(
        "INSERT INTO users(code, role, name, class, subject, group_type, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &user.code,
            &user.role,
            &user.name,
            &user.class,
            &user.subject,
            &user.group_type,
            &created_at,
        ),
    )
    .map_err(|e| {
        let msg = e.to_string();
        if msg.contains("UNIQUE constraint failed") {
            HandlerErr::new("constraint_violation", "code already exists")
        } else {
            HandlerErr::new("write_error", msg)
        }
    })?;
    Ok(user)
}

fn users_delete(conn: &Connection, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let code = codes::normalize(&get_required_str(params, "code")?);
    let affected = conn
        .execute("DELETE FROM users WHERE code = ?", [&code])
        .map_err(|e| HandlerErr::new("write_error", e.to_string()))?;
    if affected == 0 {
        return Err(HandlerErr::new("write_error", "no user with that code"));
    }
    // Grade and attendance history referencing the code is left in place.
    Ok(())
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match list_users(conn) {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match users_create(conn, &req.params) {
        Ok(user) => ok(
            &req.id,
            json!({ "user": serde_json::to_value(&user).unwrap_or_default() }),
        ),
        Err(e) => e.response(&req.id),
    }
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match users_delete(conn, &req.params) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_users_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match role_counts(conn) {
        Ok(stats) => ok(&req.id, stats),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(handle_users_list(state, req)),
        "users.create" => Some(handle_users_create(state, req)),
        "users.delete" => Some(handle_users_delete(state, req)),
        "users.stats" => Some(handle_users_stats(state, req)),
        _ => None,
    }
}
