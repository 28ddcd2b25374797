use crate::codes;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::users;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let raw = match req.params.get("code").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing code", None),
    };
    let code = codes::normalize(raw);
    if !codes::is_valid(&code) {
        // Shape check runs before touching the database.
        return err(
            &req.id,
            "malformed_code",
            "code must be two letters followed by two digits",
            None,
        );
    }

    // Zero rows and query failures collapse into one generic answer so the
    // login form cannot be used to probe which codes exist.
    let found = match users::fetch_user(conn, &code) {
        Ok(v) => v,
        Err(_) => None,
    };
    let Some((user, _created_at)) = found else {
        return err(&req.id, "invalid_credential", "invalid login code", None);
    };

    if let Err(e) = db::session_save(conn, &user) {
        return err(&req.id, "write_error", e.to_string(), None);
    }
    state.session = Some(user.clone());
    ok(
        &req.id,
        json!({ "user": serde_json::to_value(&user).unwrap_or_default() }),
    )
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = state
        .session
        .as_ref()
        .map(|u| serde_json::to_value(u).unwrap_or_default());
    ok(&req.id, json!({ "user": user }))
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = db::session_clear(conn) {
            return err(&req.id, "write_error", e.to_string(), None);
        }
    }
    state.session = None;
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.current" => Some(handle_current(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        _ => None,
    }
}
