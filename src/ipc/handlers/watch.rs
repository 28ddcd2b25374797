use crate::codes;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request, Subscription};
use serde_json::json;
use uuid::Uuid;

const WATCHABLE_TABLES: [&str; 2] = ["grades", "attendance"];

/// Queue one change event per subscription matching (table, student).
/// The main loop flushes the queue after the triggering response line, so
/// consumers can re-fetch knowing the write is already acknowledged. The
/// payload names the key only; the policy is re-fetch, not incremental merge.
pub fn notify_change(state: &mut AppState, table: &str, student_code: &str, op: &str) {
    let matching: Vec<String> = state
        .subscriptions
        .iter()
        .filter(|s| s.table == table && s.student_code == student_code)
        .map(|s| s.id.clone())
        .collect();
    for subscription_id in matching {
        state.push_event(json!({
            "event": "change",
            "subscriptionId": subscription_id,
            "table": table,
            "studentCode": student_code,
            "op": op,
        }));
    }
}

fn handle_subscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let table = match req.params.get("table").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing table", None),
    };
    if !WATCHABLE_TABLES.contains(&table.as_str()) {
        return err(
            &req.id,
            "bad_params",
            format!("table must be one of: {}", WATCHABLE_TABLES.join(", ")),
            None,
        );
    }
    let student_code = match req.params.get("studentCode").and_then(|v| v.as_str()) {
        Some(v) => codes::normalize(v),
        None => return err(&req.id, "bad_params", "missing studentCode", None),
    };

    let id = Uuid::new_v4().to_string();
    state.subscriptions.push(Subscription {
        id: id.clone(),
        table,
        student_code,
    });
    ok(&req.id, json!({ "subscriptionId": id }))
}

fn handle_unsubscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match req.params.get("subscriptionId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing subscriptionId", None),
    };
    let before = state.subscriptions.len();
    state.subscriptions.retain(|s| s.id != id);
    if state.subscriptions.len() == before {
        return err(&req.id, "not_found", "unknown subscription", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "watch.subscribe" => Some(handle_subscribe(state, req)),
        "watch.unsubscribe" => Some(handle_unsubscribe(state, req)),
        _ => None,
    }
}
