use crate::codes;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::watch;
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub fn list_for_student(
    conn: &Connection,
    student_code: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, student_code, date, kind, status, teacher_code
             FROM attendance
             WHERE student_code = ?
             ORDER BY date DESC, rowid DESC",
        )
        .map_err(HandlerErr::db)?;
    stmt.query_map([student_code], |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "studentCode": r.get::<_, String>(1)?,
            "date": r.get::<_, String>(2)?,
            "kind": r.get::<_, String>(3)?,
            "status": r.get::<_, String>(4)?,
            "teacherCode": r.get::<_, String>(5)?,
        }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db)
}

fn validate_shared(params: &serde_json::Value) -> Result<(String, String, String), HandlerErr> {
    let date = get_required_str(params, "date")?;
    if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
        return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
    }
    let kind = get_required_str(params, "kind")?;
    if !model::ATTENDANCE_KINDS.contains(&kind.as_str()) {
        return Err(HandlerErr::bad_params(format!("unknown kind: {}", kind)));
    }
    let teacher_code = codes::normalize(&get_required_str(params, "teacherCode")?);
    Ok((date, kind, teacher_code))
}

fn validate_status(status: &str) -> Result<(), HandlerErr> {
    if !model::ATTENDANCE_STATUSES.contains(&status) {
        return Err(HandlerErr::bad_params(format!("unknown status: {}", status)));
    }
    Ok(())
}

fn student_exists(conn: &Connection, code: &str) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM users WHERE code = ? AND role = 'student'",
        [code],
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db)
}

// Repeated submissions for the same (student, date, kind) overwrite the
// status and teacher, keeping the original row id.
fn upsert_record(
    conn: &Connection,
    student_code: &str,
    date: &str,
    kind: &str,
    status: &str,
    teacher_code: &str,
) -> Result<(), HandlerErr> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO attendance(id, student_code, date, kind, status, teacher_code)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_code, date, kind) DO UPDATE SET
           status = excluded.status,
           teacher_code = excluded.teacher_code",
        (&id, student_code, date, kind, status, teacher_code),
    )
    .map_err(|e| HandlerErr::new("write_error", e.to_string()))?;
    Ok(())
}

fn attendance_mark(conn: &Connection, params: &serde_json::Value) -> Result<String, HandlerErr> {
    let (date, kind, teacher_code) = validate_shared(params)?;
    let student_code = codes::normalize(&get_required_str(params, "studentCode")?);
    let status = get_required_str(params, "status")?;
    validate_status(&status)?;
    if !student_exists(conn, &student_code)? {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    upsert_record(conn, &student_code, &date, &kind, &status, &teacher_code)?;
    Ok(student_code)
}

fn attendance_mark_bulk(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<Vec<String>, HandlerErr> {
    let (date, kind, teacher_code) = validate_shared(params)?;
    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing entries"));
    };
    if entries.is_empty() {
        return Err(HandlerErr::bad_params("no selection made"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut written = Vec::new();
    for entry in entries {
        let student_code = codes::normalize(&get_required_str(entry, "studentCode")?);
        let status = get_required_str(entry, "status")?;
        validate_status(&status)?;
        // Unknown students are skipped rather than failing the batch.
        if !student_exists(&tx, &student_code)? {
            continue;
        }
        upsert_record(&tx, &student_code, &date, &kind, &status, &teacher_code)?;
        written.push(student_code);
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(written)
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_code = match attendance_mark(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    watch::notify_change(state, "attendance", &student_code, "upsert");
    ok(&req.id, json!({ "ok": true }))
}

fn handle_attendance_mark_bulk(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let written = match attendance_mark_bulk(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    for student_code in &written {
        watch::notify_change(state, "attendance", student_code, "upsert");
    }
    ok(&req.id, json!({ "saved": written.len() }))
}

fn handle_attendance_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_code = match get_required_str(&req.params, "studentCode") {
        Ok(v) => codes::normalize(&v),
        Err(e) => return e.response(&req.id),
    };
    match list_for_student(conn, &student_code) {
        Ok(records) => ok(&req.id, json!({ "attendance": records })),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(handle_attendance_mark(state, req)),
        "attendance.markBulk" => Some(handle_attendance_mark_bulk(state, req)),
        "attendance.list" => Some(handle_attendance_list(state, req)),
        _ => None,
    }
}
