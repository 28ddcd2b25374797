use crate::codes;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{users, watch};
use crate::ipc::helpers::{get_optional_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

pub fn list_for_student(
    conn: &Connection,
    student_code: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, student_code, subject_key, value, term, teacher_code, created_at
             FROM grades
             WHERE student_code = ?
             ORDER BY created_at DESC, rowid DESC",
        )
        .map_err(HandlerErr::db)?;
    stmt.query_map([student_code], |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "studentCode": r.get::<_, String>(1)?,
            "subjectKey": r.get::<_, String>(2)?,
            "value": r.get::<_, String>(3)?,
            "term": r.get::<_, Option<String>>(4)?,
            "teacherCode": r.get::<_, String>(5)?,
            "createdAt": r.get::<_, String>(6)?,
        }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db)
}

struct RecordedGrade {
    id: String,
    student_code: String,
}

fn grades_record(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<RecordedGrade, HandlerErr> {
    let student_code = codes::normalize(&get_required_str(params, "studentCode")?);
    let subject_key = get_required_str(params, "subjectKey")?;
    let value = get_required_str(params, "value")?;
    let term = get_optional_str(params, "term");
    let teacher_code = codes::normalize(&get_required_str(params, "teacherCode")?);

    let student = users::fetch_user(conn, &student_code)
        .map_err(HandlerErr::db)?
        .filter(|(u, _)| u.role == model::ROLE_STUDENT)
        .map(|(u, _)| u)
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;

    // Kindergarten students take a qualitative level, everyone else a
    // numeric string in 0..=20. The value is stored verbatim.
    if !model::grade_value_ok(student.group_type.as_deref(), &value) {
        return Err(HandlerErr::bad_params(format!(
            "invalid grade value: {}",
            value
        )));
    }

    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    conn.execute(
        "INSERT INTO grades(id, student_code, subject_key, value, term, teacher_code, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student_code,
            &subject_key,
            &value,
            &term,
            &teacher_code,
            &created_at,
        ),
    )
    .map_err(|e| HandlerErr::new("write_error", e.to_string()))?;

    Ok(RecordedGrade { id, student_code })
}

fn handle_grades_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let recorded = match grades_record(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    watch::notify_change(state, "grades", &recorded.student_code, "insert");
    ok(&req.id, json!({ "gradeId": recorded.id }))
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_code = match get_required_str(&req.params, "studentCode") {
        Ok(v) => codes::normalize(&v),
        Err(e) => return e.response(&req.id),
    };
    match list_for_student(conn, &student_code) {
        Ok(grades) => ok(&req.id, json!({ "grades": grades })),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.record" => Some(handle_grades_record(state, req)),
        "grades.list" => Some(handle_grades_list(state, req)),
        _ => None,
    }
}
