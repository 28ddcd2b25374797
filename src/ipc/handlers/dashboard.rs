use crate::ipc::error::ok;
use crate::ipc::handlers::{attendance, grades, users};
use crate::ipc::helpers::{user_row_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    self, User, ASSESSMENT_LEVELS, KINDERGARTEN_CLASS, KINDERGARTEN_SUBJECTS, STATUS_ABSENT,
    STATUS_PRESENT,
};
use rusqlite::Connection;
use serde_json::json;

/// Attendance rows shown on the student card; counts still cover the full
/// history.
const ATTENDANCE_DISPLAY_CAP: usize = 20;

fn require_role<'a>(state: &'a AppState, role: &str) -> Result<&'a User, HandlerErr> {
    let user = state
        .session
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_session", "log in first"))?;
    if user.role != role {
        return Err(HandlerErr::new(
            "forbidden",
            format!("requires {} role", role),
        ));
    }
    Ok(user)
}

fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn roster_for_class(conn: &Connection, class: &str) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT code, role, name, class, subject, group_type, created_at
             FROM users
             WHERE role = 'student' AND class = ?
             ORDER BY name",
        )
        .map_err(HandlerErr::db)?;
    stmt.query_map([class], |r| {
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

fn admin_dashboard(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    require_role(state, model::ROLE_ADMIN)?;
    let conn = require_db(state)?;
    let all = users::list_users(conn)?;
    let stats = users::role_counts(conn)?;
    Ok(json!({ "users": all, "stats": stats }))
}

fn teacher_dashboard(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let teacher = require_role(state, model::ROLE_TEACHER)?;
    let conn = require_db(state)?;
    let roster = roster_for_class(conn, &teacher.class)?;
    let is_kindergarten = teacher.class == KINDERGARTEN_CLASS;
    Ok(json!({
        "teacher": {
            "name": teacher.name,
            "class": teacher.class,
            "subject": teacher.subject,
        },
        "studentCount": roster.len(),
        "students": roster,
        "isKindergarten": is_kindergarten,
        "kindergartenSubjects": KINDERGARTEN_SUBJECTS,
        "assessmentLevels": ASSESSMENT_LEVELS,
    }))
}

fn student_dashboard(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let student = require_role(state, model::ROLE_STUDENT)?;
    let conn = require_db(state)?;
    let is_kindergarten = student.is_kindergarten();

    let mut grade_rows = grades::list_for_student(conn, &student.code)?;
    for row in &mut grade_rows {
        let value = row["value"].as_str().unwrap_or_default();
        // Kindergarten assessments are shown as the bare level, no "/20".
        let display = if is_kindergarten {
            value.to_string()
        } else {
            format!("{}/20", value)
        };
        row["display"] = serde_json::Value::String(display);
    }

    let grade_count = grade_rows.len();

    let attendance_rows = attendance::list_for_student(conn, &student.code)?;
    let present = attendance_rows
        .iter()
        .filter(|r| r["status"] == STATUS_PRESENT)
        .count();
    let absent = attendance_rows
        .iter()
        .filter(|r| r["status"] == STATUS_ABSENT)
        .count();
    let recent: Vec<&serde_json::Value> = attendance_rows
        .iter()
        .take(ATTENDANCE_DISPLAY_CAP)
        .collect();

    Ok(json!({
        "student": {
            "name": student.name,
            "class": student.class,
            "groupType": student.group_type,
        },
        "isKindergarten": is_kindergarten,
        "grades": grade_rows,
        "gradeCount": grade_count,
        "attendance": recent,
        "stats": { "present": present, "absent": absent },
    }))
}

fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(body) => ok(id, body),
        Err(e) => e.response(id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.admin" => Some(respond(&req.id, admin_dashboard(state))),
        "dashboard.teacher" => Some(respond(&req.id, teacher_dashboard(state))),
        "dashboard.student" => Some(respond(&req.id, student_dashboard(state))),
        _ => None,
    }
}
