use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::classes::require_class;
use crate::ipc::helpers::{
    get_optional_id, get_optional_str, get_required_id, get_required_str, now_rfc3339,
    respond_with_conn,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: i64,
    pub roll_no: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub class_id: i64,
    pub class_name: String,
    pub created_at: String,
    pub created_by: Option<i64>,
}

impl StudentRow {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "rollNo": self.roll_no,
            "fullName": self.full_name,
            "email": self.email,
            "phone": self.phone,
            "classId": self.class_id,
            "className": self.class_name,
            "createdAt": self.created_at,
            "createdBy": self.created_by,
        })
    }
}

const STUDENT_SELECT: &str = "SELECT
       s.id, s.roll_no, s.full_name, s.email, s.phone,
       s.class_id, c.name, s.created_at, s.created_by
     FROM students s
     JOIN classes c ON c.id = s.class_id";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        roll_no: r.get(1)?,
        full_name: r.get(2)?,
        email: r.get(3)?,
        phone: r.get(4)?,
        class_id: r.get(5)?,
        class_name: r.get(6)?,
        created_at: r.get(7)?,
        created_by: r.get(8)?,
    })
}

/// Students by id ascending, optionally limited to one class.
pub fn list_students(conn: &Connection, class_id: Option<i64>) -> Result<Vec<StudentRow>, HandlerErr> {
    let (sql, args): (String, Vec<i64>) = match class_id {
        Some(cid) => (format!("{} WHERE s.class_id = ? ORDER BY s.id", STUDENT_SELECT), vec![cid]),
        None => (format!("{} ORDER BY s.id", STUDENT_SELECT), Vec::new()),
    };
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map(rusqlite::params_from_iter(args), student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))
}

pub fn find_student(conn: &Connection, student_id: i64) -> Result<Option<StudentRow>, HandlerErr> {
    let sql = format!("{} WHERE s.id = ?", STUDENT_SELECT);
    conn.query_row(&sql, [student_id], student_from_row)
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))
}

pub fn require_student(conn: &Connection, student_id: i64) -> Result<StudentRow, HandlerErr> {
    find_student(conn, student_id)?.ok_or_else(|| {
        HandlerErr::not_found("student not found").with_details(json!({ "studentId": student_id }))
    })
}

struct StudentInput {
    roll_no: String,
    full_name: String,
    email: Option<String>,
    phone: Option<String>,
    class_id: i64,
}

fn parse_student_input(conn: &Connection, params: &serde_json::Value) -> Result<StudentInput, HandlerErr> {
    let input = StudentInput {
        roll_no: get_required_str(params, "rollNo")?,
        full_name: get_required_str(params, "fullName")?,
        email: get_optional_str(params, "email")?,
        phone: get_optional_str(params, "phone")?,
        class_id: get_required_id(params, "classId")?,
    };
    require_class(conn, input.class_id)?;
    Ok(input)
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_id(params, "classId")?;
    let students: Vec<serde_json::Value> = list_students(conn, class_id)?
        .iter()
        .map(StudentRow::to_json)
        .collect();
    Ok(json!({ "students": students }))
}

fn students_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_id(params, "studentId")?;
    Ok(require_student(conn, student_id)?.to_json())
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
    actor: Option<i64>,
) -> Result<serde_json::Value, HandlerErr> {
    let input = parse_student_input(conn, params)?;
    conn.execute(
        "INSERT INTO students(roll_no, full_name, email, phone, class_id, created_at, created_by)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &input.roll_no,
            &input.full_name,
            &input.email,
            &input.phone,
            input.class_id,
            now_rfc3339(),
            actor,
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "students" })))?;
    let student_id = conn.last_insert_rowid();
    info!(student_id, class_id = input.class_id, "student created");
    Ok(require_student(conn, student_id)?.to_json())
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_id(params, "studentId")?;
    require_student(conn, student_id)?;
    let input = parse_student_input(conn, params)?;

    conn.execute(
        "UPDATE students
         SET roll_no = ?, full_name = ?, email = ?, phone = ?, class_id = ?
         WHERE id = ?",
        (
            &input.roll_no,
            &input.full_name,
            &input.email,
            &input.phone,
            input.class_id,
            student_id,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e).with_details(json!({ "table": "students" })))?;
    Ok(require_student(conn, student_id)?.to_json())
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_id(params, "studentId")?;
    require_student(conn, student_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    let attendance_deleted = tx
        .execute("DELETE FROM attendance WHERE student_id = ?", [student_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "attendance" })))?;
    tx.execute("DELETE FROM students WHERE id = ?", [student_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "students" })))?;
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    info!(student_id, attendance_deleted, "student deleted");
    Ok(json!({ "ok": true, "attendanceDeleted": attendance_deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let resp = match req.method.as_str() {
        "students.list" => respond_with_conn(state, req, |c| students_list(c, params)),
        "students.get" => respond_with_conn(state, req, |c| students_get(c, params)),
        "students.create" => respond_with_conn(state, req, |c| students_create(c, params, req.actor)),
        "students.update" => respond_with_conn(state, req, |c| students_update(c, params)),
        "students.delete" => respond_with_conn(state, req, |c| students_delete(c, params)),
        _ => return None,
    };
    Some(resp)
}
