use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::classes::require_class;
use crate::ipc::handlers::students::require_student;
use crate::ipc::helpers::{format_date, get_required_date, get_required_id, now_rfc3339, respond_with_conn};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct AttendanceRow {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub roll_no: String,
    pub class_id: i64,
    pub class_name: String,
    pub date: String,
    pub present: bool,
    pub marked_by: Option<i64>,
    pub created_at: String,
}

impl AttendanceRow {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "studentId": self.student_id,
            "studentName": self.student_name,
            "classId": self.class_id,
            "className": self.class_name,
            "date": self.date,
            "present": self.present,
            "markedBy": self.marked_by,
            "createdAt": self.created_at,
        })
    }
}

const ATTENDANCE_SELECT: &str = "SELECT
       a.id, a.student_id, s.full_name, s.roll_no,
       a.class_id, c.name, a.date, a.is_present, a.marked_by, a.created_at
     FROM attendance a
     JOIN students s ON s.id = a.student_id
     JOIN classes c ON c.id = a.class_id";

fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRow> {
    Ok(AttendanceRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        student_name: r.get(2)?,
        roll_no: r.get(3)?,
        class_id: r.get(4)?,
        class_name: r.get(5)?,
        date: r.get(6)?,
        present: r.get::<_, i64>(7)? != 0,
        marked_by: r.get(8)?,
        created_at: r.get(9)?,
    })
}

/// Narrows a ledger scan. Every populated field must match.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerFilter {
    pub class_id: Option<i64>,
    pub student_id: Option<i64>,
    pub date: Option<NaiveDate>,
}

/// Ledger rows matching `filter`, ordered by id ascending.
pub fn query_attendance(conn: &Connection, filter: LedgerFilter) -> Result<Vec<AttendanceRow>, HandlerErr> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<rusqlite::types::Value> = Vec::new();
    if let Some(class_id) = filter.class_id {
        clauses.push("a.class_id = ?");
        args.push(class_id.into());
    }
    if let Some(student_id) = filter.student_id {
        clauses.push("a.student_id = ?");
        args.push(student_id.into());
    }
    if let Some(date) = filter.date {
        clauses.push("a.date = ?");
        args.push(format_date(date).into());
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let sql = format!("{}{} ORDER BY a.id", ATTENDANCE_SELECT, where_sql);

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map(params_from_iter(args), attendance_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mark {
    student_id: i64,
    present: bool,
}

fn parse_marks(params: &serde_json::Value) -> Result<Vec<Mark>, HandlerErr> {
    let Some(items) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing records"));
    };
    let mut marks = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let student_id = get_required_id(item, "studentId")
            .map_err(|e| e.with_details(json!({ "index": idx })))?;
        let present = match item.get("present") {
            Some(serde_json::Value::Bool(b)) => *b,
            None | Some(serde_json::Value::Null) => false,
            Some(_) => {
                return Err(HandlerErr::bad_params("present must be a boolean")
                    .with_details(json!({ "index": idx })))
            }
        };
        marks.push(Mark { student_id, present });
    }

    let mut seen = HashSet::new();
    let mut duplicates: Vec<i64> = marks
        .iter()
        .filter(|m| !seen.insert(m.student_id))
        .map(|m| m.student_id)
        .collect();
    if !duplicates.is_empty() {
        duplicates.sort_unstable();
        duplicates.dedup();
        return Err(HandlerErr::bad_params("each student may be marked once per class and date")
            .with_details(json!({ "duplicateStudentIds": duplicates })));
    }
    Ok(marks)
}

fn delete_day(conn: &Connection, class_id: i64, date: NaiveDate) -> Result<usize, HandlerErr> {
    conn.execute(
        "DELETE FROM attendance WHERE class_id = ? AND date = ?",
        (class_id, format_date(date)),
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "attendance" })))
}

fn attendance_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let records: Vec<serde_json::Value> = query_attendance(
        conn,
        LedgerFilter {
            class_id: Some(class_id),
            date: Some(date),
            ..LedgerFilter::default()
        },
    )?
    .iter()
    .map(AttendanceRow::to_json)
    .collect();
    Ok(json!({ "records": records }))
}

/// Replace-on-write: the batch becomes the complete set of marks for
/// (classId, date). Runs in one transaction, so a failed batch leaves the
/// previous marks in place.
fn attendance_save(
    conn: &Connection,
    params: &serde_json::Value,
    actor: Option<i64>,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let marks = parse_marks(params)?;
    let class = require_class(conn, class_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    let replaced = delete_day(&tx, class.id, date)?;
    let created_at = now_rfc3339();
    let date_key = format_date(date);
    let mut records = Vec::with_capacity(marks.len());
    for mark in &marks {
        let student = require_student(&tx, mark.student_id)?;
        tx.execute(
            "INSERT INTO attendance(student_id, class_id, date, is_present, created_at, marked_by)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                student.id,
                class.id,
                &date_key,
                mark.present as i64,
                &created_at,
                actor,
            ),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "attendance" })))?;
        records.push(AttendanceRow {
            id: tx.last_insert_rowid(),
            student_id: student.id,
            student_name: student.full_name,
            roll_no: student.roll_no,
            class_id: class.id,
            class_name: class.name.clone(),
            date: date_key.clone(),
            present: mark.present,
            marked_by: actor,
            created_at: created_at.clone(),
        });
    }

    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;
    info!(class_id, date = %date_key, replaced, inserted = records.len(), "attendance saved");

    let records: Vec<serde_json::Value> = records.iter().map(AttendanceRow::to_json).collect();
    Ok(json!({ "records": records }))
}

fn attendance_clear(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let deleted = delete_day(conn, class_id, date)?;
    debug!(class_id, date = %format_date(date), deleted, "attendance cleared");
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let resp = match req.method.as_str() {
        "attendance.get" => respond_with_conn(state, req, |c| attendance_get(c, params)),
        "attendance.save" => respond_with_conn(state, req, |c| attendance_save(c, params, req.actor)),
        "attendance.clear" => respond_with_conn(state, req, |c| attendance_clear(c, params)),
        _ => return None,
    };
    Some(resp)
}
