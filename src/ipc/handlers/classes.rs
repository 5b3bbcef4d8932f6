use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_str, get_required_id, get_required_str, now_rfc3339, respond_with_conn};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ClassRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub created_by: Option<i64>,
    pub student_count: i64,
}

impl ClassRow {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "createdAt": self.created_at,
            "createdBy": self.created_by,
            "studentCount": self.student_count,
        })
    }
}

// Correlated subquery keeps the count from multiplying rows.
const CLASS_SELECT: &str = "SELECT
       c.id,
       c.name,
       c.description,
       c.created_at,
       c.created_by,
       (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
     FROM classes c";

fn class_from_row(r: &Row<'_>) -> rusqlite::Result<ClassRow> {
    Ok(ClassRow {
        id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
        created_at: r.get(3)?,
        created_by: r.get(4)?,
        student_count: r.get(5)?,
    })
}

/// All classes by id ascending. `limit` caps the result (dashboard summaries).
pub fn list_classes(conn: &Connection, limit: Option<i64>) -> Result<Vec<ClassRow>, HandlerErr> {
    let sql = format!("{} ORDER BY c.id LIMIT ?", CLASS_SELECT);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map([limit.unwrap_or(-1)], class_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))
}

pub fn find_class(conn: &Connection, class_id: i64) -> Result<Option<ClassRow>, HandlerErr> {
    let sql = format!("{} WHERE c.id = ?", CLASS_SELECT);
    conn.query_row(&sql, [class_id], class_from_row)
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))
}

pub fn require_class(conn: &Connection, class_id: i64) -> Result<ClassRow, HandlerErr> {
    find_class(conn, class_id)?.ok_or_else(|| {
        HandlerErr::not_found("class not found").with_details(json!({ "classId": class_id }))
    })
}

fn classes_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let classes: Vec<serde_json::Value> = list_classes(conn, None)?
        .iter()
        .map(ClassRow::to_json)
        .collect();
    Ok(json!({ "classes": classes }))
}

fn classes_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    Ok(require_class(conn, class_id)?.to_json())
}

fn classes_create(
    conn: &Connection,
    params: &serde_json::Value,
    actor: Option<i64>,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let description = get_optional_str(params, "description")?;

    conn.execute(
        "INSERT INTO classes(name, description, created_at, created_by) VALUES(?, ?, ?, ?)",
        (&name, &description, now_rfc3339(), actor),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "classes" })))?;
    let class_id = conn.last_insert_rowid();
    info!(class_id, "class created");
    Ok(require_class(conn, class_id)?.to_json())
}

fn classes_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    let name = get_required_str(params, "name")?;
    let description = get_optional_str(params, "description")?;
    require_class(conn, class_id)?;

    conn.execute(
        "UPDATE classes SET name = ?, description = ? WHERE id = ?",
        (&name, &description, class_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e).with_details(json!({ "table": "classes" })))?;
    Ok(require_class(conn, class_id)?.to_json())
}

fn classes_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    require_class(conn, class_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    // Explicit dependency order; the schema has no ON DELETE CASCADE.
    // Students of this class may carry marks taken under an earlier class.
    let attendance_deleted = tx
        .execute(
            "DELETE FROM attendance
             WHERE class_id = ?1
                OR student_id IN (SELECT id FROM students WHERE class_id = ?1)",
            [class_id],
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "attendance" })))?;
    let students_deleted = tx
        .execute("DELETE FROM students WHERE class_id = ?", [class_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "students" })))?;
    tx.execute("DELETE FROM classes WHERE id = ?", [class_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "classes" })))?;

    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;
    info!(class_id, students_deleted, attendance_deleted, "class deleted");
    Ok(json!({
        "ok": true,
        "studentsDeleted": students_deleted,
        "attendanceDeleted": attendance_deleted,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let resp = match req.method.as_str() {
        "classes.list" => respond_with_conn(state, req, classes_list),
        "classes.get" => respond_with_conn(state, req, |c| classes_get(c, params)),
        "classes.create" => respond_with_conn(state, req, |c| classes_create(c, params, req.actor)),
        "classes.update" => respond_with_conn(state, req, |c| classes_update(c, params)),
        "classes.delete" => respond_with_conn(state, req, |c| classes_delete(c, params)),
        _ => return None,
    };
    Some(resp)
}
