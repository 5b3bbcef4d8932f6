use crate::calc::Tally;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::attendance::{query_attendance, LedgerFilter};
use crate::ipc::handlers::classes::list_classes;
use crate::ipc::helpers::{format_date, get_optional_date, respond_with_conn};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use rusqlite::Connection;
use serde_json::json;

const SUMMARY_CLASS_LIMIT: i64 = 5;

fn count_rows(conn: &Connection, table: &str) -> Result<i64, HandlerErr> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn tally(conn: &Connection, filter: LedgerFilter) -> Result<Tally, HandlerErr> {
    Ok(query_attendance(conn, filter)?
        .iter()
        .map(|r| r.present)
        .collect())
}

fn dashboard_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    // "Today" is the server's local calendar date unless the caller pins one.
    let as_of = get_optional_date(params, "asOf")?.unwrap_or_else(|| Local::now().date_naive());

    let total_classes = count_rows(conn, "classes")?;
    let total_students = count_rows(conn, "students")?;
    let today = tally(
        conn,
        LedgerFilter {
            date: Some(as_of),
            ..LedgerFilter::default()
        },
    )?;
    let overall = tally(conn, LedgerFilter::default())?;

    let mut summaries = Vec::new();
    for class in list_classes(conn, Some(SUMMARY_CLASS_LIMIT))? {
        let t = tally(
            conn,
            LedgerFilter {
                class_id: Some(class.id),
                ..LedgerFilter::default()
            },
        )?;
        summaries.push(json!({
            "classId": class.id,
            "className": class.name,
            "present": t.present,
            "total": t.total,
            "percentage": t.percentage(),
        }));
    }

    Ok(json!({
        "asOf": format_date(as_of),
        "totalStudents": total_students,
        "totalClasses": total_classes,
        "todayAttendance": today.percentage(),
        "overallAttendance": overall.percentage(),
        "classSummaries": summaries,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.get" => Some(respond_with_conn(state, req, |c| dashboard_get(c, &req.params))),
        _ => None,
    }
}
