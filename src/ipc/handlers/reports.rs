use crate::calc::{Standing, Tally};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::attendance::{query_attendance, LedgerFilter};
use crate::ipc::handlers::classes::require_class;
use crate::ipc::handlers::students::{find_student, list_students, StudentRow};
use crate::ipc::helpers::{
    csv_line, get_optional_id, get_output_format, get_required_date, get_required_id,
    respond_with_conn, OutputFormat,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

#[derive(Debug, Clone)]
struct StudentReport {
    student: StudentRow,
    tally: Tally,
}

impl StudentReport {
    fn percentage(&self) -> i64 {
        self.tally.percentage()
    }

    fn standing(&self) -> Standing {
        Standing::from_percentage(self.percentage())
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "studentId": self.student.id,
            "rollNo": self.student.roll_no,
            "fullName": self.student.full_name,
            "classId": self.student.class_id,
            "className": self.student.class_name,
            "totalDays": self.tally.total,
            "presentDays": self.tally.present,
            "absentDays": self.tally.absent(),
            "percentage": self.percentage(),
            "standing": self.standing(),
        })
    }

    fn csv_fields(&self) -> Vec<String> {
        vec![
            self.student.id.to_string(),
            self.student.roll_no.clone(),
            self.student.full_name.clone(),
            self.student.class_id.to_string(),
            self.student.class_name.clone(),
            self.tally.total.to_string(),
            self.tally.present.to_string(),
            self.tally.absent().to_string(),
            self.percentage().to_string(),
            self.standing().as_str().to_string(),
        ]
    }
}

const STUDENT_REPORT_CSV_HEADER: [&str; 10] = [
    "student_id",
    "roll_no",
    "full_name",
    "class_id",
    "class_name",
    "total_days",
    "present_days",
    "absent_days",
    "percentage",
    "standing",
];

const DATE_REPORT_CSV_HEADER: [&str; 5] = ["student_id", "roll_no", "full_name", "present", "class_name"];

fn header_line(fields: &[&str]) -> String {
    csv_line(&fields.iter().map(|f| f.to_string()).collect::<Vec<_>>())
}

/// Attendance for `student` counts only rows logged under the student's
/// current class. Marks taken before a class change stay out of the report.
fn student_report(conn: &Connection, student: StudentRow) -> Result<StudentReport, HandlerErr> {
    let tally = query_attendance(
        conn,
        LedgerFilter {
            class_id: Some(student.class_id),
            ..LedgerFilter::default()
        },
    )?
    .iter()
    .filter(|r| r.student_id == student.id)
    .map(|r| r.present)
    .collect();
    Ok(StudentReport { student, tally })
}

fn reports_students(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_id(params, "classId")?;
    let student_id = get_optional_id(params, "studentId")?;
    let format = get_output_format(params)?;

    let students: Vec<StudentRow> = match (student_id, class_id) {
        (Some(sid), _) => find_student(conn, sid)?.into_iter().collect(),
        (None, Some(cid)) => list_students(conn, Some(cid))?,
        (None, None) => list_students(conn, None)?,
    };
    let reports = students
        .into_iter()
        .map(|s| student_report(conn, s))
        .collect::<Result<Vec<_>, _>>()?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = reports.iter().map(StudentReport::to_json).collect();
            Ok(json!({ "reports": rows }))
        }
        OutputFormat::Csv => {
            let mut csv = header_line(&STUDENT_REPORT_CSV_HEADER);
            for r in &reports {
                csv.push_str(&csv_line(&r.csv_fields()));
            }
            Ok(json!({ "csv": csv, "rowCount": reports.len() }))
        }
    }
}

fn reports_date(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_id(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let format = get_output_format(params)?;
    let class = require_class(conn, class_id)?;

    let records = query_attendance(
        conn,
        LedgerFilter {
            class_id: Some(class.id),
            date: Some(date),
            ..LedgerFilter::default()
        },
    )?;

    match format {
        OutputFormat::Json => {
            let tally: Tally = records.iter().map(|r| r.present).collect();
            let rows: Vec<serde_json::Value> = records
                .iter()
                .map(|r| {
                    json!({
                        "studentId": r.student_id,
                        "rollNo": r.roll_no,
                        "fullName": r.student_name,
                        "present": r.present,
                        "className": class.name,
                    })
                })
                .collect();
            Ok(json!({
                "reports": rows,
                "summary": {
                    "present": tally.present,
                    "absent": tally.absent(),
                    "total": tally.total,
                    "percentage": tally.percentage(),
                },
            }))
        }
        OutputFormat::Csv => {
            let mut csv = header_line(&DATE_REPORT_CSV_HEADER);
            for r in &records {
                csv.push_str(&csv_line(&[
                    r.student_id.to_string(),
                    r.roll_no.clone(),
                    r.student_name.clone(),
                    r.present.to_string(),
                    class.name.clone(),
                ]));
            }
            Ok(json!({ "csv": csv, "rowCount": records.len() }))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let resp = match req.method.as_str() {
        "reports.students" => respond_with_conn(state, req, |c| reports_students(c, params)),
        "reports.date" => respond_with_conn(state, req, |c| reports_date(c, params)),
        _ => return None,
    };
    Some(resp)
}
