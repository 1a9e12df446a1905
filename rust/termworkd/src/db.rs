use crate::model::{AssessmentPayload, StoredAssessment};
use crate::service::{AssessmentService, ServiceError};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "termwork.sqlite3";

const ASSESSMENT_COLUMNS: &str = "id, student_roll_no, experiment_no,
    scheduled_performance_date, actual_performance_date,
    scheduled_submission_date, actual_submission_date,
    rpp_marks, spo_marks, assignment_marks,
    final_assignment_marks, test_marks, theory_attendance_marks, final_marks,
    unit_test1_marks, unit_test2_marks, unit_test3_marks, converted_unit_test_marks";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            student_roll_no TEXT NOT NULL,
            experiment_no INTEGER NOT NULL,
            scheduled_performance_date TEXT,
            actual_performance_date TEXT,
            scheduled_submission_date TEXT,
            actual_submission_date TEXT,
            rpp_marks INTEGER,
            spo_marks INTEGER,
            assignment_marks INTEGER,
            final_assignment_marks INTEGER,
            test_marks REAL,
            theory_attendance_marks INTEGER,
            final_marks REAL,
            unit_test1_marks INTEGER,
            unit_test2_marks INTEGER,
            unit_test3_marks INTEGER,
            converted_unit_test_marks REAL,
            updated_at TEXT NOT NULL,
            UNIQUE(student_roll_no, experiment_no)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_student ON assessments(student_roll_no)",
        [],
    )?;
    Ok(())
}

/// Workspace-local stand-in for the REST backend. One row per
/// (student, experiment); saving the same slot again overwrites it.
pub struct LocalAssessmentService {
    conn: Mutex<Connection>,
}

impl LocalAssessmentService {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self::from_connection(open_db(workspace)?))
    }

    #[cfg(test)]
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

fn store_err(e: rusqlite::Error) -> ServiceError {
    ServiceError::Store(e.to_string())
}

fn row_to_stored(r: &Row<'_>) -> rusqlite::Result<StoredAssessment> {
    let int = |idx: usize| -> rusqlite::Result<Option<f64>> {
        Ok(r.get::<_, Option<i64>>(idx)?.map(|v| v as f64))
    };
    Ok(StoredAssessment {
        id: Some(r.get(0)?),
        student_roll_no: Some(r.get(1)?),
        experiment_no: int(2)?,
        scheduled_performance_date: r.get(3)?,
        actual_performance_date: r.get(4)?,
        scheduled_submission_date: r.get(5)?,
        actual_submission_date: r.get(6)?,
        rpp_marks: int(7)?,
        spo_marks: int(8)?,
        assignment_marks: int(9)?,
        final_assignment_marks: int(10)?,
        test_marks: r.get(11)?,
        theory_attendance_marks: int(12)?,
        final_marks: r.get(13)?,
        unit_test1_marks: int(14)?,
        unit_test2_marks: int(15)?,
        unit_test3_marks: int(16)?,
        converted_unit_test_marks: r.get(17)?,
    })
}

impl AssessmentService for LocalAssessmentService {
    fn save_assessment(&self, payload: &AssessmentPayload) -> Result<StoredAssessment, ServiceError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let roll = payload.student_roll_no.trim();
        if roll.is_empty() {
            return Err(ServiceError::Status {
                code: 400,
                body: "studentRollNo is required".to_string(),
            });
        }

        let existing_id: Option<String> = conn
            .query_row(
                "SELECT id FROM assessments WHERE student_roll_no = ? AND experiment_no = ?",
                (roll, payload.experiment_no),
                |r| r.get(0),
            )
            .optional()
            .map_err(store_err)?;
        let id = existing_id
            .or_else(|| payload.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let f = payload.final_fields.as_ref();
        conn.execute(
            "INSERT INTO assessments(
               id, student_roll_no, experiment_no,
               scheduled_performance_date, actual_performance_date,
               scheduled_submission_date, actual_submission_date,
               rpp_marks, spo_marks, assignment_marks,
               final_assignment_marks, test_marks, theory_attendance_marks, final_marks,
               unit_test1_marks, unit_test2_marks, unit_test3_marks, converted_unit_test_marks,
               updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_roll_no, experiment_no) DO UPDATE SET
               scheduled_performance_date = excluded.scheduled_performance_date,
               actual_performance_date = excluded.actual_performance_date,
               scheduled_submission_date = excluded.scheduled_submission_date,
               actual_submission_date = excluded.actual_submission_date,
               rpp_marks = excluded.rpp_marks,
               spo_marks = excluded.spo_marks,
               assignment_marks = excluded.assignment_marks,
               final_assignment_marks = excluded.final_assignment_marks,
               test_marks = excluded.test_marks,
               theory_attendance_marks = excluded.theory_attendance_marks,
               final_marks = excluded.final_marks,
               unit_test1_marks = excluded.unit_test1_marks,
               unit_test2_marks = excluded.unit_test2_marks,
               unit_test3_marks = excluded.unit_test3_marks,
               converted_unit_test_marks = excluded.converted_unit_test_marks,
               updated_at = excluded.updated_at",
            rusqlite::params![
                id,
                roll,
                payload.experiment_no,
                payload.scheduled_performance_date,
                payload.actual_performance_date,
                payload.scheduled_submission_date,
                payload.actual_submission_date,
                payload.rpp_marks,
                payload.spo_marks,
                payload.assignment_marks,
                f.map(|f| f.final_assignment_marks),
                f.map(|f| f.test_marks),
                f.map(|f| f.theory_attendance_marks),
                f.map(|f| f.final_marks),
                f.map(|f| f.unit_test1_marks),
                f.map(|f| f.unit_test2_marks),
                f.map(|f| f.unit_test3_marks),
                f.map(|f| f.converted_unit_test_marks),
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err)?;

        conn.query_row(
            &format!("SELECT {} FROM assessments WHERE id = ?", ASSESSMENT_COLUMNS),
            [&id],
            row_to_stored,
        )
        .map_err(store_err)
    }

    fn student_assessments(&self, roll_number: &str) -> Result<Vec<StoredAssessment>, ServiceError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM assessments WHERE student_roll_no = ? ORDER BY experiment_no",
                ASSESSMENT_COLUMNS
            ))
            .map_err(store_err)?;
        stmt.query_map([roll_number.trim()], row_to_stored)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FinalFields;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn payload(roll: &str, experiment_no: u8, rpp: u8) -> AssessmentPayload {
        AssessmentPayload {
            student_roll_no: roll.into(),
            experiment_no,
            scheduled_performance_date: Some("2024-01-10".into()),
            actual_performance_date: Some("2024-01-11".into()),
            scheduled_submission_date: Some("2024-01-17".into()),
            actual_submission_date: None,
            rpp_marks: Some(rpp),
            spo_marks: Some(5),
            assignment_marks: Some(9),
            id: None,
            final_fields: None,
        }
    }

    #[test]
    fn save_assigns_id_and_upserts_by_slot() {
        let svc = LocalAssessmentService::in_memory().unwrap();
        let first = svc.save_assessment(&payload("R-1", 3, 4)).unwrap();
        let id = first.id.clone().expect("id");
        assert_eq!(first.rpp_marks, Some(4.0));
        assert_eq!(first.actual_submission_date, None);

        let second = svc.save_assessment(&payload("R-1", 3, 2)).unwrap();
        assert_eq!(second.id.as_deref(), Some(id.as_str()));
        assert_eq!(second.rpp_marks, Some(2.0));

        svc.save_assessment(&payload("R-2", 3, 1)).unwrap();
        let rows = svc.student_assessments("R-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].slot(), Some(3));
    }

    #[test]
    fn final_fields_round_trip_through_store() {
        let svc = LocalAssessmentService::in_memory().unwrap();
        let mut p = payload("R-9", 0, 0);
        p.final_fields = Some(FinalFields {
            final_assignment_marks: 45,
            test_marks: 14.0,
            theory_attendance_marks: 0,
            final_marks: 18.44,
            unit_test1_marks: 25,
            unit_test2_marks: 20,
            unit_test3_marks: 18,
            converted_unit_test_marks: 14.0,
        });
        svc.save_assessment(&p).unwrap();
        let rows = svc.student_assessments("R-9").unwrap();
        assert_eq!(rows[0].slot(), Some(0));
        assert_eq!(rows[0].final_assignment_marks, Some(45.0));
        assert_eq!(rows[0].final_marks, Some(18.44));
        assert_eq!(rows[0].unit_test3_marks, Some(18.0));
    }

    #[test]
    fn open_creates_workspace_file() {
        let dir = std::env::temp_dir().join(format!(
            "termwork-db-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let svc = LocalAssessmentService::open(&dir).unwrap();
        svc.save_assessment(&payload("R-1", 1, 3)).unwrap();
        drop(svc);
        assert!(dir.join(DB_FILE_NAME).is_file());

        let reopened = LocalAssessmentService::open(&dir).unwrap();
        assert_eq!(reopened.student_assessments("R-1").unwrap().len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
