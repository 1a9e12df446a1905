//! Per-student assessment dialog state.
//!
//! Owns the twelve experiment rows and the final assessment for one student,
//! and routes every read and write through an [`AssessmentService`]. A row
//! moves Empty -> PartiallyFilled -> Complete -> Saved; once saved it stays
//! locked for the lifetime of this manager.

use crate::calc::{self, MarkKind, EXPERIMENT_COUNT, UNIT_TEST_COUNT};
use crate::error::AssessmentError;
use crate::model::{
    empty_experiments, format_date, normalize_date, AssessmentPayload, ExperimentField,
    ExperimentRecord, FinalAssessmentRecord, FinalFields, StoredAssessment, FINAL_EXPERIMENT_NO,
};
use crate::service::{AssessmentService, ServiceError};
use serde::Serialize;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub experiments_loaded: usize,
    pub final_loaded: bool,
    pub ignored: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub experiment_no: u8,
    pub result: Result<String, AssessmentError>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SaveAllReport {
    pub outcomes: Vec<RowOutcome>,
}

impl SaveAllReport {
    pub fn saved(&self) -> Vec<u8> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.experiment_no)
            .collect()
    }

    pub fn failed(&self) -> Vec<(u8, &AssessmentError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.experiment_no, e)))
            .collect()
    }

    pub fn all_saved(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSaveReport {
    pub id: String,
    pub converted_unit_test_marks: f64,
    pub final_marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSummary {
    pub completed_experiments: usize,
    pub total_experiments: usize,
    pub completion_percent: f64,
    pub pending_rows: Vec<u8>,
    pub suggested_proportionate_assignment_marks: Option<u8>,
}

pub struct ExperimentRecordManager {
    roll_number: String,
    service: Arc<dyn AssessmentService>,
    experiments: Vec<ExperimentRecord>,
    final_record: FinalAssessmentRecord,
}

impl ExperimentRecordManager {
    pub fn new(roll_number: &str, service: Arc<dyn AssessmentService>) -> Self {
        Self {
            roll_number: roll_number.trim().to_string(),
            service,
            experiments: empty_experiments(),
            final_record: FinalAssessmentRecord::default(),
        }
    }

    pub fn roll_number(&self) -> &str {
        &self.roll_number
    }

    pub fn experiments(&self) -> &[ExperimentRecord] {
        &self.experiments
    }

    pub fn final_record(&self) -> &FinalAssessmentRecord {
        &self.final_record
    }

    pub fn experiment(&self, experiment_no: i64) -> Result<&ExperimentRecord, AssessmentError> {
        let idx = slot_index(experiment_no)?;
        Ok(&self.experiments[idx])
    }

    /// Replaces in-memory state with what the service holds for this student.
    /// Slots without a persisted record come back empty and unsaved. On
    /// failure the current state is left untouched.
    pub fn load(&mut self) -> Result<LoadReport, AssessmentError> {
        let records = self.service.student_assessments(&self.roll_number)?;
        let mut experiments = empty_experiments();
        let mut final_record = FinalAssessmentRecord::default();
        let mut report = LoadReport {
            experiments_loaded: 0,
            final_loaded: false,
            ignored: 0,
        };

        for stored in &records {
            if let Some(owner) = stored.student_roll_no.as_deref() {
                if owner.trim() != self.roll_number {
                    tracing::warn!(
                        roll = %self.roll_number,
                        owner,
                        "ignoring another student's assessment"
                    );
                    report.ignored += 1;
                    continue;
                }
            }
            match stored.slot() {
                Some(FINAL_EXPERIMENT_NO) => {
                    final_record = FinalAssessmentRecord::from_stored(stored);
                    report.final_loaded = true;
                }
                Some(no) => {
                    experiments[usize::from(no) - 1] = ExperimentRecord::from_stored(no, stored);
                    report.experiments_loaded += 1;
                }
                None => {
                    tracing::warn!(
                        roll = %self.roll_number,
                        experiment_no = ?stored.experiment_no,
                        "ignoring assessment outside experiment range"
                    );
                    report.ignored += 1;
                }
            }
        }

        self.experiments = experiments;
        self.final_record = final_record;
        tracing::info!(
            roll = %self.roll_number,
            experiments = report.experiments_loaded,
            has_final = report.final_loaded,
            "assessments loaded"
        );
        Ok(report)
    }

    /// Applies one cell edit. Rejected input leaves the prior value in place.
    pub fn update_field(
        &mut self,
        experiment_no: i64,
        field: ExperimentField,
        raw: &str,
    ) -> Result<(), AssessmentError> {
        let idx = slot_index(experiment_no)?;
        let record = &mut self.experiments[idx];
        if record.is_saved {
            return Err(AssessmentError::RecordLocked {
                experiment_no: record.experiment_no,
            });
        }

        if let Some(kind) = field.mark_kind() {
            let value = calc::parse_mark_input(kind, raw)?;
            if let Some(slot) = record.mark_mut(field) {
                *slot = value;
            }
        } else if let Some(slot) = record.date_mut(field) {
            let t = raw.trim();
            let value = if t.is_empty() {
                None
            } else {
                let date = normalize_date(t)
                    .ok_or_else(|| AssessmentError::invalid_date(field_name(field), t))?;
                Some(date)
            };
            *slot = value;
        }
        Ok(())
    }

    /// Marks the row in flight and returns what should be sent.
    fn begin_save(&mut self, idx: usize) -> Result<AssessmentPayload, AssessmentError> {
        let record = &mut self.experiments[idx];
        let experiment_no = record.experiment_no;
        if record.is_saved {
            return Err(AssessmentError::RecordLocked { experiment_no });
        }
        if record.in_flight {
            return Err(AssessmentError::SaveInFlight { experiment_no });
        }
        if !record.is_complete() {
            return Err(AssessmentError::IncompleteRow { experiment_no });
        }
        record.in_flight = true;
        Ok(record.to_payload(&self.roll_number))
    }

    /// Settles one row from its own response; only a response carrying an
    /// id locks the row.
    fn finish_save(
        &mut self,
        idx: usize,
        result: Result<StoredAssessment, ServiceError>,
    ) -> Result<String, AssessmentError> {
        let record = &mut self.experiments[idx];
        record.in_flight = false;
        let stored = result.map_err(|e| {
            tracing::warn!(experiment = record.experiment_no, "save failed: {e}");
            AssessmentError::Transport(e)
        })?;
        let Some(id) = stored.id else {
            tracing::warn!(experiment = record.experiment_no, "save response missing id");
            return Err(AssessmentError::ServerRejection(
                "response did not include a record id".to_string(),
            ));
        };
        record.id = Some(id.clone());
        record.is_saved = true;
        tracing::info!(experiment = record.experiment_no, id = %id, "experiment saved");
        Ok(id)
    }

    pub fn save_row(&mut self, experiment_no: i64) -> Result<String, AssessmentError> {
        let idx = slot_index(experiment_no)?;
        let payload = self.begin_save(idx)?;
        let result = self.service.save_assessment(&payload);
        self.finish_save(idx, result)
    }

    /// Saves every complete, unsaved row with one request per row, all in
    /// flight at once. Dispatch follows row order; each row's saved flag
    /// follows its own response.
    pub fn save_all_pending(&mut self) -> SaveAllReport {
        let mut pending: Vec<(usize, AssessmentPayload)> = Vec::new();
        for idx in 0..self.experiments.len() {
            let r = &self.experiments[idx];
            if r.is_saved || r.in_flight || !r.is_complete() {
                continue;
            }
            if let Ok(payload) = self.begin_save(idx) {
                pending.push((idx, payload));
            }
        }
        if pending.is_empty() {
            return SaveAllReport::default();
        }
        tracing::info!(roll = %self.roll_number, rows = pending.len(), "saving pending experiments");

        let service = &self.service;
        let results: Vec<(usize, Result<StoredAssessment, ServiceError>)> = thread::scope(|scope| {
            let handles: Vec<_> = pending
                .into_iter()
                .map(|(idx, payload)| {
                    (idx, scope.spawn(move || service.save_assessment(&payload)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(idx, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(ServiceError::Transport("save worker panicked".to_string()))
                    });
                    (idx, result)
                })
                .collect()
        });

        let outcomes = results
            .into_iter()
            .map(|(idx, result)| RowOutcome {
                experiment_no: self.experiments[idx].experiment_no,
                result: self.finish_save(idx, result),
            })
            .collect();
        SaveAllReport { outcomes }
    }

    /// `test` is 1-based. Empty input clears the score.
    pub fn set_unit_test(&mut self, test: i64, raw: &str) -> Result<(), AssessmentError> {
        let idx = usize::try_from(test)
            .ok()
            .filter(|t| (1..=UNIT_TEST_COUNT).contains(t))
            .ok_or_else(|| AssessmentError::Validation {
                field: "unitTest".to_string(),
                message: format!("unit test must be 1, 2 or 3 (got {})", test),
            })?;
        self.final_record.unit_tests[idx - 1] = calc::parse_mark_input(MarkKind::UnitTest, raw)?;
        Ok(())
    }

    pub fn set_proportionate_assignment(&mut self, raw: &str) -> Result<(), AssessmentError> {
        let value = calc::parse_mark_input(MarkKind::ProportionateAssignment, raw)?;
        self.final_record.proportionate_assignment_marks = value;
        Ok(())
    }

    /// Validates the inputs, derives the unit-test aggregate and final mark,
    /// and persists them as the `experimentNo = 0` record.
    pub fn save_final(
        &mut self,
        proportionate_assignment_marks: Option<i64>,
        unit_tests: [Option<i64>; UNIT_TEST_COUNT],
    ) -> Result<FinalSaveReport, AssessmentError> {
        let Some(raw_assignment) = proportionate_assignment_marks else {
            return Err(AssessmentError::MissingProportionateAssignment);
        };
        let assignment = calc::validate(MarkKind::ProportionateAssignment, Some(raw_assignment))?
            .ok_or(AssessmentError::MissingProportionateAssignment)?;
        let mut tests = [None; UNIT_TEST_COUNT];
        for (slot, raw) in tests.iter_mut().zip(unit_tests) {
            *slot = calc::validate(MarkKind::UnitTest, raw)?;
        }

        self.final_record.proportionate_assignment_marks = Some(assignment);
        self.final_record.unit_tests = tests;
        let converted = self.final_record.converted_unit_test_marks();
        let final_marks = calc::final_mark(assignment, converted);

        let today = format_date(chrono::Utc::now().date_naive());
        let [t1, t2, t3] = tests;
        let payload = AssessmentPayload {
            student_roll_no: self.roll_number.clone(),
            experiment_no: FINAL_EXPERIMENT_NO,
            scheduled_performance_date: Some(today.clone()),
            actual_performance_date: Some(today.clone()),
            scheduled_submission_date: Some(today.clone()),
            actual_submission_date: Some(today),
            rpp_marks: Some(0),
            spo_marks: Some(0),
            assignment_marks: Some(0),
            id: self.final_record.id.clone(),
            final_fields: Some(FinalFields {
                final_assignment_marks: assignment,
                test_marks: converted,
                theory_attendance_marks: self.final_record.theory_attendance_marks,
                final_marks,
                unit_test1_marks: t1.unwrap_or(0),
                unit_test2_marks: t2.unwrap_or(0),
                unit_test3_marks: t3.unwrap_or(0),
                converted_unit_test_marks: converted,
            }),
        };

        let stored = self.service.save_assessment(&payload).map_err(|e| {
            tracing::warn!(roll = %self.roll_number, "final assessment save failed: {e}");
            AssessmentError::Transport(e)
        })?;
        let Some(id) = stored.id else {
            return Err(AssessmentError::ServerRejection(
                "Failed to save final assessment".to_string(),
            ));
        };
        self.final_record.id = Some(id.clone());
        tracing::info!(roll = %self.roll_number, final_marks, "final assessment saved");
        Ok(FinalSaveReport {
            id,
            converted_unit_test_marks: converted,
            final_marks,
        })
    }

    pub fn summary(&self) -> AssessmentSummary {
        let completed = self.experiments.iter().filter(|r| r.is_saved).count();
        let pending_rows = self
            .experiments
            .iter()
            .filter(|r| !r.is_saved && r.is_complete())
            .map(|r| r.experiment_no)
            .collect();
        let suggested = calc::suggested_proportionate_assignment(
            self.experiments
                .iter()
                .filter(|r| r.is_saved)
                .filter_map(|r| r.marks.assignment),
        );
        AssessmentSummary {
            completed_experiments: completed,
            total_experiments: EXPERIMENT_COUNT,
            completion_percent: calc::round_2dp(completed as f64 * 100.0 / EXPERIMENT_COUNT as f64),
            pending_rows,
            suggested_proportionate_assignment_marks: suggested,
        }
    }
}

fn slot_index(experiment_no: i64) -> Result<usize, AssessmentError> {
    usize::try_from(experiment_no)
        .ok()
        .filter(|n| (1..=EXPERIMENT_COUNT).contains(n))
        .map(|n| n - 1)
        .ok_or(AssessmentError::UnknownExperiment(experiment_no))
}

fn field_name(field: ExperimentField) -> &'static str {
    match field {
        ExperimentField::ScheduledPerformanceDate => "performanceDate.scheduled",
        ExperimentField::ActualPerformanceDate => "performanceDate.actual",
        ExperimentField::ScheduledSubmissionDate => "submissionDate.scheduled",
        ExperimentField::ActualSubmissionDate => "submissionDate.actual",
        ExperimentField::Rpp => "rpp",
        ExperimentField::Spo => "spo",
        ExperimentField::Assignment => "assignment",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordState;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Scripted in-memory backend: records every payload it receives and
    /// fails saves for the configured experiment numbers.
    #[derive(Default)]
    struct FakeService {
        stored: Vec<StoredAssessment>,
        fail_experiments: HashSet<u8>,
        omit_id: bool,
        fail_fetch: bool,
        sent: Mutex<Vec<AssessmentPayload>>,
    }

    impl FakeService {
        fn sent(&self) -> Vec<AssessmentPayload> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl AssessmentService for FakeService {
        fn save_assessment(
            &self,
            payload: &AssessmentPayload,
        ) -> Result<StoredAssessment, ServiceError> {
            self.sent.lock().unwrap().push(payload.clone());
            if self.fail_experiments.contains(&payload.experiment_no) {
                return Err(ServiceError::Transport("connection reset".into()));
            }
            Ok(StoredAssessment {
                id: (!self.omit_id).then(|| format!("id-{}", payload.experiment_no)),
                experiment_no: Some(f64::from(payload.experiment_no)),
                ..Default::default()
            })
        }

        fn student_assessments(&self, _roll: &str) -> Result<Vec<StoredAssessment>, ServiceError> {
            if self.fail_fetch {
                return Err(ServiceError::Status {
                    code: 500,
                    body: "down".into(),
                });
            }
            Ok(self.stored.clone())
        }
    }

    fn manager(service: FakeService) -> (ExperimentRecordManager, Arc<FakeService>) {
        let svc = Arc::new(service);
        (ExperimentRecordManager::new("R-7", svc.clone()), svc)
    }

    fn fill_row(m: &mut ExperimentRecordManager, no: i64) {
        for (field, raw) in [
            (ExperimentField::ScheduledPerformanceDate, "2024-01-08"),
            (ExperimentField::ActualPerformanceDate, "2024-01-09"),
            (ExperimentField::ScheduledSubmissionDate, "2024-01-15"),
            (ExperimentField::ActualSubmissionDate, "2024-01-16T00:00:00.000Z"),
            (ExperimentField::Rpp, "4"),
            (ExperimentField::Spo, "0"),
            (ExperimentField::Assignment, "8"),
        ] {
            m.update_field(no, field, raw).unwrap();
        }
    }

    #[test]
    fn load_places_persisted_rows_by_experiment_number() {
        let (mut m, _svc) = manager(FakeService {
            stored: vec![
                StoredAssessment {
                    id: Some("e3".into()),
                    experiment_no: Some(3.0),
                    scheduled_performance_date: Some("2024-01-10T00:00:00.000Z".into()),
                    actual_performance_date: Some("2024-01-10".into()),
                    scheduled_submission_date: Some("2024-01-17".into()),
                    actual_submission_date: Some("2024-01-18".into()),
                    rpp_marks: Some(4.0),
                    spo_marks: Some(5.0),
                    assignment_marks: Some(9.0),
                    ..Default::default()
                },
                StoredAssessment {
                    id: Some("fin".into()),
                    experiment_no: Some(0.0),
                    final_assignment_marks: Some(45.0),
                    unit_test1_marks: Some(25.0),
                    unit_test2_marks: Some(20.0),
                    unit_test3_marks: Some(18.0),
                    theory_attendance_marks: Some(7.0),
                    ..Default::default()
                },
                StoredAssessment {
                    experiment_no: Some(19.0),
                    ..Default::default()
                },
                StoredAssessment {
                    id: Some("other".into()),
                    student_roll_no: Some("R-8".into()),
                    experiment_no: Some(5.0),
                    rpp_marks: Some(1.0),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        let report = m.load().unwrap();
        assert_eq!(report.experiments_loaded, 1);
        assert!(report.final_loaded);
        assert_eq!(report.ignored, 2);

        let row = &m.experiments()[2];
        assert!(row.is_saved);
        assert_eq!(row.id.as_deref(), Some("e3"));
        assert_eq!(row.marks.assignment, Some(9));
        assert_eq!(
            row.performance_date.scheduled.map(format_date).as_deref(),
            Some("2024-01-10")
        );
        for (i, r) in m.experiments().iter().enumerate() {
            if i != 2 {
                assert_eq!(r.state(), RecordState::Empty);
                assert!(!r.is_saved);
            }
        }

        let f = m.final_record();
        assert_eq!(f.proportionate_assignment_marks, Some(45));
        assert_eq!(f.theory_attendance_marks, 7);
        assert_eq!(f.final_marks(), Some(18.44));
    }

    #[test]
    fn failed_load_keeps_current_state() {
        let (mut m, _svc) = manager(FakeService {
            fail_fetch: true,
            ..Default::default()
        });
        m.update_field(1, ExperimentField::Rpp, "3").unwrap();
        let err = m.load().unwrap_err();
        assert_eq!(err.code(), "transport_failed");
        assert_eq!(m.experiments()[0].marks.rpp, Some(3));
    }

    #[test]
    fn rejected_input_keeps_previous_value() {
        let (mut m, _svc) = manager(FakeService::default());
        m.update_field(2, ExperimentField::Rpp, "5").unwrap();
        let err = m.update_field(2, ExperimentField::Rpp, "6").unwrap_err();
        assert_eq!(
            err,
            AssessmentError::Validation {
                field: "rpp".into(),
                message: "RPP marks should be between 0 and 5".into()
            }
        );
        assert!(m.update_field(2, ExperimentField::Rpp, "x").is_err());
        assert_eq!(m.experiments()[1].marks.rpp, Some(5));

        assert!(m
            .update_field(2, ExperimentField::ActualPerformanceDate, "tomorrow")
            .is_err());
        assert_eq!(m.experiments()[1].performance_date.actual, None);
        assert_eq!(
            m.update_field(13, ExperimentField::Rpp, "1"),
            Err(AssessmentError::UnknownExperiment(13))
        );
    }

    #[test]
    fn incomplete_row_never_reaches_the_service() {
        let (mut m, svc) = manager(FakeService::default());
        fill_row(&mut m, 4);
        m.update_field(4, ExperimentField::ActualSubmissionDate, "").unwrap();
        assert_eq!(
            m.save_row(4),
            Err(AssessmentError::IncompleteRow { experiment_no: 4 })
        );
        assert!(svc.sent().is_empty());
        assert!(!m.experiments()[3].in_flight);
    }

    #[test]
    fn saved_row_is_locked() {
        let (mut m, svc) = manager(FakeService::default());
        fill_row(&mut m, 1);
        assert_eq!(m.save_row(1).unwrap(), "id-1");
        let before = m.experiments()[0].clone();
        assert_eq!(before.state(), RecordState::Saved);

        assert_eq!(
            m.update_field(1, ExperimentField::Assignment, "2"),
            Err(AssessmentError::RecordLocked { experiment_no: 1 })
        );
        assert_eq!(m.experiments()[0], before);
        assert_eq!(
            m.save_row(1),
            Err(AssessmentError::RecordLocked { experiment_no: 1 })
        );

        let sent = svc.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].actual_submission_date.as_deref(), Some("2024-01-16"));
        assert_eq!(sent[0].spo_marks, Some(0));
    }

    #[test]
    fn save_in_flight_blocks_duplicate_submission() {
        let (mut m, _svc) = manager(FakeService::default());
        fill_row(&mut m, 6);
        let payload = m.begin_save(5).unwrap();
        assert_eq!(payload.experiment_no, 6);
        assert_eq!(
            m.save_row(6),
            Err(AssessmentError::SaveInFlight { experiment_no: 6 })
        );
        let report = m.save_all_pending();
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn transport_failure_leaves_row_retryable() {
        let (mut m, _svc) = manager(FakeService {
            fail_experiments: [2].into_iter().collect(),
            ..Default::default()
        });
        fill_row(&mut m, 2);
        let err = m.save_row(2).unwrap_err();
        assert_eq!(err.code(), "transport_failed");
        let row = &m.experiments()[1];
        assert!(!row.is_saved);
        assert!(!row.in_flight);
        assert_eq!(row.state(), RecordState::Complete);
    }

    #[test]
    fn response_without_id_is_a_rejection() {
        let (mut m, _svc) = manager(FakeService {
            omit_id: true,
            ..Default::default()
        });
        fill_row(&mut m, 9);
        assert_eq!(m.save_row(9).unwrap_err().code(), "server_rejected");
        assert!(!m.experiments()[8].is_saved);
    }

    #[test]
    fn save_all_marks_rows_by_their_own_response() {
        let (mut m, svc) = manager(FakeService {
            fail_experiments: [2].into_iter().collect(),
            ..Default::default()
        });
        for no in 1..=3 {
            fill_row(&mut m, no);
        }
        m.update_field(5, ExperimentField::Rpp, "1").unwrap();

        let report = m.save_all_pending();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.saved(), vec![1, 3]);
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, 2);
        assert_eq!(failed[0].1.code(), "transport_failed");
        assert!(!report.all_saved());

        assert!(m.experiments()[0].is_saved);
        assert!(!m.experiments()[1].is_saved);
        assert!(m.experiments()[2].is_saved);
        assert!(!m.experiments()[4].is_saved);
        assert!(m.experiments().iter().all(|r| !r.in_flight));

        let mut sent: Vec<u8> = svc.sent().iter().map(|p| p.experiment_no).collect();
        sent.sort_unstable();
        assert_eq!(sent, vec![1, 2, 3]);

        // Retrying only resends the row that failed.
        let retry = m.save_all_pending();
        assert_eq!(retry.outcomes.len(), 1);
        assert_eq!(retry.outcomes[0].experiment_no, 2);
    }

    #[test]
    fn save_final_derives_marks() {
        let (mut m, svc) = manager(FakeService::default());
        let report = m
            .save_final(Some(45), [Some(25), Some(20), Some(18)])
            .unwrap();
        assert_eq!(report.converted_unit_test_marks, 14.0);
        assert_eq!(report.final_marks, 18.44);
        assert_eq!(report.id, "id-0");
        assert_eq!(m.final_record().id.as_deref(), Some("id-0"));

        let sent = svc.sent();
        let p = &sent[0];
        assert_eq!(p.experiment_no, 0);
        assert!(p.scheduled_performance_date.is_some());
        let f = p.final_fields.as_ref().unwrap();
        assert_eq!(f.final_assignment_marks, 45);
        assert_eq!(f.test_marks, 14.0);
        assert_eq!(f.converted_unit_test_marks, 14.0);
        assert_eq!(f.final_marks, 18.44);
        assert_eq!(f.theory_attendance_marks, 0);
    }

    #[test]
    fn save_final_treats_missing_unit_tests_as_zero() {
        let (mut m, svc) = manager(FakeService::default());
        let report = m.save_final(Some(60), [Some(30), None, None]).unwrap();
        assert_eq!(report.converted_unit_test_marks, 6.67);
        let f = svc.sent()[0].final_fields.clone().unwrap();
        assert_eq!((f.unit_test2_marks, f.unit_test3_marks), (0, 0));
    }

    #[test]
    fn save_final_validates_before_sending() {
        let (mut m, svc) = manager(FakeService::default());
        assert_eq!(
            m.save_final(None, [None, None, None]),
            Err(AssessmentError::MissingProportionateAssignment)
        );
        assert_eq!(
            m.save_final(Some(61), [None, None, None]).unwrap_err().code(),
            "validation_failed"
        );
        assert_eq!(
            m.save_final(Some(40), [Some(10), Some(31), None])
                .unwrap_err()
                .code(),
            "validation_failed"
        );
        assert!(svc.sent().is_empty());
    }

    #[test]
    fn interactive_final_inputs_update_preview() {
        let (mut m, _svc) = manager(FakeService::default());
        m.set_unit_test(1, "25").unwrap();
        m.set_unit_test(2, "20").unwrap();
        m.set_unit_test(3, "18").unwrap();
        assert_eq!(m.final_record().final_marks(), None);
        m.set_proportionate_assignment("45").unwrap();
        assert_eq!(m.final_record().final_marks(), Some(18.44));

        assert!(m.set_unit_test(2, "45").is_err());
        assert_eq!(m.final_record().unit_tests[1], Some(20));
        m.set_unit_test(2, "").unwrap();
        assert_eq!(m.final_record().unit_tests[1], None);
        assert!(m.set_unit_test(4, "1").is_err());
        assert!(m.set_proportionate_assignment("").is_err());
        assert_eq!(m.final_record().proportionate_assignment_marks, Some(45));
    }

    #[test]
    fn summary_counts_saved_and_pending_rows() {
        let (mut m, _svc) = manager(FakeService::default());
        fill_row(&mut m, 1);
        fill_row(&mut m, 2);
        m.save_row(1).unwrap();
        m.update_field(2, ExperimentField::Assignment, "6").unwrap();

        let s = m.summary();
        assert_eq!(s.completed_experiments, 1);
        assert_eq!(s.total_experiments, 12);
        assert_eq!(s.completion_percent, 8.33);
        assert_eq!(s.pending_rows, vec![2]);
        // one saved row with assignment 8 -> 8/10*60
        assert_eq!(s.suggested_proportionate_assignment_marks, Some(48));
    }
}
