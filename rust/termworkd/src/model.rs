use crate::calc::{self, MarkKind, EXPERIMENT_COUNT, UNIT_TEST_COUNT};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// `experimentNo` of the per-student final assessment record.
pub const FINAL_EXPERIMENT_NO: u8 = 0;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatePair {
    pub scheduled: Option<NaiveDate>,
    pub actual: Option<NaiveDate>,
}

impl DatePair {
    fn is_complete(&self) -> bool {
        self.scheduled.is_some() && self.actual.is_some()
    }

    fn filled(&self) -> usize {
        usize::from(self.scheduled.is_some()) + usize::from(self.actual.is_some())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExperimentMarks {
    pub rpp: Option<u8>,
    pub spo: Option<u8>,
    pub assignment: Option<u8>,
}

impl ExperimentMarks {
    fn filled(&self) -> usize {
        [self.rpp, self.spo, self.assignment]
            .iter()
            .filter(|m| m.is_some())
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Empty,
    PartiallyFilled,
    Complete,
    Saved,
}

impl RecordState {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordState::Empty => "empty",
            RecordState::PartiallyFilled => "partially_filled",
            RecordState::Complete => "complete",
            RecordState::Saved => "saved",
        }
    }
}

/// One editable cell of an experiment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentField {
    ScheduledPerformanceDate,
    ActualPerformanceDate,
    ScheduledSubmissionDate,
    ActualSubmissionDate,
    Rpp,
    Spo,
    Assignment,
}

impl ExperimentField {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "performanceDate.scheduled" => Some(Self::ScheduledPerformanceDate),
            "performanceDate.actual" => Some(Self::ActualPerformanceDate),
            "submissionDate.scheduled" => Some(Self::ScheduledSubmissionDate),
            "submissionDate.actual" => Some(Self::ActualSubmissionDate),
            "rpp" | "marks.rpp" => Some(Self::Rpp),
            "spo" | "marks.spo" => Some(Self::Spo),
            "assignment" | "marks.assignment" => Some(Self::Assignment),
            _ => None,
        }
    }

    pub fn mark_kind(self) -> Option<MarkKind> {
        match self {
            Self::Rpp => Some(MarkKind::Rpp),
            Self::Spo => Some(MarkKind::Spo),
            Self::Assignment => Some(MarkKind::Assignment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentRecord {
    pub experiment_no: u8,
    pub performance_date: DatePair,
    pub submission_date: DatePair,
    pub marks: ExperimentMarks,
    pub id: Option<String>,
    pub is_saved: bool,
    pub in_flight: bool,
}

impl ExperimentRecord {
    pub fn empty(experiment_no: u8) -> Self {
        Self {
            experiment_no,
            performance_date: DatePair::default(),
            submission_date: DatePair::default(),
            marks: ExperimentMarks::default(),
            id: None,
            is_saved: false,
            in_flight: false,
        }
    }

    /// All four dates and all three marks are present. Zero is a mark.
    pub fn is_complete(&self) -> bool {
        self.performance_date.is_complete()
            && self.submission_date.is_complete()
            && self.marks.filled() == 3
    }

    pub fn state(&self) -> RecordState {
        if self.is_saved {
            return RecordState::Saved;
        }
        if self.is_complete() {
            return RecordState::Complete;
        }
        let filled =
            self.performance_date.filled() + self.submission_date.filled() + self.marks.filled();
        if filled == 0 {
            RecordState::Empty
        } else {
            RecordState::PartiallyFilled
        }
    }

    pub fn date_mut(&mut self, field: ExperimentField) -> Option<&mut Option<NaiveDate>> {
        match field {
            ExperimentField::ScheduledPerformanceDate => Some(&mut self.performance_date.scheduled),
            ExperimentField::ActualPerformanceDate => Some(&mut self.performance_date.actual),
            ExperimentField::ScheduledSubmissionDate => Some(&mut self.submission_date.scheduled),
            ExperimentField::ActualSubmissionDate => Some(&mut self.submission_date.actual),
            _ => None,
        }
    }

    pub fn mark_mut(&mut self, field: ExperimentField) -> Option<&mut Option<u8>> {
        match field {
            ExperimentField::Rpp => Some(&mut self.marks.rpp),
            ExperimentField::Spo => Some(&mut self.marks.spo),
            ExperimentField::Assignment => Some(&mut self.marks.assignment),
            _ => None,
        }
    }

    pub fn to_payload(&self, student_roll_no: &str) -> AssessmentPayload {
        AssessmentPayload {
            student_roll_no: student_roll_no.to_string(),
            experiment_no: self.experiment_no,
            scheduled_performance_date: self.performance_date.scheduled.map(format_date),
            actual_performance_date: self.performance_date.actual.map(format_date),
            scheduled_submission_date: self.submission_date.scheduled.map(format_date),
            actual_submission_date: self.submission_date.actual.map(format_date),
            rpp_marks: self.marks.rpp,
            spo_marks: self.marks.spo,
            assignment_marks: self.marks.assignment,
            id: self.id.clone(),
            final_fields: None,
        }
    }

    /// Builds a saved row from a persisted record. Out-of-range marks are
    /// dropped so nothing invalid enters the dialog.
    pub fn from_stored(experiment_no: u8, stored: &StoredAssessment) -> Self {
        Self {
            experiment_no,
            performance_date: DatePair {
                scheduled: stored.scheduled_performance_date.as_deref().and_then(normalize_date),
                actual: stored.actual_performance_date.as_deref().and_then(normalize_date),
            },
            submission_date: DatePair {
                scheduled: stored.scheduled_submission_date.as_deref().and_then(normalize_date),
                actual: stored.actual_submission_date.as_deref().and_then(normalize_date),
            },
            marks: ExperimentMarks {
                rpp: stored_mark(MarkKind::Rpp, stored.rpp_marks),
                spo: stored_mark(MarkKind::Spo, stored.spo_marks),
                assignment: stored_mark(MarkKind::Assignment, stored.assignment_marks),
            },
            id: stored.id.clone(),
            is_saved: true,
            in_flight: false,
        }
    }
}

pub fn empty_experiments() -> Vec<ExperimentRecord> {
    (1..=EXPERIMENT_COUNT as u8).map(ExperimentRecord::empty).collect()
}

/// Final assessment inputs. Derived marks are never stored here; they are
/// recomputed from the inputs every time they are read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalAssessmentRecord {
    pub proportionate_assignment_marks: Option<u8>,
    pub unit_tests: [Option<u8>; UNIT_TEST_COUNT],
    pub theory_attendance_marks: u32,
    pub id: Option<String>,
}

impl FinalAssessmentRecord {
    pub fn converted_unit_test_marks(&self) -> f64 {
        let [t1, t2, t3] = self.unit_tests;
        calc::unit_test_aggregate(t1, t2, t3)
    }

    pub fn final_marks(&self) -> Option<f64> {
        self.proportionate_assignment_marks
            .map(|a| calc::final_mark(a, self.converted_unit_test_marks()))
    }

    pub fn from_stored(stored: &StoredAssessment) -> Self {
        let record = Self {
            proportionate_assignment_marks: stored_mark(
                MarkKind::ProportionateAssignment,
                stored.final_assignment_marks,
            ),
            unit_tests: [
                stored_mark(MarkKind::UnitTest, stored.unit_test1_marks),
                stored_mark(MarkKind::UnitTest, stored.unit_test2_marks),
                stored_mark(MarkKind::UnitTest, stored.unit_test3_marks),
            ],
            theory_attendance_marks: stored
                .theory_attendance_marks
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v.round() as u32)
                .unwrap_or(0),
            id: stored.id.clone(),
        };
        record.check_stored_derivations(stored);
        record
    }

    /// Derived marks are always recomputed from the inputs; a stored value
    /// that disagrees is only reported.
    fn check_stored_derivations(&self, stored: &StoredAssessment) {
        let converted = self.converted_unit_test_marks();
        for (name, value) in [
            ("convertedUnitTestMarks", stored.converted_unit_test_marks),
            ("testMarks", stored.test_marks),
        ] {
            if let Some(v) = value.filter(|v| (v - converted).abs() > 0.005) {
                tracing::warn!(
                    field = name,
                    stored = v,
                    recomputed = converted,
                    "stored aggregate differs"
                );
            }
        }
        if let (Some(v), Some(recomputed)) = (stored.final_marks, self.final_marks()) {
            if (v - recomputed).abs() > 0.005 {
                tracing::warn!(stored = v, recomputed, "stored final marks differ");
            }
        }
    }
}

fn stored_mark(kind: MarkKind, value: Option<f64>) -> Option<u8> {
    let v = value?;
    if !v.is_finite() || v.fract() != 0.0 {
        tracing::warn!(kind = kind.as_str(), value = v, "dropping non-integer stored mark");
        return None;
    }
    match calc::validate(kind, Some(v as i64)) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(kind = kind.as_str(), value = v, "dropping stored mark: {e}");
            None
        }
    }
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Accepts `YYYY-MM-DD` or a full ISO-8601 timestamp and returns the
/// calendar date (UTC for zoned timestamps).
pub fn normalize_date(s: &str) -> Option<NaiveDate> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, DATE_FORMAT) {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

/// Body of `POST /assessments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentPayload {
    pub student_roll_no: String,
    pub experiment_no: u8,
    pub scheduled_performance_date: Option<String>,
    pub actual_performance_date: Option<String>,
    pub scheduled_submission_date: Option<String>,
    pub actual_submission_date: Option<String>,
    pub rpp_marks: Option<u8>,
    pub spo_marks: Option<u8>,
    pub assignment_marks: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub final_fields: Option<FinalFields>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalFields {
    pub final_assignment_marks: u8,
    pub test_marks: f64,
    pub theory_attendance_marks: u32,
    pub final_marks: f64,
    pub unit_test1_marks: u8,
    pub unit_test2_marks: u8,
    pub unit_test3_marks: u8,
    pub converted_unit_test_marks: f64,
}

/// A persisted assessment as the backend returns it. Regular and final
/// records share the shape and are told apart by `experiment_no`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredAssessment {
    #[serde(deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    pub student_roll_no: Option<String>,
    #[serde(deserialize_with = "de_opt_number")]
    pub experiment_no: Option<f64>,
    pub scheduled_performance_date: Option<String>,
    pub actual_performance_date: Option<String>,
    pub scheduled_submission_date: Option<String>,
    pub actual_submission_date: Option<String>,
    #[serde(deserialize_with = "de_opt_number")]
    pub rpp_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub spo_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub assignment_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub final_assignment_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub test_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub theory_attendance_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub final_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub unit_test1_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub unit_test2_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub unit_test3_marks: Option<f64>,
    #[serde(deserialize_with = "de_opt_number")]
    pub converted_unit_test_marks: Option<f64>,
}

impl StoredAssessment {
    /// `Some(0)` for the final record, `Some(1..=12)` for experiments.
    pub fn slot(&self) -> Option<u8> {
        let n = self.experiment_no?;
        if n.fract() != 0.0 || !(0.0..=EXPERIMENT_COUNT as f64).contains(&n) {
            return None;
        }
        Some(n as u8)
    }
}

/// `GET /assessments/student/{roll}` body, wrapped in `data` or bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AssessmentListWire {
    Wrapped { data: Vec<StoredAssessment> },
    Bare(Vec<StoredAssessment>),
}

impl AssessmentListWire {
    pub fn into_records(self) -> Vec<StoredAssessment> {
        match self {
            AssessmentListWire::Wrapped { data } => data,
            AssessmentListWire::Bare(data) => data,
        }
    }
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn de_opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        // DECIMAL columns commonly arrive as strings.
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
