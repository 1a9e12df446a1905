use crate::error::AssessmentError;
use crate::ipc::error::{
    get_required_i64, get_required_str, ok, optional_i64, raw_input, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::manager::ExperimentRecordManager;
use crate::model::{format_date, DatePair, ExperimentField, ExperimentRecord};
use serde_json::json;

impl From<AssessmentError> for HandlerErr {
    fn from(e: AssessmentError) -> Self {
        let details = match &e {
            AssessmentError::Validation { field, .. } => Some(json!({ "field": field })),
            AssessmentError::IncompleteRow { experiment_no }
            | AssessmentError::RecordLocked { experiment_no }
            | AssessmentError::SaveInFlight { experiment_no } => {
                Some(json!({ "experimentNo": experiment_no }))
            }
            AssessmentError::UnknownExperiment(n) => Some(json!({ "experimentNo": n })),
            _ => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

fn dates_json(d: &DatePair) -> serde_json::Value {
    json!({
        "scheduled": d.scheduled.map(format_date),
        "actual": d.actual.map(format_date),
    })
}

fn experiment_json(r: &ExperimentRecord) -> serde_json::Value {
    json!({
        "experimentNo": r.experiment_no,
        "performanceDate": dates_json(&r.performance_date),
        "submissionDate": dates_json(&r.submission_date),
        "marks": {
            "rpp": r.marks.rpp,
            "spo": r.marks.spo,
            "assignment": r.marks.assignment,
        },
        "id": r.id,
        "isSaved": r.is_saved,
        "inFlight": r.in_flight,
        "state": r.state().as_str(),
    })
}

fn snapshot(m: &ExperimentRecordManager) -> serde_json::Value {
    let f = m.final_record();
    let [t1, t2, t3] = f.unit_tests;
    json!({
        "rollNumber": m.roll_number(),
        "experiments": m.experiments().iter().map(experiment_json).collect::<Vec<_>>(),
        "final": {
            "proportionateAssignmentMarks": f.proportionate_assignment_marks,
            "unitTest1": t1,
            "unitTest2": t2,
            "unitTest3": t3,
            "convertedUnitTestMarks": f.converted_unit_test_marks(),
            "theoryAttendanceMarks": f.theory_attendance_marks,
            "finalMarks": f.final_marks(),
            "id": f.id,
        },
        "summary": m.summary(),
    })
}

fn dialog<'a>(
    state: &'a mut AppState,
    params: &serde_json::Value,
) -> Result<&'a mut ExperimentRecordManager, HandlerErr> {
    let roll = get_required_str(params, "rollNumber")?;
    state.dialogs.get_mut(&roll).ok_or_else(|| HandlerErr {
        code: "not_open",
        message: "open the assessment dialog for this student first".to_string(),
        details: Some(json!({ "rollNumber": roll })),
    })
}

fn handle_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_required_str(&req.params, "rollNumber")?;
    let Some(backend) = state.backend.as_ref() else {
        return Err(HandlerErr {
            code: "no_backend",
            message: "select a workspace or connect a backend first".to_string(),
            details: None,
        });
    };
    let mut manager = ExperimentRecordManager::new(&roll, backend.service());
    let report = manager.load()?;
    let result = json!({
        "load": report,
        "assessment": snapshot(&manager),
    });
    state.dialogs.insert(roll, manager);
    Ok(result)
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let m = dialog(state, &req.params)?;
    Ok(snapshot(m))
}

fn handle_update_field(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let experiment_no = get_required_i64(&req.params, "experimentNo")?;
    let field_name = get_required_str(&req.params, "field")?;
    let field = ExperimentField::parse(&field_name).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "unknown field".to_string(),
        details: Some(json!({ "field": field_name })),
    })?;
    let raw = raw_input(&req.params, "value");
    let m = dialog(state, &req.params)?;
    m.update_field(experiment_no, field, &raw)?;
    Ok(json!({ "experiment": experiment_json(m.experiment(experiment_no)?) }))
}

fn handle_save_row(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let experiment_no = get_required_i64(&req.params, "experimentNo")?;
    let m = dialog(state, &req.params)?;
    let id = m.save_row(experiment_no)?;
    Ok(json!({
        "id": id,
        "experiment": experiment_json(m.experiment(experiment_no)?),
    }))
}

fn handle_save_all(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let m = dialog(state, &req.params)?;
    let report = m.save_all_pending();
    let rows: Vec<serde_json::Value> = report
        .outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(id) => json!({ "experimentNo": o.experiment_no, "ok": true, "id": id }),
            Err(e) => json!({
                "experimentNo": o.experiment_no,
                "ok": false,
                "error": { "code": e.code(), "message": e.to_string() },
            }),
        })
        .collect();
    let failed: Vec<u8> = report.failed().into_iter().map(|(no, _)| no).collect();
    Ok(json!({
        "attempted": report.outcomes.len(),
        "saved": report.saved(),
        "failed": failed,
        "allSaved": report.all_saved(),
        "rows": rows,
        "assessment": snapshot(m),
    }))
}

fn handle_set_unit_test(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let test = get_required_i64(&req.params, "test")?;
    let raw = raw_input(&req.params, "value");
    let m = dialog(state, &req.params)?;
    m.set_unit_test(test, &raw)?;
    Ok(snapshot(m)["final"].clone())
}

fn handle_set_proportionate(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let raw = raw_input(&req.params, "value");
    let m = dialog(state, &req.params)?;
    m.set_proportionate_assignment(&raw)?;
    Ok(snapshot(m)["final"].clone())
}

/// Explicit parameters win; anything omitted comes from the dialog.
fn handle_save_final(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let explicit_assignment = optional_i64(&req.params, "proportionateAssignmentMarks")?;
    let mut explicit_tests = [None; 3];
    let mut given = [false; 3];
    for i in 0..3 {
        let key = format!("unitTest{}", i + 1);
        given[i] = req.params.get(&key).is_some();
        explicit_tests[i] = optional_i64(&req.params, &key)?;
    }

    let m = dialog(state, &req.params)?;
    let current = m.final_record().clone();
    let assignment = explicit_assignment.or(current.proportionate_assignment_marks.map(i64::from));
    let mut tests = [None; 3];
    for i in 0..3 {
        tests[i] = if given[i] {
            explicit_tests[i]
        } else {
            current.unit_tests[i].map(i64::from)
        };
    }

    let report = m.save_final(assignment, tests)?;
    Ok(json!({
        "id": report.id,
        "convertedUnitTestMarks": report.converted_unit_test_marks,
        "finalMarks": report.final_marks,
        "assessment": snapshot(m),
    }))
}

fn handle_close(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_required_str(&req.params, "rollNumber")?;
    let closed = state.dialogs.remove(&roll).is_some();
    Ok(json!({ "closed": closed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assessment.open" => handle_open(state, req),
        "assessment.get" => handle_get(state, req),
        "assessment.updateField" => handle_update_field(state, req),
        "assessment.saveRow" => handle_save_row(state, req),
        "assessment.saveAll" => handle_save_all(state, req),
        "assessment.setUnitTest" => handle_set_unit_test(state, req),
        "assessment.setProportionateAssignment" => handle_set_proportionate(state, req),
        "assessment.saveFinal" => handle_save_final(state, req),
        "assessment.close" => handle_close(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
