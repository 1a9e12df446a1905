use crate::calc::{self, MarkKind};
use crate::ipc::error::{get_required_str, ok, optional_i64, raw_input, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_validate(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let kind_name = get_required_str(&req.params, "kind")?;
    let kind = MarkKind::parse(&kind_name).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "kind must be one of: rpp, spo, assignment, unitTest, proportionateAssignment"
            .to_string(),
        details: Some(json!({ "kind": kind_name })),
    })?;
    let raw = raw_input(&req.params, "value");
    let rule = kind.rule();
    let result = match calc::parse_mark_input(kind, &raw) {
        Ok(value) => json!({ "accepted": true, "value": value }),
        Err(e) => json!({ "accepted": false, "message": e.message }),
    };
    Ok(json!({
        "kind": kind.as_str(),
        "max": rule.max,
        "allowsEmpty": rule.allows_empty,
        "result": result,
    }))
}

/// Stateless aggregate/final-mark computation for whatever inputs are given.
fn handle_preview(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let mut tests = [None; calc::UNIT_TEST_COUNT];
    for (i, slot) in tests.iter_mut().enumerate() {
        let key = format!("unitTest{}", i + 1);
        *slot = calc::validate(MarkKind::UnitTest, optional_i64(&req.params, &key)?)
            .map_err(|e| HandlerErr {
                code: "validation_failed",
                message: e.message,
                details: Some(json!({ "field": key })),
            })?;
    }
    let [t1, t2, t3] = tests;
    let converted = calc::unit_test_aggregate(t1, t2, t3);

    let assignment = match optional_i64(&req.params, "proportionateAssignmentMarks")? {
        None => None,
        Some(v) => calc::validate(MarkKind::ProportionateAssignment, Some(v)).map_err(|e| {
            HandlerErr {
                code: "validation_failed",
                message: e.message,
                details: Some(json!({ "field": "proportionateAssignmentMarks" })),
            }
        })?,
    };
    let final_marks = assignment.map(|a| calc::final_mark(a, converted));

    Ok(json!({
        "convertedUnitTestMarks": converted,
        "finalMarks": final_marks,
    }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.validate" => handle_validate(req),
        "marks.preview" => handle_preview(req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
