use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Parameter or lookup failure inside a handler, converted to the error
/// envelope at the edge.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing integer {}", key)))
}

/// Form-style raw text for a mark or date value: strings pass through,
/// numbers are printed, null or missing is the empty input.
pub fn raw_input(params: &serde_json::Value, key: &str) -> String {
    match params.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Optional integer parameter. Missing/null/"" is `None`; anything else that
/// is not an integer is an error.
pub fn optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must be an integer", key))),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}
