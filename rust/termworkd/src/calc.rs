use serde::{Deserialize, Serialize};

pub const EXPERIMENT_COUNT: usize = 12;
pub const UNIT_TEST_COUNT: usize = 3;

const UNIT_TEST_MAX: u8 = 30;
const UNIT_TEST_MAX_TOTAL: f64 = (UNIT_TEST_MAX as f64) * (UNIT_TEST_COUNT as f64);
const UNIT_TEST_SCALE: f64 = 20.0;
const PROPORTIONATE_ASSIGNMENT_MAX: u8 = 60;
const FINAL_MAX_TOTAL: f64 = PROPORTIONATE_ASSIGNMENT_MAX as f64 + UNIT_TEST_SCALE;
const FINAL_SCALE: f64 = 25.0;

/// Every mark input the assessment dialog captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkKind {
    Rpp,
    Spo,
    Assignment,
    UnitTest,
    ProportionateAssignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkRule {
    pub max: u8,
    /// Empty input clears the value instead of being rejected.
    pub allows_empty: bool,
    pub message: &'static str,
}

const MARK_RULES: [(MarkKind, MarkRule); 5] = [
    (
        MarkKind::Rpp,
        MarkRule {
            max: 5,
            allows_empty: false,
            message: "RPP marks should be between 0 and 5",
        },
    ),
    (
        MarkKind::Spo,
        MarkRule {
            max: 5,
            allows_empty: false,
            message: "SPO marks should be between 0 and 5",
        },
    ),
    (
        MarkKind::Assignment,
        MarkRule {
            max: 10,
            allows_empty: false,
            message: "Assignment marks should be between 0 and 10",
        },
    ),
    (
        MarkKind::UnitTest,
        MarkRule {
            max: UNIT_TEST_MAX,
            allows_empty: true,
            message: "Unit test marks should be between 0 and 30",
        },
    ),
    (
        MarkKind::ProportionateAssignment,
        MarkRule {
            max: PROPORTIONATE_ASSIGNMENT_MAX,
            allows_empty: false,
            message: "Proportionate Assignment marks should be between 0 and 60",
        },
    ),
];

impl MarkKind {
    pub fn rule(self) -> MarkRule {
        MARK_RULES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, rule)| *rule)
            .unwrap_or(MarkRule {
                max: 0,
                allows_empty: false,
                message: "unknown mark kind",
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarkKind::Rpp => "rpp",
            MarkKind::Spo => "spo",
            MarkKind::Assignment => "assignment",
            MarkKind::UnitTest => "unitTest",
            MarkKind::ProportionateAssignment => "proportionateAssignment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "rpp" => Some(MarkKind::Rpp),
            "spo" => Some(MarkKind::Spo),
            "assignment" => Some(MarkKind::Assignment),
            "unitTest" => Some(MarkKind::UnitTest),
            "proportionateAssignment" => Some(MarkKind::ProportionateAssignment),
            _ => None,
        }
    }

    pub fn accepts(self, value: i64) -> bool {
        (0..=i64::from(self.rule().max)).contains(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct MarkRejection {
    pub kind: MarkKind,
    pub message: String,
}

impl MarkRejection {
    fn new(kind: MarkKind) -> Self {
        Self {
            kind,
            message: kind.rule().message.to_string(),
        }
    }
}

/// Range check for one candidate value. `None` is the cleared/empty input.
pub fn validate(kind: MarkKind, value: Option<i64>) -> Result<Option<u8>, MarkRejection> {
    let rule = kind.rule();
    match value {
        None if rule.allows_empty => Ok(None),
        None => Err(MarkRejection::new(kind)),
        Some(v) if kind.accepts(v) => u8::try_from(v)
            .map(Some)
            .map_err(|_| MarkRejection::new(kind)),
        Some(_) => Err(MarkRejection::new(kind)),
    }
}

/// Parses raw form text as an integer mark. Blank text is the empty input;
/// anything that does not parse as an integer is rejected outright.
pub fn parse_mark_input(kind: MarkKind, raw: &str) -> Result<Option<u8>, MarkRejection> {
    let t = raw.trim();
    if t.is_empty() {
        return validate(kind, None);
    }
    let value = t.parse::<i64>().map_err(|_| MarkRejection::new(kind))?;
    validate(kind, Some(value))
}

/// Two-decimal rounding, half away from zero.
pub fn round_2dp(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Normalizes three unit tests (0-30 each, missing counts as 0) onto 20.
pub fn unit_test_aggregate(test1: Option<u8>, test2: Option<u8>, test3: Option<u8>) -> f64 {
    let raw: u32 = [test1, test2, test3]
        .iter()
        .map(|t| u32::from(t.unwrap_or(0)))
        .sum();
    round_2dp((f64::from(raw) / UNIT_TEST_MAX_TOTAL) * UNIT_TEST_SCALE)
}

/// Final term-work mark out of 25 from the proportionate assignment marks
/// (out of 60) plus the normalized unit-test score (out of 20).
pub fn final_mark(proportionate_assignment_marks: u8, unit_test_aggregate: f64) -> f64 {
    let total_obtained = f64::from(proportionate_assignment_marks) + unit_test_aggregate;
    round_2dp((total_obtained / FINAL_MAX_TOTAL) * FINAL_SCALE)
}

/// Scales the saved per-experiment assignment marks (out of 10 each) onto 60.
pub fn suggested_proportionate_assignment<I>(assignment_marks: I) -> Option<u8>
where
    I: IntoIterator<Item = u8>,
{
    let mut count: u32 = 0;
    let mut sum: u32 = 0;
    for m in assignment_marks {
        count += 1;
        sum += u32::from(m);
    }
    if count == 0 {
        return None;
    }
    let scaled = (f64::from(sum) / (f64::from(count) * 10.0)) * f64::from(PROPORTIONATE_ASSIGNMENT_MAX);
    u8::try_from(scaled.round() as i64).ok()
}
