use serde::{Deserialize, Serialize};

/// Status message of the idle snapshot the store starts with.
pub const READY_MESSAGE: &str = "ready";

/// Raw job parameters as entered by the user. Not yet validated.
///
/// Pass through [`ParameterValidator`](crate::ParameterValidator) to obtain
/// [`JobParameters`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInput {
    /// Kept as a float so non-integer form input can be rejected explicitly.
    pub desired_count: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl ParameterInput {
    pub fn new(desired_count: u32, min_price: Option<f64>, max_price: Option<f64>) -> Self {
        Self {
            desired_count: f64::from(desired_count),
            min_price,
            max_price,
        }
    }

    /// Build input from the three text fields of a form.
    ///
    /// Blank or unparseable price fields count as missing. An unparseable
    /// count becomes `NaN`, which the validator reports as out of range.
    pub fn from_form(count: &str, min_price: &str, max_price: &str) -> Self {
        fn bound(field: &str) -> Option<f64> {
            field.trim().parse::<f64>().ok()
        }

        Self {
            desired_count: count.trim().parse::<f64>().unwrap_or(f64::NAN),
            min_price: bound(min_price),
            max_price: bound(max_price),
        }
    }
}

/// Validated parameters for one scrape job.
///
/// Only constructible through [`ParameterValidator::validate`](crate::ParameterValidator::validate),
/// so holding one means every invariant has been checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobParameters {
    #[serde(rename = "count")]
    pub(crate) desired_count: u32,
    pub(crate) min_price: f64,
    pub(crate) max_price: f64,
}

impl JobParameters {
    pub fn desired_count(&self) -> u32 {
        self.desired_count
    }

    pub fn min_price(&self) -> f64 {
        self.min_price
    }

    pub fn max_price(&self) -> f64 {
        self.max_price
    }
}

/// One extracted ticker with its closing price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub code: String,
    pub price: f64,
}

impl ResultRecord {
    pub fn new(code: impl Into<String>, price: f64) -> Self {
        Self {
            code: code.into(),
            price,
        }
    }

    /// Price formatted for display, e.g. `¥1500.00`.
    pub fn display_price(&self) -> String {
        format!("¥{:.2}", self.price)
    }
}

/// Snapshot of the remote job as last observed.
///
/// Every successful poll replaces the whole snapshot; fields are never
/// merged across polls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub is_running: bool,
    #[serde(rename = "progress")]
    pub progress_percent: u8,
    pub status_message: String,
    pub results: Vec<ResultRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            progress_percent: 0,
            status_message: READY_MESSAGE.to_string(),
            results: Vec::new(),
            error: None,
        }
    }
}

impl JobStatus {
    /// The line a status panel should show: the error when there is one.
    pub fn headline(&self) -> &str {
        self.error.as_deref().unwrap_or(&self.status_message)
    }

    /// Whether anything beyond the idle "ready" state has been observed.
    pub fn has_activity(&self) -> bool {
        self.status_message != READY_MESSAGE || self.error.is_some()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Acknowledgement body returned when a job is accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SubmissionAck(pub serde_json::Value);

impl SubmissionAck {
    /// The service's human-readable acknowledgement, if it sent one.
    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(|v| v.as_str())
    }
}

/// Column a result view is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Code,
    Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// How a caller wants results ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Same key, opposite direction. Used when a column header is clicked twice.
    pub fn toggled(self) -> Self {
        let direction = match self.direction {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        };
        Self { direction, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_idle() {
        let status = JobStatus::default();
        assert!(!status.is_running);
        assert_eq!(status.progress_percent, 0);
        assert_eq!(status.status_message, "ready");
        assert!(status.results.is_empty());
        assert!(!status.has_activity());
    }

    #[test]
    fn test_headline_prefers_error() {
        let mut status = JobStatus {
            status_message: "Fetching prices (40/100)".into(),
            ..Default::default()
        };
        assert_eq!(status.headline(), "Fetching prices (40/100)");

        assert!(!status.has_error());

        status.error = Some("upstream timed out".into());
        assert_eq!(status.headline(), "upstream timed out");
        assert!(status.has_error());
        assert!(status.has_activity());
    }

    #[test]
    fn test_parameters_wire_shape() {
        let params = JobParameters {
            desired_count: 30,
            min_price: 100.0,
            max_price: 500.5,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["count"], 30);
        assert_eq!(json["min_price"], 100.0);
        assert_eq!(json["max_price"], 500.5);
        assert!(json.get("desired_count").is_none());
    }

    #[test]
    fn test_status_serializes_wire_names() {
        let status = JobStatus {
            is_running: true,
            progress_percent: 42,
            ..Default::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"progress\":42"));
        assert!(json.contains("\"is_running\":true"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_from_form() {
        let input = ParameterInput::from_form(" 30 ", "100", "");
        assert_eq!(input.desired_count, 30.0);
        assert_eq!(input.min_price, Some(100.0));
        assert_eq!(input.max_price, None);

        let input = ParameterInput::from_form("thirty", "1.5", "abc");
        assert!(input.desired_count.is_nan());
        assert_eq!(input.max_price, None);
    }

    #[test]
    fn test_display_price() {
        assert_eq!(ResultRecord::new("7203", 1500.0).display_price(), "¥1500.00");
        assert_eq!(ResultRecord::new("A1", 199.999).display_price(), "¥200.00");
    }

    #[test]
    fn test_ack_message() {
        let ack: SubmissionAck =
            serde_json::from_str(r#"{"message": "scrape started"}"#).unwrap();
        assert_eq!(ack.message(), Some("scrape started"));

        let ack: SubmissionAck = serde_json::from_str(r#"{"ok": true}"#).unwrap();
        assert_eq!(ack.message(), None);
    }

    #[test]
    fn test_sort_spec_toggle() {
        let spec = SortSpec::new(SortKey::Price, SortDirection::Ascending);
        assert_eq!(spec.toggled().direction, SortDirection::Descending);
        assert_eq!(spec.toggled().toggled(), spec);
        assert_eq!(spec.toggled().key, SortKey::Price);
    }
}
