use serde_json::json;
use serde_json::Value;

use crate::ProgressToken;
use crate::VisitError;

/// Where a bulk request stopped, and how far it got.
///
/// A `None` token is only valid at 100%, where it means visiting is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitorContinuation {
    token: Option<String>,
    percent_finished: f64,
}

impl VisitorContinuation {
    pub fn new(
        token: Option<String>,
        percent_finished: f64,
    ) -> std::result::Result<Self, VisitError> {
        if !(0.0..=100.0).contains(&percent_finished) {
            return Err(VisitError::InvalidContinuation(format!(
                "percent finished {percent_finished} out of range"
            )));
        }
        if token.is_none() && percent_finished < 100.0 {
            return Err(VisitError::InvalidContinuation(format!(
                "missing token at {percent_finished}% finished"
            )));
        }
        Ok(Self {
            token,
            percent_finished,
        })
    }

    pub fn exhausted() -> Self {
        Self {
            token: None,
            percent_finished: 100.0,
        }
    }

    pub fn from_progress(progress: &ProgressToken) -> Self {
        match &progress.cursor {
            None => Self::exhausted(),
            Some(cursor) => Self {
                token: Some(cursor.clone()),
                percent_finished: progress.percent_finished.clamp(0.0, 100.0),
            },
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn percent_finished(&self) -> f64 {
        self.percent_finished
    }

    pub fn is_exhausted(&self) -> bool {
        self.token.is_none()
    }

    /// `{"token"?: ..., "percentFinished": ...}` as used by line-oriented responses
    pub fn to_json(&self) -> Value {
        match &self.token {
            Some(token) => json!({ "token": token, "percentFinished": self.percent_finished }),
            None => json!({ "percentFinished": self.percent_finished }),
        }
    }
}
