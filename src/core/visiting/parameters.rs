use std::time::Duration;

use crate::VisitError;

pub(crate) const DEFAULT_BUCKET_SPACE: &str = "default";

/// Slicing of the bucket space: this request visits slice `id` out of `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub count: u32,
    pub id: u32,
}

/// Immutable configuration of one bulk request.
///
/// Built once through [`VisitorParametersBuilder`]; resuming derives a fresh
/// value with [`VisitorParameters::with_resume_token`].
#[derive(Debug, Clone, PartialEq)]
pub struct VisitorParameters {
    selection: Option<String>,
    field_set: Option<String>,
    bucket_space: String,
    max_pending: usize,
    from_timestamp: Option<u64>,
    to_timestamp: Option<u64>,
    resume_token: Option<String>,
    slice: Option<Slice>,
    session_timeout: Duration,
    wanted_document_count: Option<u64>,
    remote_destination: Option<String>,
    include_removes: bool,
    trace_level: u8,
}

impl VisitorParameters {
    pub fn builder() -> VisitorParametersBuilder {
        VisitorParametersBuilder::default()
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn field_set(&self) -> Option<&str> {
        self.field_set.as_deref()
    }

    pub fn bucket_space(&self) -> &str {
        &self.bucket_space
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    pub fn from_timestamp(&self) -> Option<u64> {
        self.from_timestamp
    }

    pub fn to_timestamp(&self) -> Option<u64> {
        self.to_timestamp
    }

    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    pub fn slice(&self) -> Option<Slice> {
        self.slice
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    pub fn wanted_document_count(&self) -> Option<u64> {
        self.wanted_document_count
    }

    /// Set when visited documents are forwarded to another destination
    /// instead of being returned through this gateway.
    pub fn remote_destination(&self) -> Option<&str> {
        self.remote_destination.as_deref()
    }

    /// Whether removal entries within the time window are delivered too.
    pub fn include_removes(&self) -> bool {
        self.include_removes
    }

    pub fn trace_level(&self) -> u8 {
        self.trace_level
    }

    pub fn with_resume_token(
        &self,
        token: impl Into<String>,
    ) -> Self {
        Self {
            resume_token: Some(token.into()),
            ..self.clone()
        }
    }

    pub(crate) fn with_session_timeout(
        &self,
        session_timeout: Duration,
    ) -> Self {
        Self {
            session_timeout,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisitorParametersBuilder {
    params: VisitorParameters,
}

impl Default for VisitorParametersBuilder {
    fn default() -> Self {
        Self {
            params: VisitorParameters {
                selection: None,
                field_set: None,
                bucket_space: DEFAULT_BUCKET_SPACE.to_string(),
                max_pending: 32,
                from_timestamp: None,
                to_timestamp: None,
                resume_token: None,
                slice: None,
                session_timeout: Duration::from_secs(175),
                wanted_document_count: None,
                remote_destination: None,
                include_removes: false,
                trace_level: 0,
            },
        }
    }
}

impl VisitorParametersBuilder {
    pub fn selection(
        mut self,
        selection: impl Into<String>,
    ) -> Self {
        self.params.selection = Some(selection.into());
        self
    }

    pub fn field_set(
        mut self,
        field_set: impl Into<String>,
    ) -> Self {
        self.params.field_set = Some(field_set.into());
        self
    }

    pub fn bucket_space(
        mut self,
        bucket_space: impl Into<String>,
    ) -> Self {
        self.params.bucket_space = bucket_space.into();
        self
    }

    pub fn max_pending(
        mut self,
        max_pending: usize,
    ) -> Self {
        self.params.max_pending = max_pending;
        self
    }

    pub fn time_window(
        mut self,
        from: Option<u64>,
        to: Option<u64>,
    ) -> Self {
        self.params.from_timestamp = from;
        self.params.to_timestamp = to;
        self
    }

    pub fn resume_token(
        mut self,
        token: impl Into<String>,
    ) -> Self {
        self.params.resume_token = Some(token.into());
        self
    }

    pub fn slice(
        mut self,
        count: u32,
        id: u32,
    ) -> Self {
        self.params.slice = Some(Slice { count, id });
        self
    }

    pub fn session_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.params.session_timeout = timeout;
        self
    }

    pub fn wanted_document_count(
        mut self,
        count: u64,
    ) -> Self {
        self.params.wanted_document_count = Some(count);
        self
    }

    pub fn remote_destination(
        mut self,
        destination: impl Into<String>,
    ) -> Self {
        self.params.remote_destination = Some(destination.into());
        self
    }

    pub fn include_removes(
        mut self,
        include: bool,
    ) -> Self {
        self.params.include_removes = include;
        self
    }

    pub fn trace_level(
        mut self,
        level: u8,
    ) -> Self {
        self.params.trace_level = level;
        self
    }

    pub fn build(self) -> std::result::Result<VisitorParameters, VisitError> {
        let p = self.params;
        if p.max_pending == 0 {
            return Err(VisitError::InvalidParameters("max_pending must be > 0".into()));
        }
        if let Some(slice) = p.slice {
            if slice.count == 0 || slice.id >= slice.count {
                return Err(VisitError::InvalidParameters(format!(
                    "slice id {} must be in [0, {})",
                    slice.id, slice.count
                )));
            }
        }
        if let (Some(from), Some(to)) = (p.from_timestamp, p.to_timestamp) {
            if from > to {
                return Err(VisitError::InvalidParameters(format!(
                    "from timestamp {from} is after to timestamp {to}"
                )));
            }
        }
        if p.wanted_document_count == Some(0) {
            return Err(VisitError::InvalidParameters("wanted document count must be > 0".into()));
        }
        if p.session_timeout.is_zero() {
            return Err(VisitError::InvalidParameters("session timeout must be > 0".into()));
        }
        Ok(p)
    }
}
