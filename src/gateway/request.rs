use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::DispatchError;
use crate::DispatchOptions;
use crate::Document;
use crate::DocumentId;
use crate::DocumentOperation;
use crate::DocumentUpdate;
use crate::TestAndSetCondition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentMethod {
    Put,
    Update,
    Remove,
    Get,
}

/// One single-document request as received from the transport.
///
/// The id and body are kept raw until the first dispatch attempt.
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    pub path_id: String,
    pub id: String,
    pub method: DocumentMethod,
    pub body: Option<Bytes>,
    pub condition: Option<String>,
    pub create: bool,
    pub field_set: Option<String>,
    pub route: Option<String>,
    pub timeout: Option<Duration>,
    pub trace_level: u8,
    pub cancellation: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct OperationBody {
    #[serde(default)]
    fields: Map<String, Value>,
    condition: Option<String>,
    create: Option<bool>,
}

impl DocumentRequest {
    pub fn new(
        method: DocumentMethod,
        id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            path_id: format!("/document/v1/{id}"),
            id,
            method,
            body: None,
            condition: None,
            create: false,
            field_set: None,
            route: None,
            timeout: None,
            trace_level: 0,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn put(
        id: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self::new(DocumentMethod::Put, id).with_body(body)
    }

    pub fn update(
        id: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self::new(DocumentMethod::Update, id).with_body(body)
    }

    pub fn remove(id: impl Into<String>) -> Self {
        Self::new(DocumentMethod::Remove, id)
    }

    pub fn get(id: impl Into<String>) -> Self {
        Self::new(DocumentMethod::Get, id)
    }

    pub fn with_path_id(
        mut self,
        path_id: impl Into<String>,
    ) -> Self {
        self.path_id = path_id.into();
        self
    }

    pub fn with_body(
        mut self,
        body: impl Into<Bytes>,
    ) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_condition(
        mut self,
        condition: impl Into<String>,
    ) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_create(
        mut self,
        create: bool,
    ) -> Self {
        self.create = create;
        self
    }

    pub fn with_field_set(
        mut self,
        field_set: impl Into<String>,
    ) -> Self {
        self.field_set = Some(field_set.into());
        self
    }

    pub fn with_route(
        mut self,
        route: impl Into<String>,
    ) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_trace_level(
        mut self,
        level: u8,
    ) -> Self {
        self.trace_level = level;
        self
    }

    pub fn with_cancellation(
        mut self,
        token: CancellationToken,
    ) -> Self {
        self.cancellation = token;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Decodes the id and body into the operation to issue.
    pub(crate) fn parse(&self) -> std::result::Result<(DocumentOperation, DispatchOptions), DispatchError> {
        let id = DocumentId::parse(&self.id)?;
        let body = match self.method {
            DocumentMethod::Put | DocumentMethod::Update => Some(self.parse_body()?),
            DocumentMethod::Remove | DocumentMethod::Get => None,
        };

        let mut condition = self.condition.clone();
        let mut create = self.create;
        let operation = match (self.method, body) {
            (DocumentMethod::Put, Some(body)) => {
                condition = body.condition.or(condition);
                DocumentOperation::Put {
                    document: Document::new(id, body.fields),
                }
            }
            (DocumentMethod::Update, Some(body)) => {
                condition = body.condition.or(condition);
                create = body.create.unwrap_or(create);
                let update = DocumentUpdate::from_json(id, &body.fields, create).map_err(DispatchError::BadRequest)?;
                DocumentOperation::Update { update }
            }
            (DocumentMethod::Remove, _) => DocumentOperation::Remove { id },
            (DocumentMethod::Get, _) => DocumentOperation::Get {
                id,
                field_set: self.field_set.clone(),
            },
            (method, None) => {
                return Err(DispatchError::BadRequest(format!("{method:?} requires a request body")));
            }
        };

        if matches!(operation, DocumentOperation::Get { .. }) && condition.is_some() {
            return Err(DispatchError::BadRequest("conditions are not supported for get".into()));
        }

        let options = DispatchOptions {
            condition: condition.filter(|c| !c.is_empty()).map(TestAndSetCondition::Selection),
            route: self.route.clone(),
            timeout: self.timeout,
            trace_level: self.trace_level,
        };
        Ok((operation, options))
    }

    fn parse_body(&self) -> std::result::Result<OperationBody, DispatchError> {
        let Some(body) = &self.body else {
            return Err(DispatchError::BadRequest(format!("{:?} requires a request body", self.method)));
        };
        serde_json::from_slice(body).map_err(|e| DispatchError::BadRequest(format!("could not parse request body: {e}")))
    }
}
