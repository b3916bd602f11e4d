use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::BackendResponse;
use crate::DispatchResult;
use crate::Document;
use crate::DocumentId;
use crate::DocumentSession;
use crate::DocumentUpdate;
use crate::OperationParameters;
use crate::Outcome;
use crate::Responder;
use crate::TestAndSetCondition;

/// One call observed by a [`ScriptedSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCall {
    pub operation: &'static str,
    pub id: DocumentId,
    pub condition: Option<TestAndSetCondition>,
    pub result: DispatchResult,
}

/// Document session answering from a script.
///
/// Each call takes the next scripted [`DispatchResult`], falling back to the
/// default once the script is empty. Accepted calls are answered with the
/// configured outcome right away, or held until [`ScriptedSession::release`].
pub struct ScriptedSession {
    script: Mutex<VecDeque<DispatchResult>>,
    default_result: Mutex<DispatchResult>,
    outcome: Mutex<Outcome>,
    holding: Mutex<bool>,
    held: Mutex<Vec<Responder>>,
    calls: Mutex<Vec<SessionCall>>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_result: Mutex::new(DispatchResult::Accepted),
            outcome: Mutex::new(Outcome::Success),
            holding: Mutex::new(false),
            held: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(
        &self,
        results: impl IntoIterator<Item = DispatchResult>,
    ) {
        self.script.lock().extend(results);
    }

    pub fn set_default(
        &self,
        result: DispatchResult,
    ) {
        *self.default_result.lock() = result;
    }

    /// Refuses every call with a transient error until reset.
    pub fn stall(&self) {
        self.set_default(DispatchResult::TransientError("busy".into()));
    }

    pub fn unstall(&self) {
        self.set_default(DispatchResult::Accepted);
    }

    pub fn respond_with(
        &self,
        outcome: Outcome,
    ) {
        *self.outcome.lock() = outcome;
    }

    pub fn hold_responses(&self) {
        *self.holding.lock() = true;
    }

    /// Answers every held call with `outcome` and stops holding.
    pub fn release(
        &self,
        outcome: Outcome,
    ) -> usize {
        *self.holding.lock() = false;
        let held: Vec<Responder> = self.held.lock().drain(..).collect();
        let n = held.len();
        for responder in held {
            responder.respond(BackendResponse::new(outcome));
        }
        n
    }

    pub fn held(&self) -> usize {
        self.held.lock().len()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Ids of accepted calls, in call order.
    pub fn accepted_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.result == DispatchResult::Accepted)
            .map(|c| c.id.to_string())
            .collect()
    }

    fn call(
        &self,
        operation: &'static str,
        id: &DocumentId,
        params: OperationParameters,
        document: Option<Document>,
    ) -> DispatchResult {
        let result = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_result.lock().clone());
        self.calls.lock().push(SessionCall {
            operation,
            id: id.clone(),
            condition: params.condition.clone(),
            result: result.clone(),
        });

        if result == DispatchResult::Accepted {
            if *self.holding.lock() {
                self.held.lock().push(params.responder);
            } else {
                let outcome = *self.outcome.lock();
                let mut response = BackendResponse::new(outcome);
                if let Some(document) = document.filter(|_| outcome == Outcome::Success) {
                    response = response.with_document(document);
                }
                params.responder.respond(response);
            }
        }
        result
    }
}

impl DocumentSession for ScriptedSession {
    fn put(
        &self,
        document: Document,
        params: OperationParameters,
    ) -> DispatchResult {
        self.call("put", &document.id, params, None)
    }

    fn update(
        &self,
        update: DocumentUpdate,
        params: OperationParameters,
    ) -> DispatchResult {
        self.call("update", &update.id, params, None)
    }

    fn remove(
        &self,
        id: DocumentId,
        params: OperationParameters,
    ) -> DispatchResult {
        self.call("remove", &id, params, None)
    }

    fn get(
        &self,
        id: DocumentId,
        _field_set: Option<String>,
        params: OperationParameters,
    ) -> DispatchResult {
        let document = Document::new(id.clone(), Default::default());
        self.call("get", &id, params, Some(document))
    }
}
