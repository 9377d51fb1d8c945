// src/test_support.rs
//
// Shared mocks for the in-module test suites: a transport with scripted
// per-operation replies and an operator with scripted prompt/confirm
// answers, both recording what they were asked.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::gateway::Operator;
use crate::rpc::{DeviceTransport, RpcError};

/// Transport that replays enqueued results per operation name.
///
/// An operation with no queue at all resolves with `null` (accepted
/// no-reply call); an operation whose queue has run dry resolves with
/// `Disconnected`, which is how the upgrade tests model a device that has
/// gone quiet.
pub struct ScriptedTransport {
    calls: Mutex<Vec<(String, serde_json::Value)>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<serde_json::Value, RpcError>>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn enqueue(&self, operation: &str, result: Result<serde_json::Value, RpcError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(result);
    }

    /// Every call made so far, in order: (operation, args).
    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| op == operation)
            .count()
    }
}

#[async_trait]
impl DeviceTransport for ScriptedTransport {
    async fn call(
        &self,
        operation: &'static str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), args));

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(operation) {
            Some(queue) => queue.pop_front().unwrap_or(Err(RpcError::Disconnected)),
            None => Ok(serde_json::Value::Null),
        }
    }
}

/// Operator that answers prompts from a queue and records reported errors.
pub struct RecordingOperator {
    confirm_reply: AtomicBool,
    confirms: Mutex<Vec<String>>,
    prompt_replies: Mutex<VecDeque<Option<String>>>,
    errors: Mutex<Vec<(String, String)>>,
}

impl RecordingOperator {
    pub fn new() -> Self {
        Self {
            confirm_reply: AtomicBool::new(false),
            confirms: Mutex::new(Vec::new()),
            prompt_replies: Mutex::new(VecDeque::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn set_confirm_reply(&self, reply: bool) {
        self.confirm_reply.store(reply, Ordering::SeqCst);
    }

    pub fn push_prompt_reply(&self, reply: Option<String>) {
        self.prompt_replies.lock().unwrap().push_back(reply);
    }

    /// Confirmation questions asked so far.
    pub fn confirms(&self) -> Vec<String> {
        self.confirms.lock().unwrap().clone()
    }

    /// Errors reported so far: (context, detail).
    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl Operator for RecordingOperator {
    async fn confirm(&self, message: &str) -> bool {
        self.confirms.lock().unwrap().push(message.to_string());
        self.confirm_reply.load(Ordering::SeqCst)
    }

    async fn prompt(&self, _message: &str, _current: &str) -> Option<String> {
        self.prompt_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(None)
    }

    async fn report_error(&self, context: &str, detail: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((context.to_string(), detail.to_string()));
    }
}
