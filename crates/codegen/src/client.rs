use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

/// One prompt sent to the code generator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenRequest {
    pub prompt: String,
}

impl CodegenRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// The code generator could not be reached or refused the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("code generator unavailable: {message}")]
pub struct CollaboratorUnavailable {
    pub message: String,
}

impl CollaboratorUnavailable {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Turns a natural-language prompt into a raw model response.
///
/// Transport, authentication and retries live behind this trait. The
/// response is returned verbatim; parsing it is the caller's job.
#[async_trait(?Send)]
pub trait CodegenClient {
    async fn generate(&self, request: &CodegenRequest) -> Result<String, CollaboratorUnavailable>;
}

/// Answers prompts from a fixed prompt-to-response table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplayClient {
    responses: HashMap<String, String>,
}

impl ReplayClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(prompt.into(), response.into());
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

#[async_trait(?Send)]
impl CodegenClient for ReplayClient {
    async fn generate(&self, request: &CodegenRequest) -> Result<String, CollaboratorUnavailable> {
        match self.responses.get(request.prompt.trim()) {
            Some(response) => {
                log::debug!("replaying response for {:?}", request.prompt);
                Ok(response.clone())
            }
            None => Err(CollaboratorUnavailable::new(format!(
                "no recorded response for prompt {:?}",
                request.prompt
            ))),
        }
    }
}

/// Hands out queued results in order and records every request.
///
/// Each call yields to the executor once before answering, so concurrent
/// generations interleave the way real network calls would.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    queue: RefCell<VecDeque<Result<String, CollaboratorUnavailable>>>,
    requests: RefCell<Vec<CodegenRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: impl Into<String>) -> &Self {
        self.queue.borrow_mut().push_back(Ok(response.into()));
        self
    }

    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.queue
            .borrow_mut()
            .push_back(Err(CollaboratorUnavailable::new(message)));
        self
    }

    pub fn requests(&self) -> Vec<CodegenRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.queue.borrow().len()
    }
}

#[async_trait(?Send)]
impl CodegenClient for ScriptedClient {
    async fn generate(&self, request: &CodegenRequest) -> Result<String, CollaboratorUnavailable> {
        self.requests.borrow_mut().push(request.clone());
        smol::future::yield_now().await;
        self.queue
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorUnavailable::new("no scripted response left")))
    }
}
