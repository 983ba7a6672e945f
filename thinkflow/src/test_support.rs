//! Test-only scripted backend and reply helpers.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::json;

use crate::io::backend::{Backend, BackendError, CompletionRequest, RequestKind};

/// One canned backend reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(BackendError),
}

/// Deterministic backend that replays scripted replies.
///
/// Generation and evaluation requests are served from separate queues.
/// Evaluation requests whose thought equals a key registered with
/// [`ScriptedBackend::score`] are answered from that table instead, which keeps
/// replies stable when a batch is scored concurrently.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    generations: Mutex<VecDeque<ScriptedReply>>,
    evaluations: Mutex<VecDeque<ScriptedReply>>,
    scores: HashMap<String, u8>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next generation request.
    pub fn generate(self, reply: ScriptedReply) -> Self {
        lock(&self.generations).push_back(reply);
        self
    }

    /// Queue a reply for the next evaluation request without a scored match.
    pub fn evaluate(self, reply: ScriptedReply) -> Self {
        lock(&self.evaluations).push_back(reply);
        self
    }

    /// Always answer evaluations of `thought` with `score`.
    pub fn score(mut self, thought: &str, score: u8) -> Self {
        self.scores.insert(thought.to_string(), score);
        self
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn requests_of(&self, kind: RequestKind) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.kind == kind)
            .collect()
    }

    fn scored_reply(&self, request: &CompletionRequest) -> Option<ScriptedReply> {
        let section = request.user.split("<thought>").nth(1)?;
        let thought = section.split("</thought>").next()?.trim();
        self.scores
            .get(thought)
            .map(|score| score_reply(*score, &format!("scripted score for {thought}")))
    }
}

impl Backend for ScriptedBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        lock(&self.requests).push(request.clone());
        let reply = match request.kind {
            RequestKind::Generate => lock(&self.generations).pop_front(),
            RequestKind::Evaluate => self
                .scored_reply(request)
                .or_else(|| lock(&self.evaluations).pop_front()),
        };
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(err)) => Err(err),
            None => Err(BackendError::Transport(format!(
                "no scripted {:?} reply left",
                request.kind
            ))),
        }
    }
}

/// Generation reply listing `thoughts`.
pub fn thoughts_reply(thoughts: &[&str]) -> ScriptedReply {
    ScriptedReply::Text(json!({ "thoughts": thoughts }).to_string())
}

/// Evaluation reply with `score` and `reason`.
pub fn score_reply(score: u8, reason: &str) -> ScriptedReply {
    ScriptedReply::Text(json!({ "score": score, "reason": reason }).to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
