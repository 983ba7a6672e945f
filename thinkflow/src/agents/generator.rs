//! Generator agent proposing candidate thoughts.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::core::payload::parse_payload;
use crate::core::types::GenerationFailure;
use crate::io::backend::{Backend, CompletionRequest, RequestKind};
use crate::io::prompt::PromptEngine;

use super::embedded_schema;

const THOUGHTS_SCHEMA: &str = include_str!("../../schemas/thoughts.schema.json");

#[derive(Debug, Deserialize)]
struct ThoughtsPayload {
    thoughts: Vec<String>,
}

/// Generator wrapper that owns sampling settings.
#[derive(Debug)]
pub struct ThoughtGenerator {
    temperature: f32,
    json_output: bool,
    prompts: PromptEngine,
}

impl ThoughtGenerator {
    pub fn new(temperature: f32, json_output: bool) -> Self {
        Self {
            temperature,
            json_output,
            prompts: PromptEngine::new(),
        }
    }

    /// Request up to `k` thoughts for `problem`.
    ///
    /// Fails closed: any backend error, unparsable reply, or empty list yields a
    /// [`GenerationFailure`] and no thoughts. Blank entries are dropped and extra
    /// entries beyond `k` are cut.
    #[instrument(skip_all, fields(k = k, timeout_ms = timeout.as_millis() as u64))]
    pub fn generate<B: Backend + ?Sized>(
        &self,
        backend: &B,
        problem: &str,
        k: usize,
        timeout: Duration,
    ) -> Result<Vec<String>, GenerationFailure> {
        let result = self.request_thoughts(backend, problem, k, timeout);
        match &result {
            Ok(thoughts) => debug!(count = thoughts.len(), "thoughts generated"),
            Err(failure) => warn!(%failure, "generation produced no thoughts"),
        }
        result
    }

    fn request_thoughts<B: Backend + ?Sized>(
        &self,
        backend: &B,
        problem: &str,
        k: usize,
        timeout: Duration,
    ) -> Result<Vec<String>, GenerationFailure> {
        let prompt = self
            .prompts
            .render_generator(problem, k)
            .map_err(|err| GenerationFailure::new(format!("{err:#}")))?;

        let request = CompletionRequest {
            kind: RequestKind::Generate,
            system: prompt.system,
            user: prompt.user,
            temperature: self.temperature,
            json_output: self.json_output,
            timeout,
        };
        let reply = backend
            .complete(&request)
            .map_err(|err| GenerationFailure::new(err.to_string()))?;

        let schema =
            embedded_schema(THOUGHTS_SCHEMA).map_err(|err| GenerationFailure::new(err.to_string()))?;
        let payload: ThoughtsPayload =
            parse_payload(&reply, &schema).map_err(|err| GenerationFailure::new(err.to_string()))?;

        let mut thoughts: Vec<String> = payload
            .thoughts
            .into_iter()
            .map(|thought| thought.trim().to_string())
            .filter(|thought| !thought.is_empty())
            .collect();
        if thoughts.is_empty() {
            return Err(GenerationFailure::new("backend returned no thoughts"));
        }
        if thoughts.len() != k {
            debug!(requested = k, received = thoughts.len(), "thought count differs from request");
        }
        thoughts.truncate(k);
        Ok(thoughts)
    }
}
