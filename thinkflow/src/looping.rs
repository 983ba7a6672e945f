//! Loop controller for the generate → evaluate → decide → select cycle.
//!
//! The controller owns the [`RunState`] and moves through explicit phases:
//!
//! ```text
//! Generate → Evaluate → Decide ─┬─ Retry ──→ Generate
//!                               └─ Proceed → Select → Done
//! ```
//!
//! Generation and evaluation failures are converted to data by the agents, so
//! a run only returns `Err` for invalid input.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tracing::{debug, info, instrument};

use crate::agents::evaluator::ThoughtEvaluator;
use crate::agents::generator::ThoughtGenerator;
use crate::core::budget::RunDeadline;
use crate::core::gate::QualityGate;
use crate::core::selector::select_best;
use crate::core::state::{RunState, StateUpdate};
use crate::core::types::{
    AttemptRecord, Decision, Evaluation, EvaluationFailure, GenerationFailure, ProceedReason,
    RunOutcome,
};
use crate::io::backend::Backend;
use crate::io::config::ThinkConfig;

/// Most evaluation threads alive at once when scoring in parallel.
pub const MAX_PARALLEL_EVALUATIONS: usize = 8;

/// Settings for one run of the loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Thoughts requested per generation attempt.
    pub k: usize,
    pub gate: QualityGate,
    /// Score the thoughts of a batch on scoped threads, at most
    /// [`MAX_PARALLEL_EVALUATIONS`] at a time.
    pub parallel_evaluations: bool,
    /// Upper bound for a single backend call.
    pub call_timeout: Duration,
    /// Upper bound for the whole run. Calls never outlive it.
    pub run_timeout: Duration,
    pub generation_temperature: f32,
    pub evaluation_temperature: f32,
    pub json_output: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_config(&ThinkConfig::default())
    }
}

impl LoopConfig {
    pub fn from_config(cfg: &ThinkConfig) -> Self {
        Self {
            k: cfg.k,
            gate: cfg.gate(),
            parallel_evaluations: cfg.parallel_evaluations,
            call_timeout: Duration::from_secs(cfg.backend.call_timeout_secs),
            run_timeout: Duration::from_secs(cfg.run_timeout_secs),
            generation_temperature: cfg.backend.generation_temperature,
            evaluation_temperature: cfg.backend.evaluation_temperature,
            json_output: cfg.backend.json_mode,
        }
    }
}

/// Controller phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Generate,
    Evaluate,
    Decide,
    Select(ProceedReason),
    Done(ProceedReason),
}

/// Run the thought loop for `problem` until a batch is selected.
///
/// `on_attempt` is called once per generation attempt, after the quality gate
/// has decided on the batch.
#[instrument(skip_all, fields(k = config.k, max_retries = config.gate.max_retries, parallel = config.parallel_evaluations))]
pub fn run_thought_loop<B: Backend + ?Sized, F: FnMut(&AttemptRecord)>(
    backend: &B,
    problem: &str,
    config: &LoopConfig,
    mut on_attempt: F,
) -> Result<RunOutcome> {
    if problem.trim().is_empty() {
        bail!("problem must be non-empty");
    }
    if config.k == 0 {
        bail!("k must be >= 1");
    }

    let deadline = RunDeadline::after(config.run_timeout);
    let generator = ThoughtGenerator::new(config.generation_temperature, config.json_output);
    let evaluator = ThoughtEvaluator::new(config.evaluation_temperature, config.json_output);

    let mut state = RunState::new(problem);
    let mut phase = Phase::Generate;
    let mut attempt_started = Instant::now();

    let stop = loop {
        phase = match phase {
            Phase::Generate => {
                let update =
                    generate_batch(backend, &generator, &state.problem, config, deadline);
                state.apply(update);
                debug!(attempt = state.retries, thoughts = state.thoughts.len(), "batch generated");
                Phase::Evaluate
            }
            Phase::Evaluate => {
                if !state.thoughts.is_empty() {
                    let evaluations = evaluate_batch(
                        backend,
                        &evaluator,
                        &state.problem,
                        &state.thoughts,
                        config,
                        deadline,
                    );
                    state.apply(StateUpdate::Evaluated(evaluations));
                }
                Phase::Decide
            }
            Phase::Decide => {
                let decision = config.gate.decide(&state.evaluations, state.retries);
                let record = AttemptRecord {
                    attempt: state.retries,
                    thoughts: state.thoughts.clone(),
                    evaluations: state.evaluations.clone(),
                    generation_failure: state.generation_failure.clone(),
                    decision,
                    duration_ms: attempt_started.elapsed().as_millis() as u64,
                };
                info!(
                    attempt = record.attempt,
                    best_score = ?record.best_score(),
                    threshold = config.gate.min_quality_score,
                    decision = ?decision,
                    "batch decided"
                );
                on_attempt(&record);
                match decision {
                    Decision::Retry => {
                        state.apply(StateUpdate::Discarded);
                        attempt_started = Instant::now();
                        Phase::Generate
                    }
                    Decision::Proceed(reason) => Phase::Select(reason),
                }
            }
            Phase::Select(reason) => {
                let best = select_best(&state.evaluations).cloned();
                state.apply(StateUpdate::Selected(best));
                Phase::Done(reason)
            }
            Phase::Done(reason) => break reason,
        };
    };

    info!(
        attempts = state.retries,
        stop = ?stop,
        best_score = ?state.best.as_ref().map(|e| e.score),
        "thought loop finished"
    );
    Ok(RunOutcome {
        attempts: state.retries,
        stop,
        best: state.best,
    })
}

fn generate_batch<B: Backend + ?Sized>(
    backend: &B,
    generator: &ThoughtGenerator,
    problem: &str,
    config: &LoopConfig,
    deadline: RunDeadline,
) -> StateUpdate {
    let result = match deadline.call_budget(config.call_timeout) {
        Ok(timeout) => generator.generate(backend, problem, config.k, timeout),
        Err(err) => Err(GenerationFailure::new(err.to_string())),
    };
    match result {
        Ok(thoughts) => StateUpdate::Generated {
            thoughts,
            failure: None,
        },
        Err(failure) => StateUpdate::Generated {
            thoughts: Vec::new(),
            failure: Some(failure),
        },
    }
}

/// Score every thought of a batch. The result is in thought order.
fn evaluate_batch<B: Backend + ?Sized>(
    backend: &B,
    evaluator: &ThoughtEvaluator,
    problem: &str,
    thoughts: &[String],
    config: &LoopConfig,
    deadline: RunDeadline,
) -> Vec<Evaluation> {
    let score = |thought: &str| match deadline.call_budget(config.call_timeout) {
        Ok(timeout) => evaluator.evaluate(backend, problem, thought, timeout),
        Err(err) => Evaluation::degraded(thought, &EvaluationFailure::new(err.to_string())),
    };

    if !config.parallel_evaluations || thoughts.len() < 2 {
        return thoughts.iter().map(|thought| score(thought)).collect();
    }

    let score = &score;
    let mut evaluations = Vec::with_capacity(thoughts.len());
    for chunk in thoughts.chunks(MAX_PARALLEL_EVALUATIONS) {
        thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|thought| scope.spawn(move || score(thought)))
                .collect();
            // Joined in spawn order so evaluations line up with thoughts.
            evaluations.extend(handles.into_iter().zip(chunk).map(|(handle, thought)| {
                handle.join().unwrap_or_else(|_| {
                    Evaluation::degraded(
                        thought,
                        &EvaluationFailure::new("evaluation thread panicked"),
                    )
                })
            }));
        });
    }
    evaluations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::MAX_RETRIES;
    use crate::io::backend::{BackendError, RequestKind};
    use crate::io::config::DEFAULT_K;
    use crate::io::backend::CompletionRequest;
    use crate::test_support::{ScriptedBackend, ScriptedReply, score_reply, thoughts_reply};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that records how many evaluations run at the same time.
    #[derive(Default)]
    struct ConcurrencyTracker {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Backend for ConcurrencyTracker {
        fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
            match request.kind {
                RequestKind::Generate => {
                    let thoughts: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
                    Ok(json!({ "thoughts": thoughts }).to_string())
                }
                RequestKind::Evaluate => {
                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(json!({ "score": 9, "reason": "ok" }).to_string())
                }
            }
        }
    }

    fn config(k: usize) -> LoopConfig {
        LoopConfig {
            k,
            call_timeout: Duration::from_secs(5),
            run_timeout: Duration::from_secs(30),
            ..LoopConfig::default()
        }
    }

    #[test]
    fn proceeds_when_quality_met() {
        let backend = ScriptedBackend::new()
            .generate(thoughts_reply(&["step A", "step B"]))
            .evaluate(score_reply(4, "weak"))
            .evaluate(score_reply(8, "strong"));

        let mut records = Vec::new();
        let outcome = run_thought_loop(&backend, "problem", &config(2), |r| {
            records.push(r.clone());
        })
        .expect("run");

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.stop, ProceedReason::QualityMet);
        let best = outcome.best.expect("best");
        assert_eq!(best.thought, "step B");
        assert_eq!(best.score, 8);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decision, Decision::Proceed(ProceedReason::QualityMet));
    }

    #[test]
    fn low_quality_batch_is_discarded_and_regenerated() {
        let backend = ScriptedBackend::new()
            .generate(thoughts_reply(&["step A"]))
            .generate(thoughts_reply(&["step C"]))
            .score("step A", 3)
            .score("step C", 9);

        let mut records = Vec::new();
        let outcome =
            run_thought_loop(&backend, "problem", &config(1), |r| records.push(r.clone()))
                .expect("run");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].decision, Decision::Retry);
        assert_eq!(records[1].attempt, 2);
        assert_eq!(records[1].thoughts, vec!["step C"]);
        assert_eq!(outcome.best.expect("best").thought, "step C");
        assert_eq!(backend.requests_of(RequestKind::Evaluate).len(), 2);
    }

    #[test]
    fn ceiling_stops_after_max_generation_attempts() {
        let mut backend = ScriptedBackend::new();
        for attempt in 1..=MAX_RETRIES {
            backend = backend.generate(thoughts_reply(&[&format!("low {attempt}")]));
        }
        let backend = backend.score("low 1", 1).score("low 2", 2).score("low 3", 3);

        let outcome = run_thought_loop(&backend, "problem", &config(1), |_| {}).expect("run");

        assert_eq!(outcome.attempts, MAX_RETRIES);
        assert_eq!(outcome.stop, ProceedReason::RetryCeilingReached);
        assert_eq!(outcome.best.expect("best").thought, "low 3");
        assert_eq!(
            backend.requests_of(RequestKind::Generate).len(),
            MAX_RETRIES as usize
        );
    }

    #[test]
    fn failed_generation_skips_evaluation_and_yields_no_result() {
        let backend = ScriptedBackend::new().generate(ScriptedReply::Fail(BackendError::Transport(
            "connection refused".to_string(),
        )));

        let mut records = Vec::new();
        let outcome =
            run_thought_loop(&backend, "problem", &config(3), |r| records.push(r.clone()))
                .expect("run");

        assert_eq!(outcome.best, None);
        assert_eq!(outcome.stop, ProceedReason::NoCandidates);
        assert_eq!(outcome.attempts, 1);
        assert!(backend.requests_of(RequestKind::Evaluate).is_empty());
        let failure = records[0].generation_failure.as_ref().expect("failure");
        assert!(failure.message.contains("connection refused"));
    }

    #[test]
    fn evaluation_failure_degrades_only_that_thought() {
        let backend = ScriptedBackend::new()
            .generate(thoughts_reply(&["step A", "step B"]))
            .evaluate(ScriptedReply::Fail(BackendError::Timeout(Duration::from_secs(5))))
            .evaluate(score_reply(7, "ok"));

        let outcome = run_thought_loop(&backend, "problem", &config(2), |_| {}).expect("run");

        assert_eq!(outcome.stop, ProceedReason::QualityMet);
        assert_eq!(outcome.best.expect("best").thought, "step B");
    }

    #[test]
    fn parallel_evaluations_preserve_thought_order() {
        let thoughts = ["t0", "t1", "t2", "t3", "t4", "t5"];
        let mut backend = ScriptedBackend::new().generate(thoughts_reply(&thoughts));
        for (thought, score) in thoughts.iter().zip([2, 9, 4, 9, 1, 0]) {
            backend = backend.score(thought, score);
        }
        let config = LoopConfig {
            parallel_evaluations: true,
            ..config(6)
        };

        let mut records = Vec::new();
        let outcome =
            run_thought_loop(&backend, "problem", &config, |r| records.push(r.clone()))
                .expect("run");

        let evaluated: Vec<&str> = records[0]
            .evaluations
            .iter()
            .map(|e| e.thought.as_str())
            .collect();
        assert_eq!(evaluated, thoughts);
        assert_eq!(outcome.best.expect("best").thought, "t1");
    }

    #[test]
    fn parallel_evaluations_are_capped() {
        let backend = ConcurrencyTracker::default();
        let config = LoopConfig {
            parallel_evaluations: true,
            ..config(20)
        };

        let mut records = Vec::new();
        let outcome =
            run_thought_loop(&backend, "problem", &config, |r| records.push(r.clone()))
                .expect("run");

        assert!(backend.peak.load(Ordering::SeqCst) <= MAX_PARALLEL_EVALUATIONS);
        let evaluated: Vec<String> = records[0]
            .evaluations
            .iter()
            .map(|e| e.thought.clone())
            .collect();
        let expected: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        assert_eq!(evaluated, expected);
        assert_eq!(outcome.best.expect("best").thought, "t0");
    }

    #[test]
    fn huge_run_timeout_does_not_panic() {
        let backend = ScriptedBackend::new()
            .generate(thoughts_reply(&["step A"]))
            .score("step A", 8);
        let config = LoopConfig {
            run_timeout: Duration::from_secs(i64::MAX as u64),
            ..config(1)
        };

        let outcome = run_thought_loop(&backend, "problem", &config, |_| {}).expect("run");

        assert_eq!(outcome.best.expect("best").score, 8);
        assert_eq!(
            backend.requests_of(RequestKind::Evaluate)[0].timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn expired_run_budget_fails_generation_without_calling_backend() {
        let backend = ScriptedBackend::new().generate(thoughts_reply(&["unused"]));
        let config = LoopConfig {
            run_timeout: Duration::ZERO,
            ..config(1)
        };

        let outcome = run_thought_loop(&backend, "problem", &config, |_| {}).expect("run");

        assert_eq!(outcome.best, None);
        assert!(backend.requests().is_empty());
    }

    #[test]
    fn rejects_empty_problem() {
        let backend = ScriptedBackend::new();
        let err = run_thought_loop(&backend, "   ", &config(1), |_| {}).unwrap_err();
        assert!(err.to_string().contains("problem must be non-empty"));
        assert!(backend.requests().is_empty());
    }

    #[test]
    fn default_config_matches_reference_loop() {
        let config = LoopConfig::default();
        assert_eq!(config.k, DEFAULT_K);
        assert_eq!(config.gate, QualityGate::default());
        assert!(!config.parallel_evaluations);
    }
}
