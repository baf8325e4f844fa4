//! The orchestration loop.
//!
//! ```text
//! AwaitingCompletion ──(tool calls)──▶ DispatchingTools ──▶ AwaitingCompletion
//!        │                                                        │
//!        └──(no tool calls)──▶ Done        (over budget)──▶ IterationLimitExceeded
//! ```
//!
//! The conversation is append-only. Every tool call produces exactly one tool
//! result, in request order, before the next completion is requested.

use std::fmt;
use std::sync::Arc;

use anvil_providers::{CompletionService, ProviderError};
use anvil_tools::{ToolCtx, ToolRegistry};
use anvil_types::{Message, NonEmptyString};

use crate::config::{AgentSection, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_TOOL_OUTPUT_BYTES};
use crate::tool_loop::dispatch_call;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("no final answer within {limit} iterations")]
    IterationLimitExceeded { limit: u32 },
    #[error("completion request failed: {0}")]
    Completion(#[from] ProviderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    AwaitingCompletion,
    DispatchingTools,
    Done,
    Failed,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopPhase::AwaitingCompletion => "awaiting completion",
            LoopPhase::DispatchingTools => "dispatching tools",
            LoopPhase::Done => "done",
            LoopPhase::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    /// Upper bound on completion requests per run.
    pub max_iterations: u32,
    pub max_tool_output_bytes: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tool_output_bytes: DEFAULT_MAX_TOOL_OUTPUT_BYTES,
        }
    }
}

impl From<&AgentSection> for AgentSettings {
    fn from(section: &AgentSection) -> Self {
        Self {
            max_iterations: section.max_iterations,
            max_tool_output_bytes: section.max_tool_output_bytes,
        }
    }
}

pub struct Agent {
    service: Arc<dyn CompletionService>,
    registry: Arc<ToolRegistry>,
    settings: AgentSettings,
    ctx: ToolCtx,
    conversation: Vec<Message>,
    iterations: u32,
    phase: LoopPhase,
}

impl Agent {
    #[must_use]
    pub fn new(
        service: Arc<dyn CompletionService>,
        registry: Arc<ToolRegistry>,
        system_prompt: NonEmptyString,
        ctx: ToolCtx,
        settings: AgentSettings,
    ) -> Self {
        Self {
            service,
            registry,
            settings,
            ctx,
            conversation: vec![Message::system(system_prompt)],
            iterations: 0,
            phase: LoopPhase::AwaitingCompletion,
        }
    }

    #[must_use]
    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    /// Completion requests made so far.
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    #[must_use]
    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn enter(&mut self, phase: LoopPhase) {
        if self.phase != phase {
            tracing::info!(from = %self.phase, to = %phase, iteration = self.iterations, "Agent phase");
            self.phase = phase;
        }
    }

    /// Drive the conversation until the model answers without tool calls.
    pub async fn run(&mut self, task: NonEmptyString) -> Result<String, AgentError> {
        self.conversation.push(Message::user(task));
        let definitions = self.registry.definitions();

        loop {
            if self.iterations >= self.settings.max_iterations {
                self.enter(LoopPhase::Failed);
                tracing::warn!(limit = self.settings.max_iterations, "Iteration limit reached");
                return Err(AgentError::IterationLimitExceeded {
                    limit: self.settings.max_iterations,
                });
            }

            self.enter(LoopPhase::AwaitingCompletion);
            let turn = match self.service.complete(&self.conversation, &definitions).await {
                Ok(turn) => turn,
                Err(e) => {
                    self.enter(LoopPhase::Failed);
                    return Err(e.into());
                }
            };
            self.iterations += 1;

            let message = turn.message;
            let calls = message.tool_calls().to_vec();
            let answer = message.content().to_string();
            tracing::debug!(
                iteration = self.iterations,
                tool_calls = calls.len(),
                finish_reason = turn.finish_reason.as_deref().unwrap_or("unknown"),
                "Received assistant turn"
            );
            self.conversation.push(Message::Assistant(message));

            if calls.is_empty() {
                self.enter(LoopPhase::Done);
                return Ok(answer);
            }

            self.enter(LoopPhase::DispatchingTools);
            for call in &calls {
                let mut ctx = self.ctx.for_call(&call.id);
                let result = dispatch_call(
                    &self.registry,
                    call,
                    &mut ctx,
                    self.settings.max_tool_output_bytes,
                )
                .await;
                tracing::info!(
                    tool = %call.name,
                    call_id = %call.id,
                    is_error = result.is_error,
                    "Tool call finished"
                );
                self.conversation.push(Message::tool_result(result));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anvil_providers::{
        AssistantTurn, CompletionFut, CompletionService, ProviderError,
    };
    use anvil_tools::{ToolCtx, ToolExecutor, ToolFut, ToolRegistry};
    use anvil_types::{AssistantMessage, Message, NonEmptyString, ToolCall, ToolDefinition};
    use serde_json::{Value, json};

    use super::{Agent, AgentError, AgentSettings, LoopPhase};

    /// Replays canned turns and records what each request saw.
    #[derive(Default)]
    pub(crate) struct ScriptedService {
        turns: Mutex<VecDeque<AssistantMessage>>,
        pub(crate) requests: Mutex<Vec<Vec<Message>>>,
        pub(crate) tool_names: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedService {
        pub(crate) fn new(turns: Vec<AssistantMessage>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
                ..Self::default()
            })
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl CompletionService for ScriptedService {
        fn complete<'a>(
            &'a self,
            messages: &'a [Message],
            tools: &'a [ToolDefinition],
        ) -> CompletionFut<'a> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.tool_names
                .lock()
                .unwrap()
                .push(tools.iter().map(|t| t.name.clone()).collect());
            let next = self.turns.lock().unwrap().pop_front();
            Box::pin(async move {
                next.map(AssistantTurn::new)
                    .ok_or(ProviderError::EmptyResponse)
            })
        }
    }

    pub(crate) fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall::new(id, name, args)
    }

    pub(crate) fn tool_turn(calls: Vec<ToolCall>) -> AssistantMessage {
        AssistantMessage::new("", calls)
    }

    pub(crate) fn final_turn(text: &str) -> AssistantMessage {
        AssistantMessage::new(text, Vec::new())
    }

    struct Upper;

    impl ToolExecutor for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase text"
        }

        fn schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }

        fn is_side_effecting(&self, _args: &Value) -> bool {
            false
        }

        fn execute<'a>(&'a self, args: Value, _ctx: &'a mut ToolCtx) -> ToolFut<'a> {
            Box::pin(async move {
                Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
            })
        }
    }

    struct Explodes;

    impl ToolExecutor for Explodes {
        fn name(&self) -> &str {
            "explodes"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn schema(&self) -> Value {
            json!({"type": "object"})
        }

        fn is_side_effecting(&self, _args: &Value) -> bool {
            false
        }

        fn execute<'a>(&'a self, _args: Value, _ctx: &'a mut ToolCtx) -> ToolFut<'a> {
            Box::pin(async { panic!("kaboom") })
        }
    }

    fn agent(service: Arc<ScriptedService>, max_iterations: u32) -> Agent {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Upper)).unwrap();
        registry.register(Box::new(Explodes)).unwrap();
        Agent::new(
            service,
            Arc::new(registry),
            NonEmptyString::new("system").unwrap(),
            ToolCtx::new(".", Duration::from_secs(5)),
            AgentSettings {
                max_iterations,
                max_tool_output_bytes: 1024,
            },
        )
    }

    fn task(text: &str) -> NonEmptyString {
        NonEmptyString::new(text).unwrap()
    }

    fn tool_results(conversation: &[Message]) -> Vec<(String, String, bool)> {
        conversation
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult(r) => Some((r.tool_call_id.clone(), r.content.clone(), r.is_error)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn answers_without_tools() {
        let service = ScriptedService::new(vec![final_turn("hello")]);
        let mut agent = agent(service.clone(), 5);

        assert_eq!(agent.run(task("hi")).await.unwrap(), "hello");
        assert_eq!(agent.iterations(), 1);
        assert_eq!(agent.phase(), LoopPhase::Done);
        let roles: Vec<&str> = agent.conversation().iter().map(Message::role_str).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(
            service.tool_names.lock().unwrap()[0],
            vec!["explodes", "upper"]
        );
    }

    #[tokio::test]
    async fn tool_results_follow_request_order() {
        let service = ScriptedService::new(vec![
            tool_turn(vec![
                call("c1", "upper", json!({"text": "one"})),
                call("c2", "upper", json!({"text": "two"})),
            ]),
            final_turn("done"),
        ]);
        let mut agent = agent(service.clone(), 5);

        assert_eq!(agent.run(task("go")).await.unwrap(), "done");
        assert_eq!(
            tool_results(agent.conversation()),
            vec![
                ("c1".to_string(), "ONE".to_string(), false),
                ("c2".to_string(), "TWO".to_string(), false),
            ]
        );
        // The second request saw both results.
        let second = &service.requests.lock().unwrap()[1];
        assert_eq!(second.len(), 5);
        assert_eq!(second[2].tool_calls().len(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_and_panic_do_not_end_run() {
        let service = ScriptedService::new(vec![
            tool_turn(vec![
                call("c1", "foo", json!({})),
                call("c2", "explodes", json!({})),
                call("c3", "upper", json!({"text": "still here"})),
            ]),
            final_turn("recovered"),
        ]);
        let mut agent = agent(service, 5);

        assert_eq!(agent.run(task("go")).await.unwrap(), "recovered");
        let results = tool_results(agent.conversation());
        assert_eq!(results.len(), 3);
        assert!(results[0].2 && results[0].1.contains("foo") && results[0].1.contains("not found"));
        assert!(results[1].2 && results[1].1.contains("kaboom"));
        assert_eq!(results[2].1, "STILL HERE");
    }

    #[tokio::test]
    async fn iteration_limit_bounds_completion_requests() {
        let looping: Vec<AssistantMessage> = (0..10)
            .map(|i| tool_turn(vec![call(&format!("c{i}"), "upper", json!({"text": "x"}))]))
            .collect();
        let service = ScriptedService::new(looping);
        let mut agent = agent(service.clone(), 3);

        let err = agent.run(task("spin")).await.unwrap_err();
        assert!(matches!(err, AgentError::IterationLimitExceeded { limit: 3 }));
        assert_eq!(service.request_count(), 3);
        assert_eq!(agent.iterations(), 3);
        assert_eq!(agent.phase(), LoopPhase::Failed);
        assert_eq!(tool_results(agent.conversation()).len(), 3);
    }

    #[tokio::test]
    async fn completion_failure_surfaces() {
        let service = ScriptedService::new(Vec::new());
        let mut agent = agent(service, 5);
        let err = agent.run(task("go")).await.unwrap_err();
        assert!(matches!(err, AgentError::Completion(ProviderError::EmptyResponse)));
    }

    #[tokio::test]
    async fn invalid_arguments_reported_to_model() {
        let service = ScriptedService::new(vec![
            tool_turn(vec![call("c1", "upper", json!({"wrong": 1}))]),
            final_turn("ok"),
        ]);
        let mut agent = agent(service, 5);
        agent.run(task("go")).await.unwrap();

        let results = tool_results(agent.conversation());
        assert!(results[0].2);
        assert!(results[0].1.starts_with("Invalid arguments for upper"));
    }
}
