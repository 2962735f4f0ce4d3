//! Chat pipeline: validate → rate-limit → session → obfuscated prompt →
//! LLM tool loop → deobfuscated reply.
//!
//! Stored message content is always raw; obfuscation applies to the copies
//! sent upstream, and the per-request token table reverses any placeholder
//! the model echoes back.

use std::sync::Arc;
use std::time::Duration;

use folio_core::config::{ChatConfig, LlmConfig};
use folio_core::events::{Event, EventBus, MessageEvent, RateLimitEvent, SessionEvent};
use folio_limiter::RateLimiter;
use folio_llm::{
    with_retry, ChatRequest as LlmRequest, ChatResponse, CircuitBreaker, LlmError, LlmProvider,
    RetryPolicy,
};
use folio_privacy::{Obfuscator, PiiToken};
use folio_tools::{execute_tool_call, ToolRegistry};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::store::ChatStore;
use crate::types::{ChatReply, ChatRequest, ChatSession, MessageRole, ReplyMessage};

/// Hard cap on LLM round-trips per request, whatever the model does.
const TOOL_LOOP_MAX: usize = 8;

pub struct ChatOrchestrator {
    store: ChatStore,
    limiter: RateLimiter,
    obfuscator: Obfuscator,
    provider: Arc<dyn LlmProvider>,
    breaker: Arc<CircuitBreaker>,
    tools: ToolRegistry,
    events: Arc<EventBus>,
    chat_config: ChatConfig,
    llm_config: LlmConfig,
}

impl ChatOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: ChatStore,
        limiter: RateLimiter,
        provider: Arc<dyn LlmProvider>,
        breaker: Arc<CircuitBreaker>,
        tools: ToolRegistry,
        events: Arc<EventBus>,
        chat_config: ChatConfig,
        llm_config: LlmConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            obfuscator: Obfuscator::new(),
            provider,
            breaker,
            tools,
            events,
            chat_config,
            llm_config,
        }
    }

    /// Handle one visitor message end to end.
    pub async fn send_message(&self, req: ChatRequest) -> Result<ChatReply> {
        self.validate(&req)?;

        let decision = self.limiter.consume(&req.ip_hash).await;
        if !decision.allowed {
            let retry_after_secs = decision.retry_after_secs.unwrap_or(1);
            self.events.emit(Event::ChatRateLimited(RateLimitEvent {
                ip_hash: req.ip_hash.clone(),
                retry_after_secs,
            }));
            return Err(ChatError::RateLimited { retry_after_secs });
        }

        let deadline = Duration::from_millis(self.chat_config.deadline_ms);
        match tokio::time::timeout(deadline, self.handle(req)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline_ms = self.chat_config.deadline_ms, "chat request deadline elapsed");
                Err(ChatError::DeadlineExceeded {
                    ms: self.chat_config.deadline_ms,
                })
            }
        }
    }

    /// Mark a session ended and emit the lifecycle event.
    pub fn end_session(&self, session_id: &str) -> Result<()> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| ChatError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        self.store.end_session(session_id)?;
        self.events.emit(Event::ChatSessionEnded(SessionEvent {
            session_id: session.id,
            visitor_id: session.visitor_id,
        }));
        Ok(())
    }

    fn validate(&self, req: &ChatRequest) -> Result<()> {
        if req.visitor_id.trim().is_empty() {
            return Err(ChatError::InvalidRequest("visitorId is required".to_string()));
        }
        if req.message.trim().is_empty() {
            return Err(ChatError::InvalidRequest("message must not be empty".to_string()));
        }
        if req.message.chars().count() > self.chat_config.max_message_chars {
            return Err(ChatError::InvalidRequest(format!(
                "message must be at most {} characters",
                self.chat_config.max_message_chars
            )));
        }
        Ok(())
    }

    async fn handle(&self, req: ChatRequest) -> Result<ChatReply> {
        let session = self.resolve_session(&req)?;

        // The raw user message is persisted before anything can fail upstream.
        self.store
            .append_message(&session.id, MessageRole::User, &req.message, None, None)?;

        // Recency window including the message just appended; outbound copies
        // are obfuscated, the token table stays in memory for this request.
        let history = self
            .store
            .recent_messages(&session.id, self.chat_config.history_window)?;
        let mut token_table: Vec<PiiToken> = Vec::new();
        let mut raw_messages: Vec<Value> = Vec::with_capacity(history.len());
        for message in &history {
            let obfuscated = self.obfuscator.obfuscate(&message.content);
            for token in obfuscated.tokens {
                if !token_table
                    .iter()
                    .any(|t| t.placeholder == token.placeholder && t.original == token.original)
                {
                    token_table.push(token);
                }
            }
            raw_messages.push(serde_json::json!({
                "role": message.role.as_str(),
                "content": obfuscated.text,
            }));
        }

        let response = self.run_tool_loop(raw_messages).await?;
        let content = self
            .obfuscator
            .deobfuscate(&response.reply.content, &token_table);

        self.store.append_message(
            &session.id,
            MessageRole::Assistant,
            &content,
            Some(response.total_tokens as i64),
            Some(&response.reply.model),
        )?;
        self.events.emit(Event::ChatMessageSent(MessageEvent {
            session_id: session.id.clone(),
            role: MessageRole::Assistant.as_str().to_string(),
            tokens_used: response.total_tokens,
        }));

        Ok(ChatReply {
            session_id: session.id,
            message: ReplyMessage {
                role: MessageRole::Assistant,
                content,
            },
            tokens_used: response.total_tokens,
        })
    }

    fn resolve_session(&self, req: &ChatRequest) -> Result<ChatSession> {
        if let Some(session) = self.store.find_active_session(&req.visitor_id)? {
            debug!(session_id = %session.id, "existing chat session");
            return Ok(session);
        }
        let session =
            self.store
                .create_session(&req.visitor_id, &req.ip_hash, req.user_agent.as_deref())?;
        self.events.emit(Event::ChatSessionStarted(SessionEvent {
            session_id: session.id.clone(),
            visitor_id: session.visitor_id.clone(),
        }));
        Ok(session)
    }

    /// Drive the model until it stops calling tools or the iteration cap is
    /// reached. Tool failures are fed back as `{success:false}` results, not
    /// surfaced as request errors.
    async fn run_tool_loop(&self, mut raw_messages: Vec<Value>) -> Result<LoopOutcome> {
        let base = LlmRequest {
            model: self.llm_config.model.clone(),
            system: self.chat_config.system_prompt.clone(),
            messages: Vec::new(),
            max_tokens: self.llm_config.max_tokens,
            temperature: self.llm_config.temperature,
            tools: self.tools.definitions(),
            raw_messages: None,
        };

        let mut total_tokens: u32 = 0;
        let mut last_response: Option<ChatResponse> = None;

        for iteration in 0..TOOL_LOOP_MAX {
            let mut llm_req = base.clone();
            llm_req.raw_messages = Some(raw_messages.clone());

            let response = self.invoke_llm(&llm_req).await?;
            total_tokens += response.tokens_used;

            if response.tool_calls.is_empty() {
                debug!(iteration, "tool loop complete");
                return Ok(LoopOutcome {
                    reply: response,
                    total_tokens,
                });
            }

            let tool_calls: Vec<Value> = response
                .tool_calls
                .iter()
                .map(|call| {
                    serde_json::json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
            raw_messages.push(serde_json::json!({
                "role": "assistant",
                "content": if response.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(response.content.clone())
                },
                "tool_calls": tool_calls,
            }));

            for call in &response.tool_calls {
                let result = execute_tool_call(&self.tools, call).await;
                raw_messages.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": result,
                }));
            }

            last_response = Some(response);
        }

        info!(max_iterations = TOOL_LOOP_MAX, "tool loop hit iteration cap");
        let reply = last_response.ok_or_else(|| {
            ChatError::Llm(LlmError::Unavailable(
                "tool loop produced no response".to_string(),
            ))
        })?;
        Ok(LoopOutcome {
            reply,
            total_tokens,
        })
    }

    async fn invoke_llm(&self, req: &LlmRequest) -> std::result::Result<ChatResponse, LlmError> {
        let policy = RetryPolicy::with_max_retries(self.llm_config.max_retries);
        with_retry(&policy, || {
            self.breaker.execute(|| self.provider.send(req))
        })
        .await
    }
}

struct LoopOutcome {
    reply: ChatResponse,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use folio_content::{ContentRepository, ContentStatus, ContentType, CreateContent};
    use folio_core::cache::MemoryCache;
    use folio_core::config::LimiterConfig;
    use folio_llm::{CircuitBreakerConfig, ToolCall};
    use rusqlite::Connection;
    use std::sync::Mutex;

    /// Scripted provider: pops responses front-to-back and records every
    /// request it saw. An empty script repeats the last response.
    struct StubProvider {
        script: Mutex<Vec<ChatResponse>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl StubProvider {
        fn new(script: Vec<ChatResponse>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> LlmRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn send(&self, req: &LlmRequest) -> std::result::Result<ChatResponse, LlmError> {
            self.requests.lock().unwrap().push(req.clone());
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                Ok(script[0].clone())
            }
        }
    }

    fn text_response(content: &str, tokens: u32) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            model: "stub-model".to_string(),
            tokens_used: tokens,
            stop_reason: "stop".to_string(),
            tool_calls: Vec::new(),
        }
    }

    fn tool_response(name: &str, arguments: Value, tokens: u32) -> ChatResponse {
        ChatResponse {
            content: String::new(),
            model: "stub-model".to_string(),
            tokens_used: tokens,
            stop_reason: "tool_calls".to_string(),
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: name.to_string(),
                arguments,
            }],
        }
    }

    fn seeded_repo() -> Arc<ContentRepository> {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        folio_content::db::init_db(&conn).unwrap();
        let repo = Arc::new(ContentRepository::new(
            conn,
            Arc::new(EventBus::new()),
        ));
        repo.create(
            CreateContent {
                content_type: ContentType::Project,
                slug: "demo".to_string(),
                data: serde_json::json!({"title": "Demo", "description": "A demo"}),
                status: Some(ContentStatus::Published),
                sort_order: None,
            },
            None,
        )
        .unwrap();
        repo
    }

    fn orchestrator(provider: Arc<StubProvider>, capacity: f64) -> ChatOrchestrator {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        crate::db::init_db(&conn).unwrap();

        let events = Arc::new(EventBus::new());
        let llm_config = LlmConfig {
            provider: "stub".to_string(),
            api_key: "test".to_string(),
            base_url: "http://localhost".to_string(),
            model: "stub-model".to_string(),
            max_tokens: 256,
            temperature: 0.0,
            timeout_ms: 5000,
            max_retries: 0,
        };

        ChatOrchestrator::new(
            ChatStore::new(conn),
            RateLimiter::new(
                Arc::new(MemoryCache::new()),
                &LimiterConfig {
                    capacity,
                    refill_rate: 0.01,
                    ttl_secs: 300,
                },
            ),
            provider,
            Arc::new(CircuitBreaker::new(
                "stub",
                CircuitBreakerConfig::default(),
                events.clone(),
            )),
            folio_tools::content_tools::chat_registry(seeded_repo()),
            events,
            ChatConfig::default(),
            llm_config,
        )
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            visitor_id: "v1".to_string(),
            ip_hash: "hash-1".to_string(),
            user_agent: None,
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn happy_path_persists_both_messages() {
        let provider = StubProvider::new(vec![text_response("Hello", 7)]);
        let orch = orchestrator(provider.clone(), 10.0);

        let reply = orch.send_message(request("Hi")).await.unwrap();
        assert_eq!(reply.message.role, MessageRole::Assistant);
        assert_eq!(reply.message.content, "Hello");
        assert_eq!(reply.tokens_used, 7);

        let session = orch.store.get_session(&reply.session_id).unwrap().unwrap();
        assert_eq!(session.message_count, 2);

        let messages = orch.store.recent_messages(&reply.session_id, 10).unwrap();
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "Hi");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].model.as_deref(), Some("stub-model"));
    }

    #[tokio::test]
    async fn session_is_reused_across_messages() {
        let provider = StubProvider::new(vec![text_response("ok", 1)]);
        let orch = orchestrator(provider, 10.0);

        let first = orch.send_message(request("one")).await.unwrap();
        let second = orch.send_message(request("two")).await.unwrap();
        assert_eq!(first.session_id, second.session_id);

        let messages = orch.store.recent_messages(&first.session_id, 10).unwrap();
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn rate_limit_denies_with_retry_after() {
        let provider = StubProvider::new(vec![text_response("ok", 1)]);
        let orch = orchestrator(provider, 2.0);

        assert!(orch.send_message(request("1")).await.is_ok());
        assert!(orch.send_message(request("2")).await.is_ok());

        match orch.send_message(request("3")).await {
            Err(ChatError::RateLimited { retry_after_secs }) => {
                assert!(retry_after_secs >= 1);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn validation_rejects_bad_requests() {
        let provider = StubProvider::new(vec![text_response("ok", 1)]);
        let orch = orchestrator(provider.clone(), 10.0);

        assert!(matches!(
            orch.send_message(request("   ")).await,
            Err(ChatError::InvalidRequest(_))
        ));
        assert!(matches!(
            orch.send_message(request(&"x".repeat(2001))).await,
            Err(ChatError::InvalidRequest(_))
        ));
        let mut req = request("hi");
        req.visitor_id = String::new();
        assert!(matches!(
            orch.send_message(req).await,
            Err(ChatError::InvalidRequest(_))
        ));
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn outbound_prompt_is_obfuscated_and_reply_restored() {
        let provider = StubProvider::new(vec![text_response("Sure, I will write to [EMAIL_1]", 5)]);
        let orch = orchestrator(provider.clone(), 10.0);

        let reply = orch
            .send_message(request("Email me at a@b.co"))
            .await
            .unwrap();

        // The prompt that left the process carries the placeholder only.
        let sent = provider.request(0);
        let outbound = serde_json::to_string(&sent.raw_messages).unwrap();
        assert!(outbound.contains("[EMAIL_1]"));
        assert!(!outbound.contains("a@b.co"));

        // The echoed placeholder is reversed in the visible reply.
        assert_eq!(reply.message.content, "Sure, I will write to a@b.co");

        // Stored user message keeps the raw text.
        let messages = orch.store.recent_messages(&reply.session_id, 10).unwrap();
        assert_eq!(messages[0].content, "Email me at a@b.co");
    }

    #[tokio::test]
    async fn tool_calls_loop_back_into_the_model() {
        let provider = StubProvider::new(vec![
            tool_response(
                "get_content",
                serde_json::json!({"type": "project", "slug": "demo"}),
                11,
            ),
            text_response("Demo is a project", 9),
        ]);
        let orch = orchestrator(provider.clone(), 10.0);

        let reply = orch.send_message(request("Tell me about demo")).await.unwrap();
        assert_eq!(reply.message.content, "Demo is a project");
        assert_eq!(reply.tokens_used, 20);
        assert_eq!(provider.request_count(), 2);

        // The follow-up request carries the assistant tool_calls turn and the
        // adapter's JSON result.
        let followup = provider.request(1);
        let raw = followup.raw_messages.unwrap();
        let tool_msg = raw
            .iter()
            .find(|m| m["role"] == "tool")
            .expect("tool result message");
        let payload: Value =
            serde_json::from_str(tool_msg["content"].as_str().unwrap()).unwrap();
        assert_eq!(payload["success"], true);
        assert_eq!(payload["data"]["item"]["slug"], "demo");
    }

    #[tokio::test]
    async fn failing_tool_feeds_error_back_not_up() {
        let provider = StubProvider::new(vec![
            tool_response(
                "get_content",
                serde_json::json!({"type": "project", "slug": "missing"}),
                3,
            ),
            text_response("I could not find it", 4),
        ]);
        let orch = orchestrator(provider.clone(), 10.0);

        let reply = orch.send_message(request("look it up")).await.unwrap();
        assert_eq!(reply.message.content, "I could not find it");

        let followup = provider.request(1);
        let raw = followup.raw_messages.unwrap();
        let tool_msg = raw.iter().find(|m| m["role"] == "tool").unwrap();
        let payload: Value =
            serde_json::from_str(tool_msg["content"].as_str().unwrap()).unwrap();
        assert_eq!(payload["success"], false);
    }

    #[tokio::test]
    async fn end_session_emits_lifecycle_event() {
        let provider = StubProvider::new(vec![text_response("ok", 1)]);
        let orch = orchestrator(provider, 10.0);
        let mut rx = orch.events.subscribe();

        let reply = orch.send_message(request("hi")).await.unwrap();
        orch.end_session(&reply.session_id).unwrap();

        let mut keys = Vec::new();
        while let Ok(event) = rx.try_recv() {
            keys.push(event.key());
        }
        assert!(keys.contains(&"chat:session_started"));
        assert!(keys.contains(&"chat:message_sent"));
        assert!(keys.contains(&"chat:session_ended"));

        assert!(orch.end_session("sess_missing").is_err());
    }

    #[tokio::test]
    async fn tool_loop_terminates_at_cap() {
        // A model that never stops calling tools.
        let provider = StubProvider::new(vec![tool_response(
            "list_content",
            serde_json::json!({"type": "project"}),
            1,
        )]);
        let orch = orchestrator(provider.clone(), 10.0);

        let reply = orch.send_message(request("loop forever")).await.unwrap();
        assert_eq!(provider.request_count(), TOOL_LOOP_MAX);
        assert_eq!(reply.tokens_used, TOOL_LOOP_MAX as u32);
    }
}
