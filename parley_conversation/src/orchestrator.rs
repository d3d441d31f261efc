use std::sync::Arc;
use std::time::Duration;

use parley_core::{ChatMessage, LLMProvider, Usage};
use parley_threads::ThreadStore;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

/// Configuration for turn orchestration.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Model to use for completions
    pub model: String,
    /// Upper bound on one model invocation
    pub invoke_timeout: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            invoke_timeout: Duration::from_secs(60),
        }
    }
}

impl TurnConfig {
    /// Set the model name.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Set the invocation timeout.
    #[must_use]
    pub const fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }
}

/// Errors that can fail a conversational turn.
///
/// A failed turn retains the user message that was already appended;
/// only the assistant reply is absent. Resubmitting the same text asks
/// again with the failed attempt's context included.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("model invocation failed: {0}")]
    Invocation(#[source] anyhow::Error),

    #[error("model invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty response from model")]
    EmptyResponse,
}

/// Result of a successful turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Assistant's reply
    pub reply: String,
    /// Thread the turn ran on, generated when the caller supplied none
    pub thread_id: String,
    /// Token usage reported by the provider
    pub usage: Option<Usage>,
}

/// Executes conversational turns against a shared thread store.
///
/// Turns on one thread serialize on that thread's gate so every turn
/// observes and extends a single linear history. The gate is held across
/// the model call; the store's own lock never is.
pub struct TurnOrchestrator<P = Arc<dyn LLMProvider>>
where
    P: Send + Sync,
{
    provider: P,
    store: Arc<ThreadStore>,
    config: TurnConfig,
}

impl<P> TurnOrchestrator<P>
where
    P: LLMProvider + Send + Sync,
{
    pub fn new(provider: P, store: Arc<ThreadStore>, config: TurnConfig) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Execute one turn: append the user message, invoke the model with
    /// the full history, append and return the reply.
    ///
    /// A missing `thread_id` starts a new thread under a generated
    /// 128-bit random id, returned in the outcome so the caller can
    /// continue the conversation.
    pub async fn handle_turn(
        &self,
        input_text: &str,
        thread_id: Option<String>,
    ) -> Result<TurnOutcome, TurnError> {
        let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let _turn = self.store.begin_turn(&thread_id).await;
        info!("Processing turn for thread: {thread_id}");

        self.store
            .append(&thread_id, ChatMessage::user(input_text.to_string()))
            .await;

        let history = self.store.snapshot(&thread_id).await;
        debug!(
            "Invoking model {} with {} messages",
            self.config.model,
            history.len()
        );

        let response = timeout(
            self.config.invoke_timeout,
            self.provider.chat(&history, &self.config.model),
        )
        .await
        .map_err(|_| TurnError::Timeout(self.config.invoke_timeout))?
        .map_err(TurnError::Invocation)?;

        if response.content.trim().is_empty() {
            return Err(TurnError::EmptyResponse);
        }

        self.store
            .append(&thread_id, ChatMessage::assistant(response.content.clone()))
            .await;

        debug!("Turn completed for thread: {thread_id}");

        Ok(TurnOutcome {
            reply: response.content,
            thread_id,
            usage: response.usage,
        })
    }

    /// Read a thread's accumulated history. Unknown ids read as empty.
    pub async fn history(&self, thread_id: &str) -> Vec<ChatMessage> {
        self.store.snapshot(thread_id).await
    }

    /// The store this orchestrator appends to.
    #[must_use]
    pub const fn store(&self) -> &Arc<ThreadStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::{LLMResponse, Role};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider that records every history it is invoked with.
    struct FakeProvider {
        replies: Vec<String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
        delay: Duration,
        fail_first: AtomicUsize,
    }

    impl FakeProvider {
        fn replying(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().map(ToString::to_string).collect(),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                fail_first: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing_first(self, n: usize) -> Self {
            self.fail_first.store(n, Ordering::SeqCst);
            self
        }

        fn seen_histories(&self) -> Vec<Vec<ChatMessage>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LLMProvider for FakeProvider {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _model: &str,
        ) -> anyhow::Result<LLMResponse> {
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            self.seen.lock().unwrap().push(messages.to_vec());
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("scripted failure");
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let content = self
                .replies
                .get(call.min(self.replies.len().saturating_sub(1)))
                .cloned()
                .unwrap_or_else(|| "ok".to_string());
            Ok(LLMResponse {
                content,
                usage: None,
            })
        }

        fn default_model(&self) -> &'static str {
            "fake"
        }
    }

    fn orchestrator(provider: FakeProvider) -> TurnOrchestrator<Arc<FakeProvider>> {
        TurnOrchestrator::new(
            Arc::new(provider),
            Arc::new(ThreadStore::new()),
            TurnConfig::default().with_invoke_timeout(Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn serial_turns_alternate_user_assistant() {
        let orch = orchestrator(FakeProvider::replying(&["r0", "r1", "r2"]));

        let first = orch.handle_turn("m0", None).await.unwrap();
        let id = first.thread_id.clone();
        orch.handle_turn("m1", Some(id.clone())).await.unwrap();
        orch.handle_turn("m2", Some(id.clone())).await.unwrap();

        let history = orch.history(&id).await;
        assert_eq!(history.len(), 6);
        for (i, pair) in history.chunks(2).enumerate() {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].content, format!("m{i}"));
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("r{i}"));
        }
    }

    #[tokio::test]
    async fn generated_thread_ids_are_unique() {
        let orch = orchestrator(FakeProvider::replying(&["ok"]));

        let mut ids = HashSet::new();
        for _ in 0..50 {
            let outcome = orch.handle_turn("hello", None).await.unwrap();
            assert!(ids.insert(outcome.thread_id));
        }
        assert_eq!(orch.store().thread_count().await, 50);
    }

    #[tokio::test]
    async fn failed_invocation_retains_user_message() {
        let orch = orchestrator(FakeProvider::replying(&["recovered"]).failing_first(1));

        let err = orch
            .handle_turn("hello", Some("t".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Invocation(_)));

        // Exactly one message appended: the user's.
        let history = orch.history("t").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "hello");

        // A resubmitted turn succeeds and extends the same history.
        orch.handle_turn("hello", Some("t".to_string()))
            .await
            .unwrap();
        let history = orch.history("t").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].content, "recovered");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_invocation_fails_without_assistant_append() {
        let provider = FakeProvider::replying(&["late"]).with_delay(Duration::from_secs(120));
        let orch = TurnOrchestrator::new(
            Arc::new(provider),
            Arc::new(ThreadStore::new()),
            TurnConfig::default().with_invoke_timeout(Duration::from_secs(1)),
        );

        let err = orch
            .handle_turn("hello", Some("t".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Timeout(_)));

        let history = orch.history("t").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn blank_reply_is_a_failure() {
        let orch = orchestrator(FakeProvider::replying(&["  \n "]));

        let err = orch
            .handle_turn("hello", Some("t".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::EmptyResponse));
        assert_eq!(orch.history("t").await.len(), 1);
    }

    #[tokio::test]
    async fn empty_input_is_accepted() {
        let orch = orchestrator(FakeProvider::replying(&["reply"]));
        let outcome = orch.handle_turn("", Some("t".to_string())).await.unwrap();
        assert_eq!(outcome.reply, "reply");

        let history = orch.history("t").await;
        assert_eq!(history[0].content, "");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_turns_on_same_thread_observe_linear_history() {
        let provider = Arc::new(
            FakeProvider::replying(&["ra", "rb"]).with_delay(Duration::from_millis(100)),
        );
        let orch = Arc::new(TurnOrchestrator::new(
            Arc::clone(&provider),
            Arc::new(ThreadStore::new()),
            TurnConfig::default().with_invoke_timeout(Duration::from_secs(5)),
        ));

        let a = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.handle_turn("A", Some("t".to_string())).await })
        };
        // Let turn A take the gate before submitting B.
        tokio::time::sleep(Duration::from_millis(1)).await;
        let b = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.handle_turn("B", Some("t".to_string())).await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let history = orch.history("t").await;
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["A", "ra", "B", "rb"]);

        // Every invocation saw a history ending in its own user message,
        // and B's view included all of A's turn.
        let seen = provider.seen_histories();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].last().unwrap().content, "A");
        assert_eq!(seen[1].last().unwrap().content, "B");
        assert_eq!(seen[1].len(), 3);
        assert_eq!(seen[1][0].content, "A");
        assert_eq!(seen[1][1].content, "ra");
    }

    #[tokio::test(start_paused = true)]
    async fn turns_on_distinct_threads_run_in_parallel() {
        let provider =
            Arc::new(FakeProvider::replying(&["ok"]).with_delay(Duration::from_millis(200)));
        let orch = Arc::new(TurnOrchestrator::new(
            Arc::clone(&provider),
            Arc::new(ThreadStore::new()),
            TurnConfig::default().with_invoke_timeout(Duration::from_secs(5)),
        ));

        let started = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            orch.handle_turn("hello", Some("a".to_string())),
            orch.handle_turn("hello", Some("b".to_string())),
        );
        a.unwrap();
        b.unwrap();

        // Serialized turns would take 400ms of (paused) clock.
        assert!(started.elapsed() < Duration::from_millis(350));
        assert_eq!(orch.history("a").await.len(), 2);
        assert_eq!(orch.history("b").await.len(), 2);
    }
}
