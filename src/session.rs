//! Conversation state and turn orchestration
//!
//! A session owns the message history and runs one turn at a time: push the
//! user prompt, stream the assistant's reply through a [`StreamConsumer`],
//! and notify a [`SegmentSink`] with the re-parsed segment list on every
//! flush. Cancellation flows backwards through the streaming callback as a
//! typed error; whatever was buffered before the stop is kept.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use crate::approval::PendingAction;
use crate::llm::{
    LLMProvider, LLMRequest, Message, ModelOptions, StreamingCallback, StreamingError,
};
use crate::streaming::{Segment, StreamConsumer, TokenizerLimits, DEFAULT_FLUSH_INTERVAL};

/// Observer for a turn in progress.
///
/// `on_segments` always receives the full segment list for the turn so far,
/// never a delta; implementations replace their previous rendering.
pub trait SegmentSink: Send + Sync {
    fn on_segments(&self, segments: &[Segment]);

    /// Called once per newly seen pending action, across all flushes of the
    /// turn.
    fn on_pending(&self, _action: &PendingAction) {}

    /// Polled before each chunk; returning `false` stops the stream.
    fn should_continue(&self) -> bool {
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No message at position {index}")]
    NoSuchMessage { index: usize },
}

/// What one completed (or cancelled) turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Final segment list for the assistant reply.
    pub segments: Vec<Segment>,
    /// Approval requests announced during this turn.
    pub pending: Vec<PendingAction>,
    /// The stream was stopped by the user before the model finished.
    pub cancelled: bool,
}

pub struct ChatSession {
    messages: Vec<Message>,
    system_prompt: String,
    options: ModelOptions,
    limits: TokenizerLimits,
    flush_interval: Duration,
}

impl ChatSession {
    pub fn new(system_prompt: String, options: ModelOptions) -> Self {
        Self {
            messages: Vec::new(),
            system_prompt,
            options,
            limits: TokenizerLimits::default(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    pub fn with_limits(mut self, limits: TokenizerLimits, flush_interval: Duration) -> Self {
        self.limits = limits;
        self.flush_interval = flush_interval;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Remove one message from the history by position.
    pub fn delete_message(&mut self, index: usize) -> Result<Message, SessionError> {
        if index >= self.messages.len() {
            return Err(SessionError::NoSuchMessage { index });
        }
        Ok(self.messages.remove(index))
    }

    /// Run one turn: send the prompt and stream the reply into `sink`.
    ///
    /// The raw assistant text (tags included) is appended to the history so
    /// the model sees its own tool protocol on the next turn. A cancelled
    /// turn keeps whatever arrived before the stop.
    pub async fn send_turn(
        &mut self,
        provider: &dyn LLMProvider,
        sink: Arc<dyn SegmentSink>,
        prompt: String,
    ) -> Result<TurnOutcome> {
        self.messages.push(Message::user(prompt));

        let consumer = Arc::new(Mutex::new(StreamConsumer::new(
            self.limits.clone(),
            self.flush_interval,
        )));
        let seen_pending = Arc::new(Mutex::new(HashSet::new()));

        let callback: StreamingCallback = {
            let consumer = consumer.clone();
            let seen_pending = seen_pending.clone();
            let sink = sink.clone();
            Box::new(move |chunk: &str| {
                if !sink.should_continue() {
                    return Err(StreamingError::UserCancelled.into());
                }
                let mut consumer = consumer.lock().unwrap();
                if let Some(segments) = consumer.push_chunk(chunk) {
                    notify(sink.as_ref(), &segments, &mut seen_pending.lock().unwrap());
                }
                Ok(())
            })
        };

        let request = LLMRequest {
            messages: self.messages.clone(),
            system_prompt: self.system_prompt.clone(),
            options: Some(self.options.clone()),
        };

        let mut cancelled = false;
        match provider.send_message(request, Some(&callback)).await {
            Ok(_) => {}
            Err(e) => match e.downcast_ref::<StreamingError>() {
                Some(StreamingError::UserCancelled) => cancelled = true,
                _ => return Err(e),
            },
        }
        drop(callback);

        let mut consumer = consumer.lock().unwrap();
        let segments = consumer.finish();
        notify(sink.as_ref(), &segments, &mut seen_pending.lock().unwrap());

        let pending: Vec<PendingAction> = segments
            .iter()
            .filter_map(Segment::pending_action)
            .collect();

        let raw = consumer.buffer().to_string();
        if !raw.is_empty() {
            self.messages.push(Message::assistant(raw));
        }

        Ok(TurnOutcome {
            segments,
            pending,
            cancelled,
        })
    }
}

fn notify(sink: &dyn SegmentSink, segments: &[Segment], seen: &mut HashSet<String>) {
    sink.on_segments(segments);
    for action in segments.iter().filter_map(Segment::pending_action) {
        if seen.insert(action.request_id.clone()) {
            sink.on_pending(&action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMResponse, Usage};
    use crate::streaming::SegmentKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockProvider {
        chunks: Vec<String>,
    }

    impl MockProvider {
        fn new(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for MockProvider {
        async fn send_message(
            &self,
            _request: LLMRequest,
            streaming_callback: Option<&StreamingCallback>,
        ) -> Result<LLMResponse> {
            let callback = streaming_callback.unwrap();
            for chunk in &self.chunks {
                callback(chunk)?;
            }
            Ok(LLMResponse {
                content: self.chunks.concat(),
                usage: Usage::zero(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        latest: Mutex<Vec<Segment>>,
        pending_seen: AtomicUsize,
        continue_for: Option<(AtomicUsize, usize)>,
    }

    impl RecordingSink {
        fn stop_after(chunks: usize) -> Self {
            Self {
                continue_for: Some((AtomicUsize::new(0), chunks)),
                ..Default::default()
            }
        }
    }

    impl SegmentSink for RecordingSink {
        fn on_segments(&self, segments: &[Segment]) {
            *self.latest.lock().unwrap() = segments.to_vec();
        }

        fn on_pending(&self, _action: &PendingAction) {
            self.pending_seen.fetch_add(1, Ordering::SeqCst);
        }

        fn should_continue(&self) -> bool {
            match &self.continue_for {
                None => true,
                Some((calls, limit)) => calls.fetch_add(1, Ordering::SeqCst) < *limit,
            }
        }
    }

    fn session() -> ChatSession {
        ChatSession::new("You are helpful.".to_string(), ModelOptions::default())
            .with_limits(TokenizerLimits::default(), Duration::ZERO)
    }

    #[tokio::test]
    async fn turn_produces_ordered_segments_and_history() {
        let provider = MockProvider::new(&[
            "Let me think. <thou",
            "ght>hmm</thought>",
            "The answer is 4.",
        ]);
        let sink = Arc::new(RecordingSink::default());
        let mut session = session();

        let outcome = session
            .send_turn(&provider, sink.clone(), "2+2?".to_string())
            .await
            .unwrap();

        assert!(!outcome.cancelled);
        let contents: Vec<&str> = outcome.segments.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["Let me think.", "hmm", "The answer is 4."]);
        assert_eq!(*sink.latest.lock().unwrap(), outcome.segments);

        // History keeps the raw text, tags included.
        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "2+2?");
        assert!(messages[1].content.contains("<thought>hmm</thought>"));
    }

    #[tokio::test]
    async fn pending_actions_are_reported_once() {
        // "eyJhIjoxfQ==" is {"a":1}
        let tag = r#"<tool_pending request_id="r1" tool="file" action="write" params_b64="eyJhIjoxfQ==" />"#;
        let provider = MockProvider::new(&["queued ", tag, " waiting", " still waiting"]);
        let sink = Arc::new(RecordingSink::default());
        let mut session = session();

        let outcome = session
            .send_turn(&provider, sink.clone(), "write it".to_string())
            .await
            .unwrap();

        assert_eq!(outcome.pending.len(), 1);
        assert_eq!(outcome.pending[0].request_id, "r1");
        // Every flush re-parses the same tag; the sink hears about it once.
        assert_eq!(sink.pending_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_keeps_partial_output() {
        let provider = MockProvider::new(&["first ", "second ", "third"]);
        let sink = Arc::new(RecordingSink::stop_after(2));
        let mut session = session();

        let outcome = session
            .send_turn(&provider, sink, "go".to_string())
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.segments.len(), 1);
        assert_eq!(outcome.segments[0].content, "first second");
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn transport_errors_propagate_and_keep_the_user_message() {
        struct FailingProvider;

        #[async_trait]
        impl LLMProvider for FailingProvider {
            async fn send_message(
                &self,
                _request: LLMRequest,
                _streaming_callback: Option<&StreamingCallback>,
            ) -> Result<LLMResponse> {
                anyhow::bail!("connection refused")
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let mut session = session();
        let result = session.send_turn(&FailingProvider, sink, "hi".to_string()).await;

        assert!(result.is_err());
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn empty_reply_appends_no_assistant_message() {
        let provider = MockProvider::new(&[]);
        let sink = Arc::new(RecordingSink::default());
        let mut session = session();

        let outcome = session
            .send_turn(&provider, sink, "hi".to_string())
            .await
            .unwrap();
        assert!(outcome.segments.is_empty());
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn delete_message_checks_bounds() {
        let mut session = session();
        assert!(matches!(
            session.delete_message(0),
            Err(SessionError::NoSuchMessage { index: 0 })
        ));
    }

    #[tokio::test]
    async fn segments_use_expected_kinds() {
        let provider =
            MockProvider::new(&[r#"<tool_call name="web"><query>rust</query></tool_call>"#]);
        let sink = Arc::new(RecordingSink::default());
        let mut session = session();

        let outcome = session
            .send_turn(&provider, sink, "search".to_string())
            .await
            .unwrap();
        assert_eq!(outcome.segments.len(), 1);
        assert_eq!(outcome.segments[0].kind, SegmentKind::Tool);
    }
}
