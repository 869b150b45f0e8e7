//! End-to-end tests for the request facade, with upstream and cache doubles.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use sanad::{
    CacheEntry, CacheKey, CacheStore, Credential, Gateway, GenerateRequest, PromptPart,
    QuizOptions, Result, RetryConfig, Sanad, SanadError, UpstreamModel,
};

// ============================================================================
// Doubles
// ============================================================================

#[derive(Clone)]
enum Reply {
    Text(&'static str),
    RateLimited,
    Unavailable,
    Unauthorized,
}

/// Upstream double replaying scripted replies; the last reply repeats.
struct ScriptedUpstream {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicU32,
    requests: Mutex<Vec<(usize, GenerateRequest)>>,
}

impl ScriptedUpstream {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        let fallback = replies.last().cloned().unwrap_or(Reply::Text("{}"));
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn answering(text: &'static str) -> Arc<Self> {
        Self::new(vec![Reply::Text(text)])
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn requests(&self) -> Vec<(usize, GenerateRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamModel for ScriptedUpstream {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, credential: &Credential, request: &GenerateRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.requests
            .lock()
            .unwrap()
            .push((credential.index(), request.clone()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            Reply::Text(text) => Ok(text.to_string()),
            Reply::RateLimited => Err(SanadError::RateLimited { retry_after: None }),
            Reply::Unavailable => Err(SanadError::Api {
                status: 503,
                message: "overloaded".into(),
            }),
            Reply::Unauthorized => Err(SanadError::AuthenticationFailed),
        }
    }
}

/// Cache double that records writes and can be told to fail.
#[derive(Default)]
struct RecordingStore {
    stored: Mutex<HashMap<CacheKey, Value>>,
    saves: Mutex<Vec<CacheEntry>>,
    lookups: AtomicU32,
    fail_lookup: bool,
    fail_save: bool,
    saved: Notify,
}

impl RecordingStore {
    fn failing_lookup() -> Arc<Self> {
        Arc::new(Self {
            fail_lookup: true,
            ..Default::default()
        })
    }

    fn failing_save() -> Arc<Self> {
        Arc::new(Self {
            fail_save: true,
            ..Default::default()
        })
    }

    fn preload(&self, key: CacheKey, value: Value) {
        self.stored.lock().unwrap().insert(key, value);
    }

    fn saves(&self) -> Vec<CacheEntry> {
        self.saves.lock().unwrap().clone()
    }

    /// Wait for the next detached write to land.
    async fn wait_for_save(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.saved.notified())
            .await
            .expect("cache write never happened");
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Option<Value>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if self.fail_lookup {
            return Err(SanadError::CacheUnavailable("connection refused".into()));
        }
        Ok(self.stored.lock().unwrap().get(key).cloned())
    }

    async fn save(&self, entry: CacheEntry) -> Result<()> {
        self.saves.lock().unwrap().push(entry.clone());
        let outcome = if self.fail_save {
            Err(SanadError::CacheUnavailable("disk full".into()))
        } else {
            self.stored.lock().unwrap().insert(entry.key, entry.value);
            Ok(())
        };
        self.saved.notify_one();
        outcome
    }
}

fn gateway(upstream: Arc<ScriptedUpstream>, store: Option<Arc<RecordingStore>>) -> Gateway {
    let mut builder = Sanad::builder()
        .api_keys("key-a,key-b,key-c")
        .model("test-model")
        .upstream(upstream)
        .retry(
            RetryConfig::new()
                .max_attempts(3)
                .base_delay(Duration::from_millis(1)),
        );
    if let Some(store) = store {
        builder = builder.cache_store(store);
    }
    builder.build().unwrap()
}

const TRANSLATION: &str = r#"```json
{
  "translation": "a test phrase",
  "wordByWord": [{"word": "test", "meaning": "trial"}],
  "references": [],
}
```"#;

// ============================================================================
// Construction
// ============================================================================

#[test]
fn build_without_credentials_is_configuration_error() {
    let result = Sanad::builder()
        .upstream(ScriptedUpstream::answering("x"))
        .build();
    assert!(matches!(result, Err(SanadError::Configuration(_))));
}

#[test]
fn build_with_blank_credentials_is_configuration_error() {
    let result = Sanad::builder()
        .api_keys(" , ")
        .upstream(ScriptedUpstream::answering("x"))
        .build();
    assert!(matches!(result, Err(SanadError::Configuration(_))));
}

// ============================================================================
// Cache lifecycle
// ============================================================================

#[tokio::test]
async fn translate_writes_then_serves_from_cache() {
    let upstream = ScriptedUpstream::answering(TRANSLATION);
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway(upstream.clone(), Some(store.clone()));

    let first = gateway.translate("test phrase").await.unwrap();
    assert_eq!(first.translation, "a test phrase");
    assert_eq!(first.word_by_word[0].meaning, "trial");
    assert_eq!(upstream.call_count(), 1);

    store.wait_for_save().await;
    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].key, CacheKey::from_canonical("TRANS:test phrase"));
    assert_eq!(saves[0].model, "test-model");
    assert_eq!(saves[0].value["translation"], "a test phrase");

    let second = gateway.translate("test phrase").await.unwrap();
    assert_eq!(second, first);
    assert_eq!(upstream.call_count(), 1, "second call must not reach upstream");
}

#[tokio::test]
async fn translate_sends_fixed_instruction() {
    let upstream = ScriptedUpstream::answering(TRANSLATION);
    let gateway = gateway(upstream.clone(), None);

    gateway.translate("test phrase").await.unwrap();

    let (_, request) = &upstream.requests()[0];
    assert_eq!(request.model, "test-model");
    assert!(
        request
            .system_instruction
            .as_deref()
            .is_some_and(|s| s.contains("wordByWord"))
    );
    assert_eq!(request.parts, vec![PromptPart::Text("test phrase".into())]);
}

#[tokio::test]
async fn lookup_failure_falls_through_to_upstream() {
    let upstream = ScriptedUpstream::answering(r#"{"answer": 42}"#);
    let store = RecordingStore::failing_lookup();
    let gateway = gateway(upstream.clone(), Some(store.clone()));

    let value = gateway.generate_structured("question", None).await.unwrap();

    assert_eq!(value, json!({"answer": 42}));
    assert_eq!(store.lookups.load(Ordering::Relaxed), 1);
    assert_eq!(upstream.call_count(), 1);
}

#[tokio::test]
async fn save_failure_does_not_affect_result() {
    let upstream = ScriptedUpstream::answering(r#"{"answer": 42}"#);
    let store = RecordingStore::failing_save();
    let gateway = gateway(upstream.clone(), Some(store.clone()));

    let value = gateway.generate_structured("question", None).await.unwrap();
    assert_eq!(value, json!({"answer": 42}));

    store.wait_for_save().await;
    assert_eq!(store.saves().len(), 1);
}

#[tokio::test]
async fn malformed_cache_record_is_a_miss() {
    let upstream = ScriptedUpstream::answering(TRANSLATION);
    let store = Arc::new(RecordingStore::default());
    store.preload(
        CacheKey::from_canonical("TRANS:test phrase"),
        json!({"unexpected": true}),
    );
    let gateway = gateway(upstream.clone(), Some(store));

    let result = gateway.translate("test phrase").await.unwrap();

    assert_eq!(result.translation, "a test phrase");
    assert_eq!(upstream.call_count(), 1);
}

#[tokio::test]
async fn open_query_cached_as_text_wrapper() {
    let upstream = ScriptedUpstream::answering("Wudu is ritual washing.");
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway(upstream.clone(), Some(store.clone()));

    let answer = gateway.ask_open_query("fiqh", "what is wudu").await.unwrap();
    assert_eq!(answer, "Wudu is ritual washing.");

    store.wait_for_save().await;
    let saves = store.saves();
    assert_eq!(saves[0].key, CacheKey::from_canonical("QUERY:fiqh:what is wudu"));
    assert_eq!(saves[0].value, json!({"text": "Wudu is ritual washing."}));

    let again = gateway.ask_open_query("fiqh", "what is wudu").await.unwrap();
    assert_eq!(again, answer);
    assert_eq!(upstream.call_count(), 1);
}

#[tokio::test]
async fn open_query_raw_text_is_not_sanitized() {
    let upstream = ScriptedUpstream::answering("```\nnot json at all\n```");
    let gateway = gateway(upstream, None);

    let answer = gateway.ask_open_query("tafsir", "q").await.unwrap();
    assert_eq!(answer, "```\nnot json at all\n```");
}

#[tokio::test]
async fn open_query_instruction_depends_on_topic() {
    let upstream = ScriptedUpstream::answering("answer");
    let gateway = gateway(upstream.clone(), None);

    gateway.ask_open_query("hadith", "q").await.unwrap();

    let (_, request) = &upstream.requests()[0];
    assert!(
        request
            .system_instruction
            .as_deref()
            .is_some_and(|s| s.contains("hadith"))
    );
}

#[tokio::test]
async fn same_text_different_operation_does_not_share_cache() {
    let upstream = ScriptedUpstream::new(vec![
        Reply::Text(TRANSLATION),
        Reply::Text(r#"{"kind": "structured"}"#),
    ]);
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway(upstream.clone(), Some(store.clone()));

    gateway.translate("shared text").await.unwrap();
    store.wait_for_save().await;
    let structured = gateway.generate_structured("shared text", None).await.unwrap();

    assert_eq!(structured, json!({"kind": "structured"}));
    assert_eq!(upstream.call_count(), 2);
}

// ============================================================================
// Uncached and unique operations
// ============================================================================

#[tokio::test]
async fn image_extraction_bypasses_cache() {
    let upstream = ScriptedUpstream::answering("الحمد لله");
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway(upstream.clone(), Some(store.clone()));

    let image = vec![0x89, b'P', b'N', b'G'];
    let first = gateway
        .extract_text_from_image(image.clone(), "image/png")
        .await
        .unwrap();
    let second = gateway
        .extract_text_from_image(image.clone(), "image/png")
        .await
        .unwrap();

    assert_eq!(first, "الحمد لله");
    assert_eq!(second, first);
    assert_eq!(upstream.call_count(), 2);
    assert_eq!(store.lookups.load(Ordering::Relaxed), 0);
    tokio::task::yield_now().await;
    assert!(store.saves().is_empty());

    let (_, request) = &upstream.requests()[0];
    assert!(request.parts.contains(&PromptPart::InlineData {
        mime_type: "image/png".into(),
        data: image,
    }));
}

#[tokio::test]
async fn image_extraction_still_retries() {
    let upstream = ScriptedUpstream::new(vec![Reply::Unavailable, Reply::Text("text")]);
    let gateway = gateway(upstream.clone(), None);

    let text = gateway
        .extract_text_from_image(vec![1, 2, 3], "image/jpeg")
        .await
        .unwrap();

    assert_eq!(text, "text");
    assert_eq!(upstream.call_count(), 2);
}

#[tokio::test]
async fn empty_image_is_rejected_without_upstream_call() {
    let upstream = ScriptedUpstream::answering("text");
    let gateway = gateway(upstream.clone(), None);

    let result = gateway.extract_text_from_image(Vec::new(), "image/png").await;

    assert!(matches!(result, Err(SanadError::InvalidInput(_))));
    assert_eq!(upstream.call_count(), 0);
}

const QUIZ: &str = r#"Here you go:
[
  {"question": "How many pillars of Islam?", "options": ["3", "4", "5", "6"], "correctIndex": 2, "explanation": "Shahada, salah, zakat, sawm, hajj."},
]"#;

#[tokio::test]
async fn quiz_calls_bypass_the_cache() {
    let upstream = ScriptedUpstream::answering(QUIZ);
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway(upstream.clone(), Some(store.clone()));
    let options = QuizOptions::new().count(1);

    let first = gateway.generate_quiz("pillars", &options).await.unwrap();
    let second = gateway.generate_quiz("pillars", &options).await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].correct_answer(), Some("5"));
    assert_eq!(second, first);
    assert_eq!(upstream.call_count(), 2);
    assert_eq!(store.lookups.load(Ordering::Relaxed), 0);
    tokio::task::yield_now().await;
    assert!(store.saves().is_empty(), "unique results must not fill the store");

    let requests = upstream.requests();
    assert_ne!(requests[0].1.parts, requests[1].1.parts);
}

#[tokio::test]
async fn grading_and_essays_write_nothing_to_cache() {
    let upstream = ScriptedUpstream::new(vec![
        Reply::Text(r#"{"score": 70, "feedback": "ok"}"#),
        Reply::Text(r#"[{"question": "Why fast?"}]"#),
    ]);
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway(upstream.clone(), Some(store.clone()));

    gateway.grade_essay("q", "a").await.unwrap();
    gateway.generate_essay_questions("sawm", 1).await.unwrap();

    tokio::task::yield_now().await;
    assert!(store.saves().is_empty());
    assert_eq!(store.lookups.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn grading_parses_typed_result() {
    let upstream = ScriptedUpstream::answering(
        r#"{"score": 85, "feedback": "Good", "strengths": ["clear"], "improvements": []}"#,
    );
    let gateway = gateway(upstream, None);

    let grade = gateway
        .grade_essay("Explain zakat.", "Zakat is obligatory alms.")
        .await
        .unwrap();

    assert_eq!(grade.score, 85);
    assert_eq!(grade.strengths, vec!["clear"]);
}

#[tokio::test]
async fn essay_questions_parse_typed_result() {
    let upstream =
        ScriptedUpstream::answering(r#"[{"question": "Why fast?", "keyPoints": ["taqwa"]}]"#);
    let gateway = gateway(upstream, None);

    let questions = gateway.generate_essay_questions("sawm", 1).await.unwrap();

    assert_eq!(questions[0].key_points, vec!["taqwa"]);
}

#[tokio::test]
async fn zero_question_quiz_is_invalid() {
    let upstream = ScriptedUpstream::answering(QUIZ);
    let gateway = gateway(upstream.clone(), None);

    let result = gateway
        .generate_quiz("pillars", &QuizOptions::new().count(0))
        .await;

    assert!(matches!(result, Err(SanadError::InvalidInput(_))));
    assert_eq!(upstream.call_count(), 0);
}

// ============================================================================
// Failure paths
// ============================================================================

#[tokio::test]
async fn parse_error_surfaces_immediately_with_span() {
    let upstream = ScriptedUpstream::answering(r#"{"a":1,,}"#);
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway(upstream.clone(), Some(store.clone()));

    let err = gateway.generate_structured("p", None).await.unwrap_err();

    match err {
        SanadError::Parse { span, .. } => assert_eq!(span, r#"{"a":1,,}"#),
        other => panic!("expected parse error, got {other:?}"),
    }
    assert_eq!(upstream.call_count(), 1);
    tokio::task::yield_now().await;
    assert!(store.saves().is_empty());
}

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct Scored {
    score: u32,
}

#[tokio::test]
async fn typed_mismatch_is_not_cached() {
    let upstream = ScriptedUpstream::new(vec![
        Reply::Text(r#"{"grade": "A"}"#),
        Reply::Text(r#"{"score": 7}"#),
    ]);
    let store = Arc::new(RecordingStore::default());
    let gateway = gateway(upstream.clone(), Some(store.clone()));

    let first = gateway.generate_structured_as::<Scored>("rate me", None).await;
    assert!(matches!(first, Err(SanadError::Parse { .. })));
    tokio::task::yield_now().await;
    assert!(store.saves().is_empty());

    let second = gateway
        .generate_structured_as::<Scored>("rate me", None)
        .await
        .unwrap();
    assert_eq!(second, Scored { score: 7 });
    assert_eq!(upstream.call_count(), 2);

    store.wait_for_save().await;
    assert_eq!(store.saves()[0].value, json!({"score": 7}));
}

#[tokio::test]
async fn stored_record_of_other_shape_is_a_typed_miss() {
    let upstream = ScriptedUpstream::answering(r#"{"score": 9}"#);
    let store = Arc::new(RecordingStore::default());
    store.preload(CacheKey::from_canonical("JSON:rate me"), json!({"grade": "A"}));
    let gateway = gateway(upstream.clone(), Some(store));

    let scored = gateway
        .generate_structured_as::<Scored>("rate me", None)
        .await
        .unwrap();

    assert_eq!(scored, Scored { score: 9 });
    assert_eq!(upstream.call_count(), 1);
}

#[tokio::test]
async fn blank_prompt_is_rejected_without_upstream_call() {
    let upstream = ScriptedUpstream::answering("{}");
    let gateway = gateway(upstream.clone(), None);

    let structured = gateway.generate_structured("  ", None).await;
    let query = gateway.ask_open_query("fiqh", "").await;
    let translated = gateway.translate("\n").await;

    assert!(matches!(structured, Err(SanadError::InvalidInput(_))));
    assert!(matches!(query, Err(SanadError::InvalidInput(_))));
    assert!(matches!(translated, Err(SanadError::InvalidInput(_))));
    assert_eq!(upstream.call_count(), 0);
}

#[tokio::test]
async fn shape_mismatch_is_parse_error() {
    let upstream = ScriptedUpstream::answering(r#"{"not": "a translation"}"#);
    let gateway = gateway(upstream, None);

    let err = gateway.translate("text").await.unwrap_err();
    assert!(matches!(err, SanadError::Parse { .. }));
}

#[tokio::test]
async fn rate_limits_rotate_credentials() {
    let upstream = ScriptedUpstream::new(vec![
        Reply::RateLimited,
        Reply::RateLimited,
        Reply::Text(r#"{"ok": true}"#),
    ]);
    let gateway = gateway(upstream.clone(), None);

    let value = gateway.generate_structured("p", None).await.unwrap();

    assert_eq!(value, json!({"ok": true}));
    let used: Vec<usize> = upstream.requests().iter().map(|(i, _)| *i).collect();
    assert_eq!(used, vec![0, 1, 2]);
    assert_eq!(gateway.credentials().rotation_count(), 2);
}

#[tokio::test]
async fn exhausted_retries_surface_transient_error() {
    let upstream = ScriptedUpstream::new(vec![Reply::RateLimited]);
    let gateway = gateway(upstream.clone(), None);

    let err = gateway.generate_structured("p", None).await.unwrap_err();

    assert!(matches!(err, SanadError::RateLimited { .. }));
    assert!(err.is_transient());
    assert_eq!(upstream.call_count(), 3);
}

#[tokio::test]
async fn fatal_upstream_error_is_not_retried() {
    let upstream = ScriptedUpstream::new(vec![Reply::Unauthorized]);
    let gateway = gateway(upstream.clone(), None);

    let err = gateway.ask_open_query("fiqh", "q").await.unwrap_err();

    assert!(matches!(err, SanadError::AuthenticationFailed));
    assert_eq!(upstream.call_count(), 1);
}

#[tokio::test]
async fn shutdown_cancels_operations() {
    let upstream = ScriptedUpstream::answering("answer");
    let gateway = gateway(upstream.clone(), None);

    gateway.shutdown();
    let err = gateway.ask_open_query("fiqh", "q").await.unwrap_err();

    assert!(matches!(err, SanadError::Cancelled));
    assert_eq!(upstream.call_count(), 0);
}
