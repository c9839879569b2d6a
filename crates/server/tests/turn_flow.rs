//! Turn pipeline integration tests
//!
//! Exercises the turn pipeline end to end against in-memory fakes for the
//! external adapters, checking reply framing, ordering, and the persisted
//! transcript for the documented scenarios.

use async_trait::async_trait;
use axum::extract::ws::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use voice_gateway_config::DeadlineConfig;
use voice_gateway_core::{
    AdapterError, AudioConfig, ChatMessage, ChatSession, ChatStore, MessageRole, QueryIntent,
    QueryMetadata, QueryResolver, ResolvedAnswer, SourceType, SpeechToText, TextToSpeech,
    Transcript, VoiceConfig,
};
use voice_gateway_persistence::InMemoryChatStore;
use voice_gateway_server::{ConnectionSender, TurnInput, TurnPipeline};

const GREETING_TEXT: &str = "How can I help you today?";

/// One second of silence in a mono 16 kHz PCM16 WAV container
fn wav_utterance() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    for _ in 0..16_000 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeStt {
    transcript: Option<Transcript>,
    fail: bool,
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _config: &AudioConfig,
    ) -> Result<Transcript, AdapterError> {
        if self.fail {
            return Err(AdapterError::Request("stt unreachable".to_string()));
        }
        Ok(self.transcript.clone().unwrap_or_default())
    }
}

struct FakeTts {
    fail: bool,
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<Vec<u8>, AdapterError> {
        if self.fail {
            return Err(AdapterError::Service {
                status: 500,
                message: "synth backend down".to_string(),
            });
        }
        Ok(format!("mp3:{}", text).into_bytes())
    }
}

struct FakeResolver {
    fail: bool,
    delay: Option<Duration>,
}

#[async_trait]
impl QueryResolver for FakeResolver {
    async fn resolve(&self, _user_id: &str, query: &str) -> Result<ResolvedAnswer, AdapterError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AdapterError::Request("resolver unreachable".to_string()));
        }
        if query.contains("time") {
            Ok(ResolvedAnswer {
                text: "It is five o'clock.".to_string(),
                metadata: QueryMetadata {
                    intent: QueryIntent::TimeQuery,
                    confidence: 0.93,
                },
            })
        } else {
            Ok(ResolvedAnswer {
                text: format!("You said: {}", query),
                metadata: QueryMetadata {
                    intent: QueryIntent::Unknown,
                    confidence: 0.5,
                },
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<InMemoryChatStore>,
    pipeline: TurnPipeline,
}

fn harness(stt: FakeStt, tts: FakeTts, resolver: FakeResolver) -> Harness {
    harness_with_deadlines(stt, tts, resolver, DeadlineConfig::default())
}

fn harness_with_deadlines(
    stt: FakeStt,
    tts: FakeTts,
    resolver: FakeResolver,
    deadlines: DeadlineConfig,
) -> Harness {
    let store = Arc::new(InMemoryChatStore::new());
    let pipeline = TurnPipeline::new(
        Arc::new(stt),
        Arc::new(tts),
        Arc::new(resolver),
        store.clone(),
        AudioConfig::default(),
        VoiceConfig::default(),
        deadlines,
    );
    Harness { store, pipeline }
}

fn reply_sink() -> (ConnectionSender, mpsc::Receiver<Message>) {
    let (frames_tx, frames_rx) = mpsc::channel(64);
    let (close_tx, _close_rx) = mpsc::channel(1);
    (
        ConnectionSender::new("test-conn", frames_tx, close_tx),
        frames_rx,
    )
}

fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(json) = message {
            frames.push(serde_json::from_str(&json).unwrap());
        }
    }
    frames
}

/// Bootstrap a session with the seeded greeting, as the HTTP endpoint does
async fn bootstrap_session(store: &InMemoryChatStore, user_id: &str) -> ChatSession {
    let session = ChatSession::new(user_id, "T");
    store.create_session(&session).await.unwrap();
    let greeting = ChatMessage::new(MessageRole::Assistant, GREETING_TEXT, SourceType::Text);
    store.append_message(&session.chat_id, &greeting).await.unwrap();
    session
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_text_happy_path() {
    let h = harness(
        FakeStt { transcript: None, fail: false },
        FakeTts { fail: false },
        FakeResolver { fail: false, delay: None },
    );
    let session = bootstrap_session(&h.store, "user-a").await;
    let (out, mut rx) = reply_sink();

    h.pipeline
        .run("user-a", &session.chat_id, TurnInput::Text("hello".to_string()), &out)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["type"], "speech_response");
    assert_eq!(frames[0]["success"], true);
    assert_eq!(frames[0]["transcription"], "hello");
    assert_eq!(frames[0]["textResponse"], "You said: hello");
    assert_eq!(frames[1]["type"], "audio_content");
    assert!(!frames[1]["audioContent"].as_str().unwrap().is_empty());

    let messages = h.store.list_messages(&session.chat_id, "user-a").await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].text, GREETING_TEXT);
    assert_eq!(messages[1].role, MessageRole::User);
    assert_eq!(messages[1].text, "hello");
    assert_eq!(messages[1].source_type, SourceType::Text);
    assert_eq!(messages[2].role, MessageRole::Assistant);
    assert_eq!(messages[2].text, "You said: hello");
}

#[tokio::test]
async fn test_voice_happy_path() {
    let h = harness(
        FakeStt {
            transcript: Some(Transcript {
                text: "what time is it".to_string(),
                confidence: 0.9,
            }),
            fail: false,
        },
        FakeTts { fail: false },
        FakeResolver { fail: false, delay: None },
    );
    let session = bootstrap_session(&h.store, "user-a").await;
    let (out, mut rx) = reply_sink();

    h.pipeline
        .run("user-a", &session.chat_id, TurnInput::Voice(wav_utterance()), &out)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["transcription"], "what time is it");
    assert_eq!(frames[0]["textResponse"], "It is five o'clock.");
    assert_eq!(frames[0]["metadata"]["intent"], "TIME_QUERY");
    assert_eq!(frames[1]["type"], "audio_content");

    let messages = h.store.list_messages(&session.chat_id, "user-a").await.unwrap();
    assert_eq!(messages[1].source_type, SourceType::Voice);
    assert_eq!(messages[1].role, MessageRole::User);
}

#[tokio::test]
async fn test_empty_audio_is_no_speech() {
    let h = harness(
        FakeStt {
            transcript: Some(Transcript::default()),
            fail: false,
        },
        FakeTts { fail: false },
        FakeResolver { fail: false, delay: None },
    );
    let session = bootstrap_session(&h.store, "user-a").await;
    let (out, mut rx) = reply_sink();

    h.pipeline
        .run("user-a", &session.chat_id, TurnInput::Voice(wav_utterance()), &out)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "speech_response");
    assert_eq!(frames[0]["success"], false);
    assert_eq!(frames[0]["reason"], "no_speech");

    // Transcript unchanged: just the greeting
    let messages = h.store.list_messages(&session.chat_id, "user-a").await.unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_stt_failure_reported_and_nothing_persisted() {
    let h = harness(
        FakeStt { transcript: None, fail: true },
        FakeTts { fail: false },
        FakeResolver { fail: false, delay: None },
    );
    let session = bootstrap_session(&h.store, "user-a").await;
    let (out, mut rx) = reply_sink();

    h.pipeline
        .run("user-a", &session.chat_id, TurnInput::Voice(wav_utterance()), &out)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["success"], false);
    assert_eq!(frames[0]["reason"], "stt_failed");

    let messages = h.store.list_messages(&session.chat_id, "user-a").await.unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_tts_failure_still_replies_with_text() {
    let h = harness(
        FakeStt { transcript: None, fail: false },
        FakeTts { fail: true },
        FakeResolver { fail: false, delay: None },
    );
    let session = bootstrap_session(&h.store, "user-a").await;
    let (out, mut rx) = reply_sink();

    h.pipeline
        .run("user-a", &session.chat_id, TurnInput::Text("hello".to_string()), &out)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1, "no audio_content frame after TTS failure");
    assert_eq!(frames[0]["type"], "speech_response");
    assert_eq!(frames[0]["success"], true);
    assert_eq!(frames[0]["textResponse"], "You said: hello");

    // Both sides of the turn persisted regardless
    let messages = h.store.list_messages(&session.chat_id, "user-a").await.unwrap();
    assert_eq!(messages.len(), 3);
}

#[tokio::test]
async fn test_resolver_failure_apologises_and_persists() {
    let h = harness(
        FakeStt { transcript: None, fail: false },
        FakeTts { fail: false },
        FakeResolver { fail: true, delay: None },
    );
    let session = bootstrap_session(&h.store, "user-a").await;
    let (out, mut rx) = reply_sink();

    h.pipeline
        .run("user-a", &session.chat_id, TurnInput::Text("hello".to_string()), &out)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1, "TTS is skipped on resolver failure");
    assert_eq!(frames[0]["success"], true);
    assert_eq!(
        frames[0]["textResponse"],
        "I'm sorry, I couldn't understand your query"
    );

    let messages = h.store.list_messages(&session.chat_id, "user-a").await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].role, MessageRole::Assistant);
    assert_eq!(
        messages[2].text,
        "I'm sorry, I couldn't understand your query"
    );
}

#[tokio::test]
async fn test_wrong_ownership_is_forbidden() {
    let h = harness(
        FakeStt { transcript: None, fail: false },
        FakeTts { fail: false },
        FakeResolver { fail: false, delay: None },
    );
    let session = bootstrap_session(&h.store, "user-a").await;
    let (out, mut rx) = reply_sink();

    h.pipeline
        .run("user-b", &session.chat_id, TurnInput::Text("hello".to_string()), &out)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert_eq!(frames[0]["error"], "forbidden");

    // Nothing persisted under the foreign session
    let messages = h.store.list_messages(&session.chat_id, "user-a").await.unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let h = harness(
        FakeStt { transcript: None, fail: false },
        FakeTts { fail: false },
        FakeResolver { fail: false, delay: None },
    );
    let (out, mut rx) = reply_sink();

    h.pipeline
        .run("user-a", "no-such-chat", TurnInput::Text("hello".to_string()), &out)
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert_eq!(frames[0]["error"], "not_found");
}

#[tokio::test]
async fn test_resolver_deadline_enforced() {
    let deadlines = DeadlineConfig {
        query_ms: 150,
        ..Default::default()
    };
    let h = harness_with_deadlines(
        FakeStt { transcript: None, fail: false },
        FakeTts { fail: false },
        FakeResolver {
            fail: false,
            delay: Some(Duration::from_secs(5)),
        },
        deadlines,
    );
    let session = bootstrap_session(&h.store, "user-a").await;
    let (out, mut rx) = reply_sink();

    let started = std::time::Instant::now();
    h.pipeline
        .run("user-a", &session.chat_id, TurnInput::Text("hello".to_string()), &out)
        .await;
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "turn must not wait out the slow resolver"
    );

    // Deadline overrun is the resolver's failure: canned apology
    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["success"], true);
    assert_eq!(
        frames[0]["textResponse"],
        "I'm sorry, I couldn't understand your query"
    );
}

#[tokio::test]
async fn test_reply_ordering_across_turns() {
    let h = harness(
        FakeStt { transcript: None, fail: false },
        FakeTts { fail: false },
        FakeResolver { fail: false, delay: None },
    );
    let session = bootstrap_session(&h.store, "user-a").await;
    let (out, mut rx) = reply_sink();

    h.pipeline
        .run("user-a", &session.chat_id, TurnInput::Text("first".to_string()), &out)
        .await;
    h.pipeline
        .run("user-a", &session.chat_id, TurnInput::Text("second".to_string()), &out)
        .await;

    // speech_response(N) precedes audio_content(N) precedes
    // speech_response(N+1)
    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0]["type"], "speech_response");
    assert_eq!(frames[0]["transcription"], "first");
    assert_eq!(frames[1]["type"], "audio_content");
    assert_eq!(frames[2]["type"], "speech_response");
    assert_eq!(frames[2]["transcription"], "second");
    assert_eq!(frames[3]["type"], "audio_content");

    // Transcript monotonicity: timestamps never decrease and every
    // assistant message follows its user message
    let messages = h.store.list_messages(&session.chat_id, "user-a").await.unwrap();
    assert_eq!(messages.len(), 5);
    for pair in messages.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
    assert_eq!(messages[1].role, MessageRole::User);
    assert_eq!(messages[2].role, MessageRole::Assistant);
    assert_eq!(messages[3].role, MessageRole::User);
    assert_eq!(messages[4].role, MessageRole::Assistant);
}
