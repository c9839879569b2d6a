//! Turn pipeline
//!
//! Drives one voice or text turn through its ordered phases:
//! recognise -> persist user message -> resolve -> synthesise -> persist
//! assistant message -> emit replies. Each phase has a bounded deadline and
//! its own failure policy; a phase failure produces a deterministic client
//! reply and ends the turn without tearing down the connection.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use voice_gateway_config::DeadlineConfig;
use voice_gateway_core::{
    AudioConfig, ChatMessage, ChatStore, MessageRole, QueryResolver, ResolvedAnswer, SourceType,
    SpeechToText, StoreError, TextToSpeech, VoiceConfig,
};

use crate::frames::{ServerFrame, TurnFailure};
use crate::metrics;
use crate::registry::ConnectionSender;

/// Reply text appended when the resolver fails
const APOLOGY_TEXT: &str = "I'm sorry, I couldn't understand your query";

/// Input for one turn
#[derive(Debug)]
pub enum TurnInput {
    /// One complete WAV-containerized utterance
    Voice(Vec<u8>),
    /// Typed text
    Text(String),
}

/// Orchestrates one turn against the external adapters
pub struct TurnPipeline {
    stt: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
    resolver: Arc<dyn QueryResolver>,
    store: Arc<dyn ChatStore>,
    audio: AudioConfig,
    voice: VoiceConfig,
    deadlines: DeadlineConfig,
}

impl TurnPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        resolver: Arc<dyn QueryResolver>,
        store: Arc<dyn ChatStore>,
        audio: AudioConfig,
        voice: VoiceConfig,
        deadlines: DeadlineConfig,
    ) -> Self {
        Self {
            stt,
            tts,
            resolver,
            store,
            audio,
            voice,
            deadlines,
        }
    }

    /// Run one turn to completion
    ///
    /// All failures are handled internally: the client always receives a
    /// deterministic reply and the method returns once every reply frame
    /// for this turn has been enqueued.
    pub async fn run(&self, user_id: &str, chat_id: &str, input: TurnInput, out: &ConnectionSender) {
        let span = tracing::info_span!("turn", user_id, chat_id);
        self.run_inner(user_id, chat_id, input, out)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        user_id: &str,
        chat_id: &str,
        input: TurnInput,
        out: &ConnectionSender,
    ) {
        let started = Instant::now();

        // Phase 1: recognise (audio turns only)
        let (utterance, source_type) = match input {
            TurnInput::Text(text) => (text, SourceType::Text),
            TurnInput::Voice(bytes) => {
                let stt_started = Instant::now();
                let result = tokio::time::timeout(
                    Duration::from_millis(self.deadlines.stt_ms),
                    self.stt.transcribe(&bytes, &self.audio),
                )
                .await;
                metrics::record_stt_latency(stt_started.elapsed());

                let transcript = match result {
                    Ok(Ok(transcript)) => transcript,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "STT failed");
                        self.finish(out, started, "stt_failed", ServerFrame::speech_failed(TurnFailure::SttFailed));
                        return;
                    },
                    Err(_) => {
                        tracing::warn!(deadline_ms = self.deadlines.stt_ms, "STT deadline exceeded");
                        self.finish(out, started, "stt_failed", ServerFrame::speech_failed(TurnFailure::SttFailed));
                        return;
                    },
                };

                if transcript.is_empty() {
                    tracing::debug!("No speech detected");
                    self.finish(out, started, "no_speech", ServerFrame::speech_failed(TurnFailure::NoSpeech));
                    return;
                }
                (transcript.text, SourceType::Voice)
            },
        };

        // Phase 2: persist the user message before resolving, so an
        // assistant reply can never exist without a durable user utterance.
        match self.check_ownership(user_id, chat_id).await {
            OwnershipOutcome::Owned => {},
            OwnershipOutcome::Denied => {
                self.finish(out, started, "forbidden", ServerFrame::error("forbidden"));
                return;
            },
            OwnershipOutcome::NotFound => {
                self.finish(out, started, "not_found", ServerFrame::error("not_found"));
                return;
            },
            OwnershipOutcome::Backend => {
                self.finish(out, started, "persist_failed", ServerFrame::speech_failed(TurnFailure::PersistFailed));
                return;
            },
        }

        let user_message = ChatMessage::new(MessageRole::User, &utterance, source_type);
        if let Err(e) = self.append_with_deadline(chat_id, &user_message).await {
            tracing::warn!(error = %e, "Failed to persist user message");
            self.finish(out, started, "persist_failed", ServerFrame::speech_failed(TurnFailure::PersistFailed));
            return;
        }

        // Phase 3: resolve
        let query_started = Instant::now();
        let resolved = tokio::time::timeout(
            Duration::from_millis(self.deadlines.query_ms),
            self.resolver.resolve(user_id, &utterance),
        )
        .await;
        metrics::record_query_latency(query_started.elapsed());

        let answer: ResolvedAnswer = match resolved {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Resolver failed, sending canned reply");
                self.apologise(chat_id, &utterance, out, started).await;
                return;
            },
            Err(_) => {
                tracing::warn!(deadline_ms = self.deadlines.query_ms, "Resolver deadline exceeded");
                self.apologise(chat_id, &utterance, out, started).await;
                return;
            },
        };

        // Phase 4: synthesise; failure only drops the audio frame
        let tts_started = Instant::now();
        let audio = match tokio::time::timeout(
            Duration::from_millis(self.deadlines.tts_ms),
            self.tts.synthesize(&answer.text, &self.voice),
        )
        .await
        {
            Ok(Ok(bytes)) => Some(bytes),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "TTS failed, replying without audio");
                None
            },
            Err(_) => {
                tracing::warn!(deadline_ms = self.deadlines.tts_ms, "TTS deadline exceeded");
                None
            },
        };
        metrics::record_tts_latency(tts_started.elapsed());

        // Phase 5: persist the assistant message. The user already has
        // their answer, so a failure here is logged, not surfaced;
        // operators must alert on the inconsistent transcript.
        let assistant_message =
            ChatMessage::new(MessageRole::Assistant, &answer.text, SourceType::Text);
        if let Err(e) = self.append_with_deadline(chat_id, &assistant_message).await {
            tracing::error!(error = %e, chat_id, "Failed to persist assistant message");
        }

        // Phase 6: emit replies, speech_response strictly before audio_content
        let _ = out.send(&ServerFrame::speech_ok(
            &utterance,
            &answer.text,
            Some(answer.metadata),
        ));
        if let Some(bytes) = audio {
            let _ = out.send(&ServerFrame::AudioContent {
                audio_content: BASE64.encode(&bytes),
            });
        }

        metrics::record_turn("ok", started.elapsed());
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Turn complete");
    }

    /// Resolver-failure path: durable apology, then a successful
    /// speech_response with the canned text and no audio.
    async fn apologise(
        &self,
        chat_id: &str,
        utterance: &str,
        out: &ConnectionSender,
        started: Instant,
    ) {
        let apology = ChatMessage::new(MessageRole::Assistant, APOLOGY_TEXT, SourceType::Text);
        if let Err(e) = self.append_with_deadline(chat_id, &apology).await {
            tracing::error!(error = %e, chat_id, "Failed to persist apology message");
        }

        let _ = out.send(&ServerFrame::speech_ok(utterance, APOLOGY_TEXT, None));
        metrics::record_turn("resolver_failed", started.elapsed());
    }

    fn finish(&self, out: &ConnectionSender, started: Instant, outcome: &'static str, frame: ServerFrame) {
        let _ = out.send(&frame);
        metrics::record_turn(outcome, started.elapsed());
    }

    async fn check_ownership(&self, user_id: &str, chat_id: &str) -> OwnershipOutcome {
        let result = tokio::time::timeout(
            Duration::from_millis(self.deadlines.store_ms),
            self.store.load_session(chat_id, user_id),
        )
        .await;

        match result {
            Ok(Ok(_)) => OwnershipOutcome::Owned,
            Ok(Err(StoreError::Denied)) => {
                tracing::warn!(chat_id, user_id, "Rejected turn for non-owned session");
                OwnershipOutcome::Denied
            },
            Ok(Err(StoreError::NotFound)) => {
                tracing::warn!(chat_id, "Turn against unknown session");
                OwnershipOutcome::NotFound
            },
            Ok(Err(StoreError::Backend(e))) => {
                tracing::warn!(error = %e, "Ownership check failed");
                OwnershipOutcome::Backend
            },
            Err(_) => {
                tracing::warn!(deadline_ms = self.deadlines.store_ms, "Ownership check deadline exceeded");
                OwnershipOutcome::Backend
            },
        }
    }

    async fn append_with_deadline(
        &self,
        chat_id: &str,
        message: &ChatMessage,
    ) -> Result<(), StoreError> {
        let store_started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_millis(self.deadlines.store_ms),
            self.store.append_message(chat_id, message),
        )
        .await;
        metrics::record_store_latency(store_started.elapsed());

        match result {
            Ok(result) => result,
            Err(_) => Err(StoreError::Backend(format!(
                "append deadline exceeded ({}ms)",
                self.deadlines.store_ms
            ))),
        }
    }
}

enum OwnershipOutcome {
    Owned,
    Denied,
    NotFound,
    Backend,
}
