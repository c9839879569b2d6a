//! Application state
//!
//! Shared across all handlers. The adapter clients are the only
//! process-wide shared state and are all safe for concurrent use; no
//! cross-connection mutable state lives here beyond the registry.

use std::sync::Arc;

use voice_gateway_config::Settings;
use voice_gateway_core::{ChatStore, QueryResolver, SpeechToText, TextToSpeech, TokenVerifier};

use crate::registry::ConnectionRegistry;
use crate::turn::TurnPipeline;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub resolver: Arc<dyn QueryResolver>,
    pub store: Arc<dyn ChatStore>,
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        verifier: Arc<dyn TokenVerifier>,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        resolver: Arc<dyn QueryResolver>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            verifier,
            stt,
            tts,
            resolver,
            store,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Build the turn pipeline for one connection
    pub fn turn_pipeline(&self) -> TurnPipeline {
        TurnPipeline::new(
            self.stt.clone(),
            self.tts.clone(),
            self.resolver.clone(),
            self.store.clone(),
            self.settings.adapters.audio.clone(),
            self.settings.adapters.voice.clone(),
            self.settings.deadlines.clone(),
        )
    }
}
