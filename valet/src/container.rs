//! Service container: explicit, leaves-first construction of every component
//! from one immutable [`Settings`] snapshot.
//!
//! No module-level mutable globals; higher layers receive lower layers as
//! constructor parameters and everything shared is behind `Arc`.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::embedding::{CachedEmbedder, Embedder, EmbeddingCache, MockEmbedder, OpenAIEmbedder};
use crate::error::{StoreError, ToolError};
use crate::exec::ToolExecutor;
use crate::intent::IntentClassifier;
use crate::llm::{ChatClient, LlmClient, MockLlm};
use crate::mcp::{McpManager, McpManagerConfig};
use crate::metrics::Metrics;
use crate::pipeline::Orchestrator;
use crate::policy::PolicyEngine;
use crate::retrieval::Retriever;
use crate::settings::Settings;
use crate::store::{
    AuditLog, ChunkStore, EventStore, InMemoryChunkStore, MessageStore, SqliteAuditLog,
    SqliteVecChunkStore,
};
use crate::tools::gateway::{
    HttpMailGateway, HttpMessengerGateway, HttpSchedulerGateway, MailGateway, MessengerGateway,
    MockMailGateway, MockMessengerGateway, MockSchedulerGateway, SchedulerGateway,
};
use crate::tools::{
    ConfirmAgendaEventTool, CreateCalendarEventTool, CreateCalendlyEventTool, ExtractUrlsTool,
    IngestCalendlyEventsTool, ListAgendaEventsTool, ListCalendlyEventsTool, ReadEmailTool,
    ScrapeNewsForEventsTool, ScrapeWebContentTool, SearchEmailsTool, SendEmailTool,
    SendWhatsappTool, ToolRegistry,
};
use crate::voice::{HttpSttClient, HttpTtsClient, MockStt, MockTts, SttClient, TtsClient, VoiceSession, VoiceSessionConfig};
use crate::conversation::ConversationProcessor;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("tools: {0}")]
    Tools(#[from] ToolError),
}

/// All wired services for one process.
pub struct ServiceContainer {
    pub settings: Settings,
    pub metrics: Arc<Metrics>,
    pub audit: Arc<SqliteAuditLog>,
    pub embedding_cache: Arc<EmbeddingCache>,
    pub retriever: Arc<Retriever>,
    pub chunk_store: Arc<dyn ChunkStore>,
    pub events: Arc<EventStore>,
    pub messages: Arc<MessageStore>,
    pub registry: Arc<ToolRegistry>,
    pub mcp: Arc<McpManager>,
    pub executor: Arc<ToolExecutor>,
    pub llm: Arc<dyn LlmClient>,
    pub orchestrator: Arc<Orchestrator>,
    pub conversations: Arc<ConversationProcessor>,
}

impl ServiceContainer {
    pub fn build(settings: Settings) -> Result<Self, ContainerError> {
        let metrics = Arc::new(Metrics::new());
        let audit = Arc::new(SqliteAuditLog::new(&settings.database_path)?);

        // Embedding: real OpenAI embedder unless mock mode; always behind the
        // bounded cache so duplicate queries coalesce.
        let raw_embedder: Arc<dyn Embedder> = if settings.mock_mode {
            Arc::new(MockEmbedder::new(256))
        } else {
            let mut config = async_openai::config::OpenAIConfig::new();
            if let Some(ref key) = settings.openai_api_key {
                config = config.with_api_key(key.clone());
            }
            if let Some(ref base) = settings.openai_base_url {
                config = config.with_api_base(base.clone());
            }
            Arc::new(OpenAIEmbedder::with_config(config, &settings.embedding_model))
        };
        let embedding_cache = Arc::new(EmbeddingCache::new(
            settings.cache_max_size,
            settings.cache_ttl,
        ));
        let embedder: Arc<dyn Embedder> = Arc::new(CachedEmbedder::new(
            raw_embedder,
            Arc::clone(&embedding_cache),
            settings.cache_enabled,
        ));

        let chunk_store: Arc<dyn ChunkStore> = if settings.mock_mode {
            Arc::new(InMemoryChunkStore::new(embedder.dimension()))
        } else {
            Arc::new(SqliteVecChunkStore::new(
                &settings.database_path,
                embedder.dimension(),
            )?)
        };
        let retriever = Arc::new(Retriever::new(Arc::clone(&embedder), Arc::clone(&chunk_store)));

        let events = Arc::new(EventStore::new(&settings.database_path)?);
        let messages = Arc::new(MessageStore::new(&settings.database_path)?);

        // Gateways: HTTP adapters when an endpoint is configured, mocks
        // otherwise (and always in mock mode).
        let mail: Arc<dyn MailGateway> = match (&settings.mail_api_url, settings.mock_mode) {
            (Some(url), false) => Arc::new(HttpMailGateway::new(url.clone(), None)),
            _ => Arc::new(MockMailGateway::new()),
        };
        let messenger: Arc<dyn MessengerGateway> =
            match (&settings.whatsapp_api_url, settings.mock_mode) {
                (Some(url), false) => Arc::new(HttpMessengerGateway::new(
                    url.clone(),
                    settings.whatsapp_token.clone(),
                )),
                _ => Arc::new(MockMessengerGateway::new()),
            };
        let scheduler: Arc<dyn SchedulerGateway> =
            match (&settings.calendly_api_url, settings.mock_mode) {
                (Some(url), false) => Arc::new(HttpSchedulerGateway::new(
                    url.clone(),
                    settings.calendly_token.clone(),
                )),
                _ => Arc::new(MockSchedulerGateway::new()),
            };

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ListAgendaEventsTool::new(Arc::clone(&events))))?;
        registry.register(Box::new(CreateCalendarEventTool::new(Arc::clone(&events))))?;
        registry.register(Box::new(ConfirmAgendaEventTool::new(Arc::clone(&events))))?;
        registry.register(Box::new(SearchEmailsTool::new(Arc::clone(&mail))))?;
        registry.register(Box::new(ReadEmailTool::new(Arc::clone(&mail))))?;
        registry.register(Box::new(SendEmailTool::new(Arc::clone(&mail))))?;
        registry.register(Box::new(SendWhatsappTool::new(Arc::clone(&messenger))))?;
        registry.register(Box::new(ListCalendlyEventsTool::new(Arc::clone(&scheduler))))?;
        registry.register(Box::new(CreateCalendlyEventTool::new(Arc::clone(&scheduler))))?;
        registry.register(Box::new(IngestCalendlyEventsTool::new(
            Arc::clone(&scheduler),
            Arc::clone(&events),
        )))?;
        registry.register(Box::new(ExtractUrlsTool))?;
        registry.register(Box::new(ScrapeWebContentTool::new()))?;
        registry.register(Box::new(ScrapeNewsForEventsTool::new()))?;
        let registry = Arc::new(registry);

        let mcp = Arc::new(McpManager::new(
            settings.mcp_servers.clone(),
            McpManagerConfig::default(),
        ));
        let executor = Arc::new(ToolExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&mcp),
            settings.mcp_tool_routes.clone(),
            Arc::clone(&metrics),
            Arc::clone(&audit) as Arc<dyn AuditLog>,
            settings.mock_mode,
            settings.tool_call_timeout,
        ));

        let llm: Arc<dyn LlmClient> = if settings.mock_mode {
            Arc::new(MockLlm::new().with_fallback("Entendido."))
        } else {
            let mut config = async_openai::config::OpenAIConfig::new();
            if let Some(ref key) = settings.openai_api_key {
                config = config.with_api_key(key.clone());
            }
            if let Some(ref base) = settings.openai_base_url {
                config = config.with_api_base(base.clone());
            }
            Arc::new(ChatClient::with_config(config, &settings.llm_model))
        };

        let classifier = Arc::new(IntentClassifier::new(Arc::clone(&llm)));
        let policy = PolicyEngine::new(settings.working_hours, settings.max_lookahead_days);
        let orchestrator = Arc::new(Orchestrator::new(
            classifier,
            Arc::clone(&retriever),
            Arc::clone(&events),
            policy,
            Arc::clone(&registry),
            Arc::clone(&executor),
            Arc::clone(&llm),
            Arc::clone(&metrics),
            Arc::clone(&audit) as Arc<dyn AuditLog>,
            settings.clone(),
        ));

        let conversations = Arc::new(ConversationProcessor::new(
            Arc::clone(&messages),
            Arc::clone(&orchestrator),
            Arc::clone(&executor),
        ));

        info!(
            mock_mode = settings.mock_mode,
            tools = registry.list().len(),
            mcp_servers = settings.mcp_servers.len(),
            "service container ready"
        );

        Ok(Self {
            settings,
            metrics,
            audit,
            embedding_cache,
            retriever,
            chunk_store,
            events,
            messages,
            registry,
            mcp,
            executor,
            llm,
            orchestrator,
            conversations,
        })
    }

    /// Builds a voice session wired to the configured STT/TTS backends (mocks
    /// when unset).
    pub fn voice_session(&self) -> VoiceSession {
        let stt: Arc<dyn SttClient> = match (&self.settings.stt_base_url, self.settings.mock_mode) {
            (Some(url), false) => Arc::new(HttpSttClient::new(
                url.clone(),
                self.settings.stt_api_key.clone(),
            )),
            _ => Arc::new(MockStt::new()),
        };
        let tts_primary: Arc<dyn TtsClient> =
            match (&self.settings.tts_base_url, self.settings.mock_mode) {
                (Some(url), false) => Arc::new(HttpTtsClient::new(url.clone(), "primary")),
                _ => Arc::new(MockTts::new("primary")),
            };
        let tts_fallback: Option<Arc<dyn TtsClient>> = Some(Arc::new(MockTts::new("fallback")));

        VoiceSession::new(
            Arc::clone(&self.orchestrator),
            stt,
            tts_primary,
            tts_fallback,
            Arc::clone(&self.metrics),
            VoiceSessionConfig {
                first_chunk_timeout: self.settings.tts_first_chunk_timeout,
                ..VoiceSessionConfig::default()
            },
        )
    }

    /// Startup diagnostics: verifies the static MCP routes against each
    /// server's `tools/list`.
    pub async fn validate_mcp_routes(&self) {
        if !self.settings.mcp_tool_routes.is_empty() {
            self.mcp
                .validate_routes(&self.settings.mcp_tool_routes)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.db");
        std::mem::forget(dir);
        Settings {
            database_path: path.to_string_lossy().into_owned(),
            ..Settings::for_tests()
        }
    }

    #[tokio::test]
    async fn container_builds_in_mock_mode() {
        let container = ServiceContainer::build(test_settings()).unwrap();
        assert!(container.settings.mock_mode);
        assert_eq!(container.registry.list().len(), 13);
    }

    #[tokio::test]
    async fn mock_container_answers_a_text_request() {
        let container = ServiceContainer::build(test_settings()).unwrap();
        let outcome = container
            .orchestrator
            .run("hola, ¿qué tal?", vec![], None, None)
            .await
            .unwrap();
        assert!(!outcome.response.is_empty());
    }
}
