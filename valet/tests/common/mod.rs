//! Shared wiring for integration tests: a scripted LLM, mock gateways, real
//! SQLite-backed event/message stores on temp files, and a non-mock executor
//! so local tools actually mutate the stores.
#![allow(dead_code)]

use std::sync::Arc;

use valet::embedding::MockEmbedder;
use valet::intent::IntentClassifier;
use valet::llm::MockLlm;
use valet::mcp::{McpManager, McpManagerConfig};
use valet::metrics::Metrics;
use valet::pipeline::Orchestrator;
use valet::policy::PolicyEngine;
use valet::retrieval::Retriever;
use valet::store::{
    EventStore, InMemoryChunkStore, MessageStore, NewChunk, SqliteAuditLog,
};
use valet::tools::gateway::{MockMailGateway, MockMessengerGateway, MockSchedulerGateway};
use valet::tools::{
    ConfirmAgendaEventTool, CreateCalendarEventTool, ExtractUrlsTool, ListAgendaEventsTool,
    ListCalendlyEventsTool, ReadEmailTool, SearchEmailsTool, SendEmailTool, SendWhatsappTool,
    ToolRegistry,
};
use valet::{Settings, ToolExecutor};

pub struct Harness {
    pub llm: Arc<MockLlm>,
    pub events: Arc<EventStore>,
    pub messages: Arc<MessageStore>,
    pub messenger: Arc<MockMessengerGateway>,
    pub mail: Arc<MockMailGateway>,
    pub executor: Arc<ToolExecutor>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<Metrics>,
    pub chunk_store: Arc<InMemoryChunkStore>,
    pub embedder: Arc<MockEmbedder>,
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harness.db");
    std::mem::forget(dir);

    let llm = Arc::new(MockLlm::new().with_fallback("Hecho."));
    let metrics = Arc::new(Metrics::new());
    let events = Arc::new(EventStore::new(&db_path).unwrap());
    let messages = Arc::new(MessageStore::new(&db_path).unwrap());
    let audit = Arc::new(SqliteAuditLog::new(&db_path).unwrap());

    let embedder = Arc::new(MockEmbedder::new(32));
    let chunk_store = Arc::new(InMemoryChunkStore::new(32));
    let retriever = Arc::new(Retriever::new(embedder.clone(), chunk_store.clone()));

    let mail = Arc::new(MockMailGateway::new());
    let messenger = Arc::new(MockMessengerGateway::new());
    let scheduler = Arc::new(MockSchedulerGateway::new());

    let mut registry = ToolRegistry::new();
    registry
        .register(Box::new(ListAgendaEventsTool::new(events.clone())))
        .unwrap();
    registry
        .register(Box::new(CreateCalendarEventTool::new(events.clone())))
        .unwrap();
    registry
        .register(Box::new(ConfirmAgendaEventTool::new(events.clone())))
        .unwrap();
    registry
        .register(Box::new(SearchEmailsTool::new(mail.clone())))
        .unwrap();
    registry
        .register(Box::new(ReadEmailTool::new(mail.clone())))
        .unwrap();
    registry
        .register(Box::new(SendEmailTool::new(mail.clone())))
        .unwrap();
    registry
        .register(Box::new(SendWhatsappTool::new(messenger.clone())))
        .unwrap();
    registry
        .register(Box::new(ListCalendlyEventsTool::new(scheduler.clone())))
        .unwrap();
    registry.register(Box::new(ExtractUrlsTool)).unwrap();
    let registry = Arc::new(registry);

    let mcp = Arc::new(McpManager::new(
        Default::default(),
        McpManagerConfig::default(),
    ));
    let settings = Settings::for_tests();
    let executor = Arc::new(ToolExecutor::new(
        registry.clone(),
        mcp,
        Default::default(),
        metrics.clone(),
        audit,
        false,
        settings.tool_call_timeout,
    ));

    let classifier = Arc::new(IntentClassifier::new(llm.clone()));
    let policy = PolicyEngine::new(settings.working_hours, settings.max_lookahead_days);
    let audit_for_orchestrator = Arc::new(SqliteAuditLog::new(&db_path).unwrap());
    let orchestrator = Arc::new(Orchestrator::new(
        classifier,
        retriever,
        events.clone(),
        policy,
        registry,
        executor.clone(),
        llm.clone(),
        metrics.clone(),
        audit_for_orchestrator,
        settings,
    ));

    Harness {
        llm,
        events,
        messages,
        messenger,
        mail,
        executor,
        orchestrator,
        metrics,
        chunk_store,
        embedder,
    }
}

/// Seeds one semantic chunk through the harness embedder.
pub async fn seed_chunk(h: &Harness, chunk_id: &str, source: &str, text: &str) {
    use valet::embedding::Embedder;
    use valet::store::ChunkStore;
    let v = h.embedder.embed(&[text]).await.unwrap().remove(0);
    h.chunk_store
        .insert(NewChunk {
            chunk_id: chunk_id.into(),
            source: source.into(),
            text: text.into(),
            embedding: v,
        })
        .await
        .unwrap();
}
