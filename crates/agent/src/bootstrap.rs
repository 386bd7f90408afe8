//! Wiring: turn an [`AppConfig`] into a ready [`ChatService`].

use std::sync::Arc;

use taskmate_config::{AppConfig, StorageConfig};
use taskmate_core::error::Error;
use taskmate_core::event::EventBus;
use taskmate_core::gateway::ModelGateway;
use taskmate_core::store::ConversationStore;
use taskmate_core::task::TaskRepository;
use taskmate_store::{InMemoryStore, SqliteStore};
use tracing::info;

use crate::chat::ChatService;
use crate::context::ContextBuilder;
use crate::loop_runner::AgentLoop;

/// What the front ends need: the chat service and direct task access,
/// both over the same store.
pub struct Services {
    pub chat: ChatService,
    pub tasks: Arc<dyn TaskRepository>,
}

/// Build the chat service with the configured model gateway.
pub async fn build_chat_service(
    config: &AppConfig,
    event_bus: Arc<EventBus>,
) -> Result<ChatService, Error> {
    Ok(build_services(config, event_bus).await?.chat)
}

/// Build all services with the configured model gateway.
pub async fn build_services(config: &AppConfig, event_bus: Arc<EventBus>) -> Result<Services, Error> {
    let gateway = taskmate_providers::build_from_config(config).map_err(|e| Error::Config {
        message: e.to_string(),
    })?;
    services_with_gateway(config, gateway, event_bus).await
}

/// Build the chat service around an already constructed gateway.
pub async fn chat_service_with_gateway(
    config: &AppConfig,
    gateway: Arc<dyn ModelGateway>,
    event_bus: Arc<EventBus>,
) -> Result<ChatService, Error> {
    Ok(services_with_gateway(config, gateway, event_bus).await?.chat)
}

/// Build all services around an already constructed gateway.
pub async fn services_with_gateway(
    config: &AppConfig,
    gateway: Arc<dyn ModelGateway>,
    event_bus: Arc<EventBus>,
) -> Result<Services, Error> {
    let (conversations, tasks) = open_store(&config.storage).await?;
    let registry = Arc::new(taskmate_tools::default_registry(tasks.clone())?);
    info!(
        tools = registry.len(),
        storage = conversations.name(),
        max_iterations = config.agent.max_iterations,
        "Chat service ready"
    );

    let agent = AgentLoop::new(gateway, registry, event_bus).with_config(&config.agent);
    let chat = ChatService::new(agent, ContextBuilder::from_config(&config.agent), conversations)
        .with_history_load_limit(config.agent.history_load_limit);
    Ok(Services { chat, tasks })
}

/// Open the configured backend. One store serves both conversations and tasks.
pub async fn open_store(
    config: &StorageConfig,
) -> Result<(Arc<dyn ConversationStore>, Arc<dyn TaskRepository>), Error> {
    match config.backend.as_str() {
        "memory" => {
            let store = Arc::new(InMemoryStore::new());
            Ok((store.clone(), store))
        }
        "sqlite" => {
            let store = Arc::new(SqliteStore::new(&config.database_url()).await?);
            Ok((store.clone(), store))
        }
        other => Err(Error::Config {
            message: format!("unknown storage backend '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedGateway, tool_request};
    use serde_json::json;
    use taskmate_core::gateway::ModelResponse;
    use taskmate_core::identity::UserIdentity;
    use taskmate_core::task::TaskFilter;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.backend = "memory".into();
        config
    }

    #[tokio::test]
    async fn wires_a_working_service() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(ModelResponse::final_answer(
            "Hi there",
        ))]));
        let chat = chat_service_with_gateway(&memory_config(), gateway, Arc::new(EventBus::default()))
            .await
            .unwrap();

        assert_eq!(chat.tool_specs().len(), 5);
        let reply = chat.send(&UserIdentity::from("alice"), None, "hello").await.unwrap();
        assert_eq!(reply.text, "Hi there");
    }

    #[tokio::test]
    async fn chat_and_tasks_share_one_store() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(tool_request(&[("call_1", "add_task", json!({"title": "Water plants"}))])),
            Ok(ModelResponse::final_answer("Added.")),
        ]));
        let services = services_with_gateway(&memory_config(), gateway, Arc::new(EventBus::default()))
            .await
            .unwrap();

        let alice = UserIdentity::from("alice");
        services.chat.send(&alice, None, "add water plants").await.unwrap();
        let tasks = services.tasks.list(&alice, &TaskFilter::default()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Water plants");
    }

    #[tokio::test]
    async fn sqlite_backend_opens_in_memory_url() {
        let config = StorageConfig {
            backend: "sqlite".into(),
            path: Some("sqlite::memory:".into()),
        };
        let (conversations, _) = open_store(&config).await.unwrap();
        assert_eq!(conversations.name(), "sqlite");
    }

    #[tokio::test]
    async fn unknown_backend_is_a_config_error() {
        let config = StorageConfig {
            backend: "postgres".into(),
            path: None,
        };
        assert!(matches!(open_store(&config).await, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let mut config = memory_config();
        config.api_key = None;
        let result = build_chat_service(&config, Arc::new(EventBus::default())).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
