//! Test fixtures for installer integration tests.

use da_core::config::providers::ProviderCatalog;
use da_core::engine::InstallationManager;
use da_core::repositories::mock::MockMlBackend;
use da_core::repositories::MlServices;
use da_protocol::installation_models::InstallRequest;
use da_protocol::ipc::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Create an install request for `provider` with test credentials.
pub fn create_test_request(provider: &str) -> InstallRequest {
    InstallRequest {
        selected_provider: provider.to_string(),
        model_id: "gpt-4o".to_string(),
        api_url: "https://api.openai.com".to_string(),
        api_key: "sk-test-key".to_string(),
        description: Some("Integration test model".to_string()),
    }
}

/// Services wired to `backend` with the built-in catalog and no propagation delay.
pub fn create_test_services(backend: &Arc<MockMlBackend>) -> Arc<MlServices> {
    let providers = ProviderCatalog::builtin().expect("built-in providers should parse");
    Arc::new(
        MlServices::from_backend(Arc::clone(backend), Arc::new(providers))
            .with_agent_propagation_delay(Duration::ZERO),
    )
}

/// An installer over `backend`.
pub fn create_test_installer(backend: &Arc<MockMlBackend>) -> InstallationManager {
    InstallationManager::new(create_test_services(backend))
}

/// Drain every event currently buffered in `rx`.
#[allow(dead_code)]
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
