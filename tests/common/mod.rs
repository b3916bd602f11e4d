use std::sync::Arc;
use std::time::Duration;

use docgate::Document;
use docgate::DocumentGateway;
use docgate::DocumentId;
use docgate::GatewayBuilder;
use docgate::GatewayConfig;
use docgate::MemDocumentStore;
use docgate::MemoryChannel;
use serde_json::json;

pub const WAIT_FOR_RESPONSE: Duration = Duration::from_secs(5);

pub fn doc_id(n: usize) -> DocumentId {
    DocumentId::parse(&format!("id:music:music::{n}")).unwrap()
}

pub fn song(n: usize) -> Document {
    let fields = json!({"title": format!("song {n}"), "year": 1960 + n % 50});
    Document::new(doc_id(n), fields.as_object().cloned().unwrap())
}

/// Store holding songs `1..=n`.
pub fn seeded_store(n: usize) -> Arc<MemDocumentStore> {
    let store = Arc::new(MemDocumentStore::new());
    for i in 1..=n {
        store.insert(song(i));
    }
    store
}

pub fn start_gateway(store: Arc<MemDocumentStore>) -> DocumentGateway {
    start_gateway_with(GatewayConfig::default(), store)
}

pub fn start_gateway_with(
    config: GatewayConfig,
    store: Arc<MemDocumentStore>,
) -> DocumentGateway {
    crate::enable_logger();
    GatewayBuilder::new(config).mem_store(store).build().unwrap()
}

pub async fn response_of(channel: &MemoryChannel) {
    let deadline = tokio::time::Instant::now() + WAIT_FOR_RESPONSE;
    while !channel.is_closed() {
        assert!(tokio::time::Instant::now() < deadline, "no response within {WAIT_FOR_RESPONSE:?}");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
