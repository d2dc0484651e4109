use std::collections::HashMap;
use tokio::sync::Mutex;

use async_trait::async_trait;
use p384::SecretKey;
use privacypass_ratelimited::ratelimited_tokens::server::OriginKeyStore;

#[derive(Default)]
pub struct MemoryOriginKeyStore {
    keys: Mutex<HashMap<String, SecretKey>>,
}

#[async_trait]
impl OriginKeyStore for MemoryOriginKeyStore {
    async fn insert(&self, origin_name: String, key: SecretKey) {
        let mut keys = self.keys.lock().await;
        keys.insert(origin_name, key);
    }

    async fn get(&self, origin_name: &str) -> Option<SecretKey> {
        self.keys.lock().await.get(origin_name).cloned()
    }
}
