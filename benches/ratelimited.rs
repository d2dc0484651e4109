use std::collections::HashMap;

use async_trait::async_trait;
use criterion::{async_executor::FuturesExecutor, criterion_group, criterion_main, Criterion};
use rand::rngs::OsRng;
use tokio::{runtime::Runtime, sync::Mutex};

use p384::SecretKey;
use privacypass_ratelimited::{
    auth::authenticate::TokenChallenge,
    ratelimited_tokens::{
        client::RateLimitedClient,
        server::{OriginKeyStore, RateLimitedIssuer},
    },
    TokenType,
};

#[derive(Default)]
struct MemoryOriginKeyStore {
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

const ORIGIN_NAME: &str = "example.com";

fn blind_key() -> [u8; 48] {
    let mut bytes = [0u8; 48];
    bytes[47] = 2;
    bytes
}

pub fn criterion_ratelimited_benchmark(c: &mut Criterion) {
    let mut rng = OsRng;
    let rt = Runtime::new().unwrap();

    let origin_key_store = MemoryOriginKeyStore::default();
    let issuer = RateLimitedIssuer::new(&mut rng).unwrap();
    rt.block_on(async {
        issuer
            .add_origin(&mut OsRng, &origin_key_store, ORIGIN_NAME)
            .await;
    });

    let client = RateLimitedClient::new(&mut rng);
    let token_key_id = issuer.token_key_id().unwrap();
    let name_key = issuer.name_key();
    let token_challenge = TokenChallenge::new(
        TokenType::RateLimited,
        "issuer.example.net",
        None,
        &[ORIGIN_NAME.to_string()],
    );

    // Issue token request
    c.bench_function("RATELIMITED CLIENT: Issue token request", |b| {
        b.iter(|| {
            client
                .issue_token_request(
                    &mut OsRng,
                    &token_challenge,
                    &blind_key(),
                    token_key_id,
                    issuer.token_key(),
                    ORIGIN_NAME,
                    &name_key,
                )
                .unwrap();
        });
    });

    // Issue token response
    c.bench_function("RATELIMITED ISSUER: Evaluate token request", |b| {
        b.to_async(FuturesExecutor).iter_with_setup(
            || {
                client
                    .issue_token_request(
                        &mut OsRng,
                        &token_challenge,
                        &blind_key(),
                        token_key_id,
                        issuer.token_key(),
                        ORIGIN_NAME,
                        &name_key,
                    )
                    .unwrap()
                    .0
            },
            |token_request| async move {
                issuer
                    .issue_token_response(&mut OsRng, &origin_key_store, token_request)
                    .await
                    .unwrap();
            },
        );
    });

    // Issue token
    c.bench_function("RATELIMITED CLIENT: Issue token", |b| {
        b.iter_with_setup(
            || {
                let (token_request, token_state) = client
                    .issue_token_request(
                        &mut OsRng,
                        &token_challenge,
                        &blind_key(),
                        token_key_id,
                        issuer.token_key(),
                        ORIGIN_NAME,
                        &name_key,
                    )
                    .unwrap();
                let issued = rt
                    .block_on(async {
                        issuer
                            .issue_token_response(&mut OsRng, &origin_key_store, token_request)
                            .await
                    })
                    .unwrap();
                (issued.token_response, token_state)
            },
            |(token_response, token_state)| {
                client.issue_token(token_response, &token_state).unwrap();
            },
        );
    });
}

criterion_group!(benches, criterion_ratelimited_benchmark);
criterion_main!(benches);
