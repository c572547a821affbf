//! Key-set caching and rotation against a mock JWKS endpoint.

mod common;

use std::time::Duration;

use common::*;
use portcullis_auth::{AuthError, JwksClient, KeyResolver, Session, SessionManager, SessionStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn jwks_client(provider: &TestProvider) -> JwksClient {
    JwksClient::new(
        format!("{}/.well-known/jwks.json", provider.server.uri()).parse().unwrap(),
        Duration::from_secs(2),
    )
    .unwrap()
}

async fn jwks_hits(provider: &TestProvider) -> usize {
    provider
        .server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/.well-known/jwks.json")
        .count()
}

#[tokio::test]
async fn known_kid_is_served_from_cache() {
    let provider = TestProvider::start().await;
    provider.mount_jwks(jwks(&[("key-1", PROVIDER_N)])).await;
    let client = jwks_client(&provider);

    client.get_key("key-1").await.unwrap();
    client.get_key("key-1").await.unwrap();
    client.get_key("key-1").await.unwrap();

    assert_eq!(jwks_hits(&provider).await, 1);
    assert_eq!(client.len().await, 1);
}

#[tokio::test]
async fn unknown_kid_triggers_one_refetch() {
    let provider = TestProvider::start().await;
    provider.mount_jwks(jwks(&[("key-1", PROVIDER_N)])).await;
    let client = jwks_client(&provider).with_min_refresh_interval(Duration::ZERO);

    client.get_key("key-1").await.unwrap();
    let err = client.get_key("ghost").await.unwrap_err();

    assert!(matches!(err, AuthError::UnknownSigningKey(kid) if kid == "ghost"));
    assert_eq!(jwks_hits(&provider).await, 2);
}

#[tokio::test]
async fn unknown_kid_refetch_is_throttled() {
    let provider = TestProvider::start().await;
    provider.mount_jwks(jwks(&[("key-1", PROVIDER_N)])).await;
    let client = jwks_client(&provider).with_min_refresh_interval(Duration::from_secs(60));

    client.get_key("key-1").await.unwrap();
    for _ in 0..5 {
        assert!(client.get_key("ghost").await.is_err());
    }

    assert_eq!(jwks_hits(&provider).await, 1);
}

#[tokio::test]
async fn expired_cache_is_refetched() {
    let provider = TestProvider::start().await;
    provider.mount_jwks(jwks(&[("key-1", PROVIDER_N)])).await;
    let client = jwks_client(&provider).with_ttl(Duration::ZERO);

    client.get_key("key-1").await.unwrap();
    client.get_key("key-1").await.unwrap();

    assert_eq!(jwks_hits(&provider).await, 2);
}

#[tokio::test]
async fn unreachable_jwks_is_a_fetch_error() {
    let provider = TestProvider::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&provider.server)
        .await;
    let client = jwks_client(&provider);

    let err = client.get_key("key-1").await.unwrap_err();
    assert!(matches!(err, AuthError::JwksFetchFailed(_)));
}

#[tokio::test]
async fn rotated_key_is_picked_up_during_login() {
    let provider = TestProvider::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&[("key-1", PROVIDER_N)])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&provider.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks(&[("key-1", PROVIDER_N), ("key-2", ROGUE_N)])),
        )
        .with_priority(2)
        .mount(&provider.server)
        .await;

    provider
        .mount_token("before", &sign(PROVIDER_KEY, "key-1", &provider.claims_for(TEST_EMAIL)))
        .await;
    provider
        .mount_token("after", &sign(ROGUE_KEY, "key-2", &provider.claims_for(TEST_EMAIL)))
        .await;

    let config = provider
        .config_builder()
        .jwks_min_refresh_interval(Duration::ZERO)
        .build()
        .unwrap();
    let manager = SessionManager::new(config).unwrap();

    let mut session = Session::new();
    let url = manager.initiate_login(&mut session);
    manager.handle_callback(&mut session, "before", &state_of(&url)).await.unwrap();

    let mut rotated = Session::new();
    let url = manager.initiate_login(&mut rotated);
    manager.handle_callback(&mut rotated, "after", &state_of(&url)).await.unwrap();

    assert_eq!(rotated.status(), SessionStatus::Authenticated);
    assert_eq!(jwks_hits(&provider).await, 2);
}

#[tokio::test]
async fn unpublished_kid_fails_login_as_invalid_signature() {
    let provider = TestProvider::start().await;
    provider.mount_jwks(jwks(&[("key-1", PROVIDER_N)])).await;
    provider
        .mount_token("code", &sign(PROVIDER_KEY, "ghost", &provider.claims_for(TEST_EMAIL)))
        .await;

    let manager = SessionManager::new(provider.config()).unwrap();
    let mut session = Session::new();
    let url = manager.initiate_login(&mut session);

    let err = manager.handle_callback(&mut session, "code", &state_of(&url)).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidSignature));
    assert_eq!(session.status(), SessionStatus::Anonymous);
}

#[tokio::test]
async fn concurrent_lookups_share_one_cache() {
    let provider = TestProvider::start().await;
    provider.mount_jwks(jwks(&[("key-1", PROVIDER_N)])).await;
    let client = std::sync::Arc::new(jwks_client(&provider));
    client.refresh().await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.get_key("key-1").await.is_ok() })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap());
    }

    assert_eq!(jwks_hits(&provider).await, 1);
}
