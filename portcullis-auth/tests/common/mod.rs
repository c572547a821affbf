//! Mock identity provider shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use portcullis_auth::{ProviderConfig, ProviderConfigBuilder};
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PROVIDER_KEY: &[u8] = include_bytes!("../fixtures/provider_key.pem");
pub const ROGUE_KEY: &[u8] = include_bytes!("../fixtures/rogue_key.pem");

pub const PROVIDER_N: &str = "zDI2R2v3eqDdhzZfV7qLeGS8Xk0qoSMeUpXhXi5RARq0PlSFauMJutIwUMikvX_sFB7Znhn6gMv_9k3kuueghrWoReHaS7nXbEDJSDCodO2RXvtcZLBGJBpu3d0zNfxF-grtKu7MZzWHMWPKe_qXEHFuS0VPZoIC3D7J2tcjWBi4dnQFSGP9FIJdAugmG0Cm1ZVuDFwV5xGtD0oEXgfEnqgg_NNtMrFA7PGCwW57AV9uourOmLkU-HwJEdFCeYT9aD0frpIh0E7VlWB1AUk_FDpLGhZxWBmWP4wejNLGdrOjUgPlIK0qSGgmlIXYV9pLICh30UGpUuqdhlhkP_zDhQ";
pub const ROGUE_N: &str = "znRlyk__84lLiO0eE6tc9ALGsKH3TO6EfHwOOgg5Qw9ubdf-As_Ek8SRb-wUAhVeIooCx9y98nD5e7PU0bvQkEoRNK5dU2-_er30TShuZE0mbKnrvSYkzEGJ19qlONEu0xLmJRZrb-OgL1Qrg3yGT-rwIR_6UyiGQ3FC817C8C30dDw4YPSApKNt3MLTVwBe1xTJkA0aXqjl6A87bN1BIZSfSFYJJoobX_PNlORwks0zOa-787W0z4RJJWeLXyxx7oGy1sRlUfGW8GAFCodADf0mnNsK4gw4mX1U0WW7YO8XcZeCufdLm__KDEv8ThZUwbTytaamrEbKM6Oj7H2EUQ";

pub const CLIENT_ID: &str = "client-123";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const TEST_EMAIL: &str = "test@example.com";
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Sign `claims` as an RS256 JWT with the given PEM key and key-id.
pub fn sign(pem: &[u8], kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem).expect("test key");
    jsonwebtoken::encode(&header, claims, &key).expect("sign test token")
}

/// A JWKS document publishing `(kid, modulus)` pairs with exponent AQAB.
pub fn jwks(keys: &[(&str, &str)]) -> Value {
    let keys: Vec<Value> = keys
        .iter()
        .map(|(kid, n)| json!({"kid": kid, "kty": "RSA", "use": "sig", "alg": "RS256", "n": n, "e": "AQAB"}))
        .collect();
    json!({ "keys": keys })
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn state_of(url: &Url) -> String {
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state parameter")
}

/// A wiremock server answering on the provider's token and JWKS paths.
pub struct TestProvider {
    pub server: MockServer,
}

impl TestProvider {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Claims of a well-formed identity token for `email`, valid for an hour.
    pub fn claims_for(&self, email: &str) -> Value {
        json!({
            "sub": format!("user-{email}"),
            "email": email,
            "name": "Test User",
            "iss": self.issuer(),
            "aud": CLIENT_ID,
            "iat": now(),
            "exp": now() + 3600,
        })
    }

    pub fn config_builder(&self) -> ProviderConfigBuilder {
        ProviderConfig::builder()
            .domain(self.server.uri())
            .client_id(CLIENT_ID)
            .redirect_uri(REDIRECT_URI)
            .admin_emails([ADMIN_EMAIL])
            .http_timeout(Duration::from_secs(2))
    }

    pub fn config(&self) -> ProviderConfig {
        self.config_builder().build().expect("test config")
    }

    pub async fn mount_jwks(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer the token endpoint for `code` with the given id token.
    pub async fn mount_token(&self, code: &str, id_token: &str) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(id_token)))
            .mount(&self.server)
            .await;
    }

    /// Redeem `code` once; every later attempt gets `invalid_grant`.
    pub async fn mount_single_use_token(&self, code: &str, id_token: &str) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(id_token)))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            )
            .with_priority(2)
            .mount(&self.server)
            .await;
    }
}

pub fn token_response(id_token: &str) -> Value {
    json!({
        "access_token": "access-token",
        "id_token": id_token,
        "refresh_token": "refresh-token",
        "token_type": "Bearer",
        "expires_in": 3600,
    })
}
