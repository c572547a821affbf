//! Login, sign-up and logout redirect URLs.

use url::Url;

use crate::state::StateTokenGenerator;

/// Builds the browser redirects that start an authorization-code flow.
///
/// The state bound into each URL always comes from [`StateTokenGenerator`];
/// callers cannot supply their own.
#[derive(Debug, Clone)]
pub struct AuthorizationUrlBuilder {
    authorize_endpoint: Url,
    signup_endpoint: Url,
    generator: StateTokenGenerator,
}

impl AuthorizationUrlBuilder {
    pub fn new(authorize_endpoint: Url, signup_endpoint: Url) -> Self {
        Self { authorize_endpoint, signup_endpoint, generator: StateTokenGenerator::new() }
    }

    /// Build the login URL. Returns the URL and the state it carries.
    pub fn build_login_url(
        &self,
        client_id: &str,
        redirect_uri: &Url,
        scope: &[String],
    ) -> (Url, String) {
        self.build(&self.authorize_endpoint, client_id, redirect_uri, scope)
    }

    /// Build the sign-up URL. Returns the URL and the state it carries.
    pub fn build_signup_url(
        &self,
        client_id: &str,
        redirect_uri: &Url,
        scope: &[String],
    ) -> (Url, String) {
        self.build(&self.signup_endpoint, client_id, redirect_uri, scope)
    }

    fn build(
        &self,
        endpoint: &Url,
        client_id: &str,
        redirect_uri: &Url,
        scope: &[String],
    ) -> (Url, String) {
        let state = self.generator.generate();
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &scope.join(" "))
            .append_pair("state", &state);
        (url, state)
    }
}

/// Build the provider logout URL that also ends the provider's browser session.
pub fn build_logout_url(logout_endpoint: &Url, client_id: &str, logout_uri: &Url) -> Url {
    let mut url = logout_endpoint.clone();
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("logout_uri", logout_uri.as_str());
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> AuthorizationUrlBuilder {
        AuthorizationUrlBuilder::new(
            "https://auth.example.com/oauth2/authorize".parse().unwrap(),
            "https://auth.example.com/signup".parse().unwrap(),
        )
    }

    fn scope() -> Vec<String> {
        vec!["openid".into(), "profile".into(), "email".into()]
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_login_url_parameters() {
        let redirect: Url = "https://app.example.com/callback".parse().unwrap();
        let (url, state) = builder().build_login_url("client-123", &redirect, &scope());

        assert_eq!(url.path(), "/oauth2/authorize");
        assert_eq!(query_value(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_value(&url, "client_id").as_deref(), Some("client-123"));
        assert_eq!(query_value(&url, "redirect_uri").as_deref(), Some(redirect.as_str()));
        assert_eq!(query_value(&url, "state"), Some(state));
        assert!(url.as_str().contains("scope=openid+profile+email"));
    }

    #[test]
    fn test_signup_url_binds_its_own_state() {
        let redirect: Url = "https://app.example.com/callback".parse().unwrap();
        let b = builder();
        let (login, login_state) = b.build_login_url("c", &redirect, &scope());
        let (signup, signup_state) = b.build_signup_url("c", &redirect, &scope());

        assert_eq!(signup.path(), "/signup");
        assert_ne!(login_state, signup_state);
        assert_eq!(query_value(&login, "state"), Some(login_state));
        assert_eq!(query_value(&signup, "state"), Some(signup_state));
    }

    #[test]
    fn test_logout_url_contains_redirect() {
        let redirect: Url = "https://app.example.com/callback?x=1".parse().unwrap();
        let url = build_logout_url(
            &"https://auth.example.com/logout".parse().unwrap(),
            "client-123",
            &redirect,
        );
        assert_eq!(query_value(&url, "client_id").as_deref(), Some("client-123"));
        assert_eq!(query_value(&url, "logout_uri").as_deref(), Some(redirect.as_str()));
    }
}
