// file: auth.rs
// desc: sign-in providers and auth state subscriptions

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::FirebaseConfig;
use crate::error::AuthError;
use crate::history::now_millis;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Proof of identity handed over by the page's OAuth flow.
#[derive(Debug, Clone)]
pub enum Credential {
    GoogleIdToken(String),
}

const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh this long before the id token actually expires.
const EXPIRY_MARGIN_MS: i64 = 60_000;

/// Firebase id token (about an hour long) and the refresh token that renews it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub id_token: String,
    pub refresh_token: String,
    /// Milliseconds since the Unix epoch
    pub expires_at: i64,
}

impl SessionTokens {
    /// `expires_in` is the lifetime in seconds as Firebase reports it (a
    /// decimal string); unparsable values count as already expired.
    pub fn issued(id_token: String, refresh_token: String, expires_in: &str, now: i64) -> Self {
        let lifetime = expires_in.trim().parse::<i64>().unwrap_or(0);
        Self {
            id_token,
            refresh_token,
            expires_at: now.saturating_add(lifetime.saturating_mul(1000)),
        }
    }

    pub fn is_stale(&self, now: i64) -> bool {
        now >= self.expires_at - EXPIRY_MARGIN_MS
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

/// securetoken.googleapis.com answers in snake_case.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// Firebase session shared between the auth provider that obtains it and the
/// document store that sends it.
#[derive(Debug, Clone, Default)]
pub struct IdToken(Rc<RefCell<Option<SessionTokens>>>);

impl IdToken {
    pub fn get(&self) -> Option<String> {
        self.0.borrow().as_ref().map(|t| t.id_token.clone())
    }

    pub fn tokens(&self) -> Option<SessionTokens> {
        self.0.borrow().clone()
    }

    pub fn set(&self, tokens: Option<SessionTokens>) {
        *self.0.borrow_mut() = tokens;
    }

    /// Current id token, renewed first when it is about to expire.
    pub async fn fresh(&self, client: &reqwest::Client, api_key: &str) -> Result<Option<String>, AuthError> {
        match self.tokens() {
            Some(tokens) if tokens.is_stale(now_millis()) => self.refresh(client, api_key).await,
            tokens => Ok(tokens.map(|t| t.id_token)),
        }
    }

    /// Exchange the refresh token for a new id token. Without a session there
    /// is nothing to refresh and `None` is returned.
    pub async fn refresh(&self, client: &reqwest::Client, api_key: &str) -> Result<Option<String>, AuthError> {
        let Some(current) = self.tokens() else {
            return Ok(None);
        };

        let response = client
            .post(SECURE_TOKEN_URL)
            .query(&[("key", api_key)])
            .form(&RefreshRequest {
                grant_type: "refresh_token",
                refresh_token: &current.refresh_token,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let message = rejection_message(response).await;
            log::warn!("Token refresh rejected: {message}");
            return Err(AuthError::Rejected(message));
        }

        let refreshed = response.json::<RefreshResponse>().await?.into_tokens(now_millis());
        let id_token = refreshed.id_token.clone();
        self.set(Some(refreshed));
        log::debug!("Refreshed Firebase id token");
        Ok(Some(id_token))
    }
}

impl RefreshResponse {
    fn into_tokens(self, now: i64) -> SessionTokens {
        SessionTokens::issued(self.id_token, self.refresh_token, &self.expires_in, now)
    }
}

async fn rejection_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorEnvelope>().await {
        Ok(envelope) => envelope.error.message,
        Err(_) => status.to_string(),
    }
}

#[async_trait(?Send)]
pub trait Authenticator {
    fn is_configured(&self) -> bool;

    async fn sign_in(&self, credential: &Credential) -> Result<User, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Always anonymous.
#[derive(Debug, Default)]
pub struct LocalAuth;

#[async_trait(?Send)]
impl Authenticator for LocalAuth {
    fn is_configured(&self) -> bool {
        false
    }

    async fn sign_in(&self, _: &Credential) -> Result<User, AuthError> {
        Err(AuthError::Unsupported)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Google sign-in through Firebase Identity Toolkit.
pub struct FirebaseAuth {
    client: reqwest::Client,
    config: FirebaseConfig,
    token: IdToken,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpRequest {
    post_body: String,
    request_uri: String,
    return_secure_token: bool,
    return_idp_credential: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpResponse {
    local_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl SignInWithIdpResponse {
    fn into_session(self, now: i64) -> (User, SessionTokens) {
        let tokens = SessionTokens::issued(self.id_token, self.refresh_token, &self.expires_in, now);
        let user = User {
            id: self.local_id,
            email: self.email,
            display_name: self.display_name,
            photo_url: self.photo_url,
        };
        (user, tokens)
    }
}

impl FirebaseAuth {
    pub fn new(config: &FirebaseConfig, token: IdToken) -> Self {
        if !config.is_configured() {
            log::warn!("Firebase configuration not found. Authentication disabled.");
        }
        Self {
            client: reqwest::Client::new(),
            config: *config,
            token,
        }
    }

    fn request_for(&self, credential: &Credential) -> SignInWithIdpRequest {
        let Credential::GoogleIdToken(id_token) = credential;
        let request_uri = if self.config.auth_domain.is_empty() {
            "http://localhost".to_string()
        } else {
            format!("https://{}", self.config.auth_domain)
        };

        SignInWithIdpRequest {
            post_body: format!("id_token={id_token}&providerId=google.com"),
            request_uri,
            return_secure_token: true,
            return_idp_credential: true,
        }
    }
}

#[async_trait(?Send)]
impl Authenticator for FirebaseAuth {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn sign_in(&self, credential: &Credential) -> Result<User, AuthError> {
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        let response = self
            .client
            .post(IDENTITY_TOOLKIT_URL)
            .query(&[("key", self.config.api_key)])
            .json(&self.request_for(credential))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Rejected(rejection_message(response).await));
        }

        let (user, tokens) = response
            .json::<SignInWithIdpResponse>()
            .await?
            .into_session(now_millis());
        self.token.set(Some(tokens));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.token.set(None);
        Ok(())
    }
}

/// Provider picked from `AppConfig::auth`.
pub enum AuthBackend {
    Local(LocalAuth),
    Firebase(FirebaseAuth),
}

#[async_trait(?Send)]
impl Authenticator for AuthBackend {
    fn is_configured(&self) -> bool {
        match self {
            AuthBackend::Local(auth) => auth.is_configured(),
            AuthBackend::Firebase(auth) => auth.is_configured(),
        }
    }

    async fn sign_in(&self, credential: &Credential) -> Result<User, AuthError> {
        match self {
            AuthBackend::Local(auth) => auth.sign_in(credential).await,
            AuthBackend::Firebase(auth) => auth.sign_in(credential).await,
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        match self {
            AuthBackend::Local(auth) => auth.sign_out().await,
            AuthBackend::Firebase(auth) => auth.sign_out().await,
        }
    }
}

type Listener = Rc<dyn Fn(Option<&User>)>;
type Listeners = RefCell<Vec<(u64, Listener)>>;

/// Current user plus change notifications on top of an `Authenticator`.
pub struct AuthService<A = AuthBackend> {
    backend: A,
    current: RefCell<Option<User>>,
    listeners: Rc<Listeners>,
    next_id: Cell<u64>,
}

/// Handle returned by `on_auth_state_changed`.
pub struct Subscription {
    listeners: Weak<Listeners>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

impl<A: Authenticator> AuthService<A> {
    pub fn new(backend: A) -> Self {
        Self {
            backend,
            current: RefCell::new(None),
            listeners: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    pub fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    pub async fn sign_in(&self, credential: &Credential) -> Result<User, AuthError> {
        let user = self.backend.sign_in(credential).await.inspect_err(|e| {
            log::error!("Sign-in failed: {e}");
        })?;
        log::info!("Signed in as {}", user.id);
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.backend.sign_out().await?;
        self.set_current(None);
        Ok(())
    }

    /// `callback` runs now with the current user and again on every change.
    pub fn on_auth_state_changed(&self, callback: impl Fn(Option<&User>) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let listener: Listener = Rc::new(callback);
        self.listeners.borrow_mut().push((id, listener.clone()));
        listener(self.current_user().as_ref());

        Subscription {
            listeners: Rc::downgrade(&self.listeners),
            id,
        }
    }

    fn set_current(&self, user: Option<User>) {
        *self.current.borrow_mut() = user.clone();

        // listeners may subscribe or unsubscribe while being notified
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(user.as_ref());
        }
    }
}
