// file: session.rs
// desc: ties the signed-in user to history storage, migrating on sign-in

use std::cell::Cell;

use crate::auth::{AuthBackend, AuthService, Authenticator, Credential, FirebaseAuth, IdToken, LocalAuth, User};
use crate::config::{AppConfig, AuthProvider, StorageProvider};
use crate::error::AuthError;
use crate::history::HistoryItem;
use crate::storage::{BrowserStore, DocumentStore, FirestoreStore, HistoryStore, KeyValueStore};

pub type BrowserSession = Session<BrowserStore, FirestoreStore, AuthBackend>;

pub struct Session<S, D, A = AuthBackend> {
    auth: AuthService<A>,
    history: HistoryStore<S, D>,
    signing_in: Cell<bool>,
}

impl BrowserSession {
    /// Providers as selected by `config`, persisting to `window.localStorage`.
    pub fn for_browser(config: &AppConfig) -> Self {
        let token = IdToken::default();

        let history = match config.storage {
            StorageProvider::Local => HistoryStore::local(BrowserStore::open(), config.history_limits),
            StorageProvider::Firebase => {
                let remote = config
                    .firebase
                    .is_configured()
                    .then(|| FirestoreStore::new(&config.firebase, token.clone()));
                HistoryStore::cloud(BrowserStore::open(), remote, config.history_limits)
            }
        };

        let backend = match config.auth {
            AuthProvider::Local => AuthBackend::Local(LocalAuth),
            AuthProvider::Firebase => AuthBackend::Firebase(FirebaseAuth::new(&config.firebase, token)),
        };

        Session::new(AuthService::new(backend), history)
    }
}

impl<S: KeyValueStore, D: DocumentStore, A: Authenticator> Session<S, D, A> {
    pub fn new(auth: AuthService<A>, history: HistoryStore<S, D>) -> Self {
        Self {
            auth,
            history,
            signing_in: Cell::new(false),
        }
    }

    pub fn auth(&self) -> &AuthService<A> {
        &self.auth
    }

    fn user_id(&self) -> Option<String> {
        self.auth.current_user().map(|user| user.id)
    }

    /// True from the start of `sign_in` until its migration has finished.
    /// Auth listeners fire in between; history read then is not final.
    pub fn is_signing_in(&self) -> bool {
        self.signing_in.get()
    }

    /// Sign in, then move device history into the user's collection once.
    /// A failed migration is logged and leaves the local data for next time;
    /// it does not fail the sign-in.
    pub async fn sign_in(&self, credential: &Credential) -> Result<User, AuthError> {
        self.signing_in.set(true);
        let result = self.sign_in_and_reconcile(credential).await;
        self.signing_in.set(false);
        result
    }

    async fn sign_in_and_reconcile(&self, credential: &Credential) -> Result<User, AuthError> {
        let user = self.auth.sign_in(credential).await?;
        match self.history.reconcile(&user.id).await {
            Ok(0) => {}
            Ok(moved) => log::info!("Moved {moved} local history items to {}", user.id),
            Err(e) => log::error!("Failed to migrate local data to cloud: {e}"),
        }
        Ok(user)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await?;
        self.history.forget_cached();
        Ok(())
    }

    pub async fn history(&self) -> Vec<HistoryItem> {
        self.history.get_history(self.user_id().as_deref()).await
    }

    pub async fn save(&self, item: HistoryItem) -> Vec<HistoryItem> {
        self.history
            .add_to_history(self.user_id().as_deref(), item)
            .await
    }

    pub async fn remove(&self, character: char) -> Vec<HistoryItem> {
        self.history
            .remove_from_history(self.user_id().as_deref(), character)
            .await
    }

    pub async fn clear(&self) -> Vec<HistoryItem> {
        self.history.clear_history(self.user_id().as_deref()).await
    }
}
