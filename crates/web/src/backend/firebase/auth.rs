//! Identity Toolkit client.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use golibre_core::{Email, Identity, SubjectId};

use super::error_details;
use crate::backend::{AuthError, IdentityProvider, ProfileUpdate};
use crate::config::FirebaseConfig;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh ID tokens this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Tokens of the signed-in principal.
struct TokenSet {
    id_token: SecretString,
    refresh_token: SecretString,
    expires_at: Instant,
}

impl TokenSet {
    fn new(id_token: String, refresh_token: String, expires_in: &str) -> Self {
        // Identity Toolkit sends the lifetime in seconds as a string.
        let lifetime = expires_in.parse::<u64>().unwrap_or(3600);
        Self {
            id_token: SecretString::from(id_token),
            refresh_token: SecretString::from(refresh_token),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        }
    }
}

/// Password authentication against Identity Toolkit, for one browser session.
///
/// Holds the session's tokens and publishes the current principal on a
/// `watch` channel. A freshly connected client has no principal.
pub struct FirebaseAuth {
    client: reqwest::Client,
    api_key: SecretString,
    tokens: Mutex<Option<TokenSet>>,
    current: watch::Sender<Option<Identity>>,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    delete_attribute: Vec<&'static str>,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    // Present on `accounts:update` when the token was reissued.
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

impl AccountInfo {
    fn into_identity(self) -> Identity {
        Identity {
            subject_id: SubjectId::new(self.local_id),
            display_name: self.display_name.filter(|n| !n.is_empty()),
            email: self.email.and_then(|e| Email::parse(&e).ok()),
            avatar_url: self.photo_url.and_then(|u| Url::parse(&u).ok()),
        }
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

// =============================================================================
// FirebaseAuth
// =============================================================================

impl FirebaseAuth {
    /// Create a signed-out client.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &FirebaseConfig) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            client,
            api_key: config.api_key.clone(),
            tokens: Mutex::new(None),
            current,
        }
    }

    /// The current ID token, refreshed when close to expiry.
    ///
    /// Returns `None` when signed out or when the refresh fails; store
    /// requests then go out unauthenticated and security rules decide.
    pub async fn id_token(&self) -> Option<SecretString> {
        let mut tokens = self.tokens.lock().await;
        let set = tokens.as_mut()?;

        if set.expires_at.saturating_duration_since(Instant::now()) <= REFRESH_MARGIN {
            match self.refresh(&set.refresh_token).await {
                Ok(fresh) => *set = fresh,
                Err(e) => {
                    warn!(error = %e, "ID token refresh failed");
                    return None;
                }
            }
        }

        Some(set.id_token.clone())
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenSet, AuthError> {
        let response = self
            .client
            .post(SECURE_TOKEN_URL)
            .query(&[("key", self.api_key.expose_secret())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(map_auth_error(&body));
        }

        let fresh: RefreshResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::Provider(e.to_string()))?;
        debug!("ID token refreshed");
        Ok(TokenSet::new(
            fresh.id_token,
            fresh.refresh_token,
            &fresh.expires_in,
        ))
    }

    /// POST a JSON body to an Identity Toolkit method.
    async fn call<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R, AuthError> {
        let response = self
            .client
            .post(format!("{IDENTITY_TOOLKIT_URL}/accounts:{method}"))
            .query(&[("key", self.api_key.expose_secret())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(map_auth_error(&body));
        }

        serde_json::from_str(&body).map_err(|e| AuthError::Provider(e.to_string()))
    }

    /// Look up the account behind an ID token.
    async fn lookup(&self, id_token: &str) -> Result<Identity, AuthError> {
        let response: LookupResponse = self.call("lookup", &LookupRequest { id_token }).await?;
        response
            .users
            .into_iter()
            .next()
            .map(AccountInfo::into_identity)
            .ok_or(AuthError::UserNotFound)
    }

    /// Store fresh tokens and announce the principal.
    async fn establish(&self, tokens: TokenSet, identity: Identity) -> Identity {
        *self.tokens.lock().await = Some(tokens);
        self.current.send_replace(Some(identity.clone()));
        identity
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let response: PasswordResponse = self
            .call(
                "signInWithPassword",
                &PasswordRequest {
                    email: email.as_str(),
                    password: password.expose_secret(),
                    return_secure_token: true,
                },
            )
            .await?;

        let identity = self.lookup(&response.id_token).await?;
        let tokens = TokenSet::new(
            response.id_token,
            response.refresh_token,
            &response.expires_in,
        );
        Ok(self.establish(tokens, identity).await)
    }

    #[instrument(skip(self, password))]
    async fn sign_up_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let response: PasswordResponse = self
            .call(
                "signUp",
                &PasswordRequest {
                    email: email.as_str(),
                    password: password.expose_secret(),
                    return_secure_token: true,
                },
            )
            .await?;

        let mut identity = Identity::new(response.local_id);
        identity.email = Some(email.clone());
        let tokens = TokenSet::new(
            response.id_token,
            response.refresh_token,
            &response.expires_in,
        );
        Ok(self.establish(tokens, identity).await)
    }

    #[instrument(skip_all)]
    async fn update_profile(&self, update: ProfileUpdate) -> Result<Identity, AuthError> {
        let id_token = self.id_token().await.ok_or(AuthError::NotSignedIn)?;
        let photo_url = update.photo_url.as_ref().map(Url::as_str);

        let account: AccountInfo = self
            .call(
                "update",
                &UpdateRequest {
                    id_token: id_token.expose_secret(),
                    display_name: update.display_name.as_deref(),
                    photo_url,
                    delete_attribute: if photo_url.is_none() {
                        vec!["PHOTO_URL"]
                    } else {
                        Vec::new()
                    },
                    return_secure_token: true,
                },
            )
            .await?;

        if let (Some(id), Some(refresh), Some(expires_in)) = (
            account.id_token.clone(),
            account.refresh_token.clone(),
            account.expires_in.as_deref(),
        ) {
            *self.tokens.lock().await = Some(TokenSet::new(id, refresh, expires_in));
        }

        Ok(account.into_identity())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.tokens.lock().await.take();
        self.current.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        let mut receiver = self.current.subscribe();
        receiver.mark_changed();
        receiver
    }
}

/// Map an Identity Toolkit error body to an [`AuthError`].
///
/// Messages look like `EMAIL_EXISTS` or
/// `WEAK_PASSWORD : Password should be at least 6 characters`.
fn map_auth_error(body: &str) -> AuthError {
    let (_, message) = error_details(body);
    let (code, detail) = message.split_once(" : ").unwrap_or((&message, ""));

    match code.trim() {
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_CREDENTIAL" => {
            AuthError::InvalidCredential
        }
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => AuthError::UserNotFound,
        "EMAIL_EXISTS" => AuthError::EmailInUse,
        "WEAK_PASSWORD" => AuthError::WeakPassword(detail.to_string()),
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail,
        "USER_DISABLED" => AuthError::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyAttempts,
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" => AuthError::NotSignedIn,
        _ => AuthError::Provider(message.clone()),
    }
}
