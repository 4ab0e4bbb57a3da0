use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AppError;

/// Identity asserted by a verified session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub uid: String,
    pub email: Option<String>,
}

/// The managed identity platform.
///
/// Password checks, token issuance and session cookie signing all happen on
/// the platform side; this trait only carries the calls the dashboard makes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange email/password for a short-lived ID token.
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<String, AppError>;

    /// Exchange an ID token for a session cookie valid for `valid_for`.
    async fn create_session_cookie(
        &self,
        id_token: &str,
        valid_for: Duration,
    ) -> Result<String, AppError>;

    /// Verify a session cookie and return the identity it carries.
    async fn verify_session_cookie(&self, session_cookie: &str)
        -> Result<IdentityClaims, AppError>;

    /// Create an account and return its uid.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<String, AppError>;

    async fn delete_account(&self, uid: &str) -> Result<(), AppError>;
}

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SESSION_KEYS_URL: &str =
    "https://www.googleapis.com/identitytoolkit/v3/relyingparty/publicKeys";
const ADMIN_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];
const KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Firebase Authentication (Identity Toolkit) over its REST API.
///
/// Privileged calls are authorised with the ambient Google service account
/// credentials (`GOOGLE_APPLICATION_CREDENTIALS` or the metadata server).
pub struct FirebaseIdentityProvider {
    http: reqwest::Client,
    project_id: String,
    api_key: String,
    token_provider: Arc<dyn gcp_auth::TokenProvider>,
    signing_keys: RwLock<Option<CachedKeys>>,
}

struct CachedKeys {
    fetched_at: Instant,
    /// Key id → PEM-encoded x509 certificate.
    certificates: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionCookieResponse {
    session_cookie: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccountResponse {
    local_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionCookieClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    exp: i64,
}

impl FirebaseIdentityProvider {
    pub async fn new(project_id: String, api_key: String) -> Result<Self, AppError> {
        let token_provider = gcp_auth::provider()
            .await
            .map_err(|e| AppError::Auth(format!("Failed to load service account credentials: {e}")))?;

        Ok(Self {
            http: reqwest::Client::new(),
            project_id,
            api_key,
            token_provider,
            signing_keys: RwLock::new(None),
        })
    }

    fn session_issuer(&self) -> String {
        format!("https://session.firebase.google.com/{}", self.project_id)
    }

    async fn bearer_token(&self) -> Result<String, AppError> {
        let token = self
            .token_provider
            .token(ADMIN_SCOPES)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to obtain access token: {e}")))?;
        Ok(token.as_str().to_string())
    }

    /// Post `body` to `url` and decode the JSON reply.
    ///
    /// Platform errors come back as `Err(Ok(code))` so callers can map the
    /// ones they expect; transport failures are `Err(Err(_))`.
    async fn call<T: DeserializeOwned>(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: serde_json::Value,
    ) -> Result<T, Result<String, AppError>> {
        let mut request = self.http.post(url).json(&body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            Err(AppError::Internal(format!("Identity platform unreachable: {e}")))
        })?;

        if response.status().is_success() {
            return response.json::<T>().await.map_err(|e| {
                Err(AppError::Internal(format!(
                    "Unexpected identity platform response: {e}"
                )))
            });
        }

        let status = response.status();
        match response.json::<ApiErrorBody>().await {
            Ok(body) => Err(Ok(body.error.message)),
            Err(_) => Err(Err(AppError::Internal(format!(
                "Identity platform returned HTTP {status}"
            )))),
        }
    }

    async fn certificates(&self, force_refresh: bool) -> Result<HashMap<String, String>, AppError> {
        if !force_refresh {
            let cached = self.signing_keys.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.fetched_at.elapsed() < KEY_CACHE_TTL {
                    return Ok(cached.certificates.clone());
                }
            }
        }

        let certificates: HashMap<String, String> = self
            .http
            .get(SESSION_KEYS_URL)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch session keys: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::Internal(format!("Failed to fetch session keys: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Malformed session keys: {e}")))?;

        tracing::debug!(count = certificates.len(), "refreshed session cookie signing keys");

        *self.signing_keys.write().await = Some(CachedKeys {
            fetched_at: Instant::now(),
            certificates: certificates.clone(),
        });

        Ok(certificates)
    }
}

/// Error codes that mean "the caller gave us bad credentials".
fn is_credential_error(code: &str) -> bool {
    // Codes may carry a suffix, e.g. "WEAK_PASSWORD : Password should be ..."
    let code = code.split(':').next().unwrap_or(code).trim();
    matches!(
        code,
        "EMAIL_NOT_FOUND"
            | "INVALID_PASSWORD"
            | "INVALID_LOGIN_CREDENTIALS"
            | "USER_DISABLED"
            | "INVALID_EMAIL"
            | "INVALID_ID_TOKEN"
            | "TOKEN_EXPIRED"
            | "USER_NOT_FOUND"
    )
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, AppError> {
        let url = format!(
            "{IDENTITY_TOOLKIT_URL}/accounts:signInWithPassword?key={}",
            self.api_key
        );
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });

        match self.call::<SignInResponse>(&url, None, body).await {
            Ok(resp) => Ok(resp.id_token),
            Err(Ok(code)) if is_credential_error(&code) => {
                Err(AppError::Auth("Invalid email or password".into()))
            }
            Err(Ok(code)) => Err(AppError::Internal(format!("Sign-in failed: {code}"))),
            Err(Err(e)) => Err(e),
        }
    }

    async fn create_session_cookie(
        &self,
        id_token: &str,
        valid_for: Duration,
    ) -> Result<String, AppError> {
        let bearer = self.bearer_token().await?;
        let url = format!(
            "{IDENTITY_TOOLKIT_URL}/projects/{}:createSessionCookie",
            self.project_id
        );
        let body = serde_json::json!({
            "idToken": id_token,
            "validDuration": valid_for.as_secs(),
        });

        match self
            .call::<SessionCookieResponse>(&url, Some(&bearer), body)
            .await
        {
            Ok(resp) => Ok(resp.session_cookie),
            Err(Ok(code)) if is_credential_error(&code) => {
                Err(AppError::Auth("Invalid or expired ID token".into()))
            }
            Err(Ok(code)) => Err(AppError::Internal(format!(
                "Session cookie creation failed: {code}"
            ))),
            Err(Err(e)) => Err(e),
        }
    }

    async fn verify_session_cookie(
        &self,
        session_cookie: &str,
    ) -> Result<IdentityClaims, AppError> {
        let header = decode_header(session_cookie)
            .map_err(|_| AppError::Auth("Malformed session cookie".into()))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::Auth("Session cookie has no key id".into()))?;

        let mut certificates = self.certificates(false).await?;
        if !certificates.contains_key(&kid) {
            certificates = self.certificates(true).await?;
        }
        let pem = certificates
            .get(&kid)
            .ok_or_else(|| AppError::Auth("Session cookie signed with an unknown key".into()))?;

        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::Internal(format!("Unusable signing certificate: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.session_issuer()]);

        let data = decode::<SessionCookieClaims>(session_cookie, &key, &validation)
            .map_err(|e| AppError::Auth(format!("Invalid session cookie: {e}")))?;

        if data.claims.sub.is_empty() {
            return Err(AppError::Auth("Session cookie has no subject".into()));
        }

        Ok(IdentityClaims {
            uid: data.claims.sub,
            email: data.claims.email,
        })
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<String, AppError> {
        let bearer = self.bearer_token().await?;
        let url = format!("{IDENTITY_TOOLKIT_URL}/projects/{}/accounts", self.project_id);
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "displayName": display_name,
        });

        match self
            .call::<CreateAccountResponse>(&url, Some(&bearer), body)
            .await
        {
            Ok(resp) => Ok(resp.local_id),
            Err(Ok(code)) if code.starts_with("EMAIL_EXISTS") => {
                Err(AppError::BadRequest("Email is already registered".into()))
            }
            Err(Ok(code)) if code.starts_with("WEAK_PASSWORD") || code.starts_with("INVALID_EMAIL") => {
                Err(AppError::BadRequest(code))
            }
            Err(Ok(code)) => Err(AppError::Internal(format!("Account creation failed: {code}"))),
            Err(Err(e)) => Err(e),
        }
    }

    async fn delete_account(&self, uid: &str) -> Result<(), AppError> {
        let bearer = self.bearer_token().await?;
        let url = format!(
            "{IDENTITY_TOOLKIT_URL}/projects/{}/accounts:delete",
            self.project_id
        );
        let body = serde_json::json!({ "localId": uid });

        match self
            .call::<serde_json::Value>(&url, Some(&bearer), body)
            .await
        {
            Ok(_) => Ok(()),
            Err(Ok(code)) if code.starts_with("USER_NOT_FOUND") => {
                Err(AppError::NotFound(format!("Account '{uid}' not found")))
            }
            Err(Ok(code)) => Err(AppError::Internal(format!("Account deletion failed: {code}"))),
            Err(Err(e)) => Err(e),
        }
    }
}
