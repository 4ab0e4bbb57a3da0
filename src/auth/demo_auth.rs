use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::identity::{IdentityClaims, IdentityProvider};
use crate::auth::models::Role;
use crate::error::AppError;

/// Built-in demo account definition.
#[derive(Debug, Clone)]
struct DemoUser {
    username: &'static str,
    password: &'static str,
    display_name: &'static str,
    role: Role,
}

/// The hard-coded demo accounts available when `demo_mode` is on.
const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        username: "admin",
        password: "admin",
        display_name: "Demo Admin",
        role: Role::Admin,
    },
    DemoUser {
        username: "editor",
        password: "editor",
        display_name: "Demo Editor",
        role: Role::Editor,
    },
    DemoUser {
        username: "moderator",
        password: "moderator",
        display_name: "Demo Moderator",
        role: Role::Moderator,
    },
];

const ID_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// A seeded demo account, as needed to create its user record.
#[derive(Debug, Clone)]
pub struct DemoAccount {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// Enumerate the built-in demo accounts.
pub fn demo_accounts() -> Vec<DemoAccount> {
    DEMO_USERS
        .iter()
        .map(|u| DemoAccount {
            uid: format!("demo-{}", u.username),
            email: format!("{}@demo.local", u.username),
            display_name: u.display_name.to_string(),
            role: u.role,
        })
        .collect()
}

#[derive(Debug, Clone)]
struct StoredAccount {
    uid: String,
    password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TokenKind {
    Id,
    Session,
}

#[derive(Debug, Serialize, Deserialize)]
struct DemoClaims {
    sub: String,
    email: String,
    kind: TokenKind,
    iat: i64,
    exp: i64,
}

/// Stand-in identity platform for local runs and tests.
///
/// Accounts live in memory and tokens are HS256 JWTs signed with a
/// process-local secret.
pub struct DemoIdentityProvider {
    secret: Vec<u8>,
    /// Email → account.
    accounts: Mutex<HashMap<String, StoredAccount>>,
}

impl DemoIdentityProvider {
    /// Create a provider seeded with the built-in demo accounts.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        let accounts = DEMO_USERS
            .iter()
            .map(|u| {
                (
                    format!("{}@demo.local", u.username),
                    StoredAccount {
                        uid: format!("demo-{}", u.username),
                        password: u.password.to_string(),
                    },
                )
            })
            .collect();

        Self {
            secret: secret.into(),
            accounts: Mutex::new(accounts),
        }
    }

    fn issue(
        &self,
        kind: TokenKind,
        uid: &str,
        email: &str,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = DemoClaims {
            sub: uid.to_string(),
            email: email.to_string(),
            kind,
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<DemoClaims, AppError> {
        let data = decode::<DemoClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| AppError::Auth(format!("Invalid token: {e}")))?;

        if data.claims.kind != kind {
            return Err(AppError::Auth("Wrong token type".into()));
        }

        Ok(data.claims)
    }
}

#[async_trait]
impl IdentityProvider for DemoIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, AppError> {
        let email = email.trim().to_lowercase();
        let uid = {
            let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
            accounts
                .get(&email)
                .filter(|a| a.password == password)
                .map(|a| a.uid.clone())
        }
        .ok_or_else(|| AppError::Auth("Invalid email or password".into()))?;

        self.issue(TokenKind::Id, &uid, &email, ID_TOKEN_TTL)
    }

    async fn create_session_cookie(
        &self,
        id_token: &str,
        valid_for: Duration,
    ) -> Result<String, AppError> {
        let claims = self.verify(id_token, TokenKind::Id)?;
        self.issue(TokenKind::Session, &claims.sub, &claims.email, valid_for)
    }

    async fn verify_session_cookie(
        &self,
        session_cookie: &str,
    ) -> Result<IdentityClaims, AppError> {
        let claims = self.verify(session_cookie, TokenKind::Session)?;
        Ok(IdentityClaims {
            uid: claims.sub,
            email: Some(claims.email),
        })
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        _display_name: &str,
    ) -> Result<String, AppError> {
        let email = email.trim().to_lowercase();
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        if accounts.contains_key(&email) {
            return Err(AppError::BadRequest("Email is already registered".into()));
        }

        let uid = uuid::Uuid::new_v4().simple().to_string();
        accounts.insert(
            email,
            StoredAccount {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        Ok(uid)
    }

    async fn delete_account(&self, uid: &str) -> Result<(), AppError> {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        let before = accounts.len();
        accounts.retain(|_, a| a.uid != uid);
        if accounts.len() == before {
            return Err(AppError::NotFound(format!("Account '{uid}' not found")));
        }
        Ok(())
    }
}
