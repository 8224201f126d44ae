//! Token issuance engine: the password, refresh_token and client_credentials
//! grants, access-token validation and refresh-token revocation.
//!
//! The engine holds no locks. Refresh rotation is made single-use by the
//! token store's atomic delete: of two concurrent refreshes with the same
//! token only one observes a successful delete, the other fails with
//! `InvalidGrant`.

use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::config::{MongoConfig, OAuthConfig};
use crate::dtos::oauth::{TokenRequest, TokenResponse};
use crate::models::{Client, GrantType, Subject, TokenPair};
use crate::services::error::AccessError;
use crate::services::jwt::{AccessTokenClaims, JwtService};
use crate::services::stores::{with_deadline, ClientRegistry, CredentialVerifier, TokenStore};
use crate::utils::{generate_refresh_token, Password};

/// Role claim carried by client-credentials tokens.
pub const CLIENT_ROLE: &str = "client";

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub store_deadline: StdDuration,
}

impl OAuthSettings {
    pub fn from_config(oauth: &OAuthConfig, mongodb: &MongoConfig) -> Result<Self, AppError> {
        let access_ttl = Duration::try_minutes(oauth.access_token_expiry_minutes).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("ACCESS_TOKEN_EXPIRY_MINUTES is out of range"))
        })?;
        let refresh_ttl = Duration::try_hours(oauth.refresh_token_expiry_hours).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("REFRESH_TOKEN_EXPIRY_HOURS is out of range"))
        })?;

        Ok(Self {
            access_ttl,
            refresh_ttl,
            store_deadline: StdDuration::from_secs(mongodb.timeout_seconds),
        })
    }
}

/// Outcome of a successful access-token validation.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    /// `None` for client-credentials tokens.
    pub subject_id: Option<String>,
    pub client_id: String,
    pub role: String,
    pub scopes: Vec<String>,
    pub claims: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone)]
pub struct TokenEngine {
    clients: Arc<dyn ClientRegistry>,
    tokens: Arc<dyn TokenStore>,
    subjects: Arc<dyn CredentialVerifier>,
    jwt: JwtService,
    settings: OAuthSettings,
}

impl TokenEngine {
    pub fn new(
        clients: Arc<dyn ClientRegistry>,
        tokens: Arc<dyn TokenStore>,
        subjects: Arc<dyn CredentialVerifier>,
        jwt: JwtService,
        settings: OAuthSettings,
    ) -> Self {
        Self {
            clients,
            tokens,
            subjects,
            jwt,
            settings,
        }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(client_id = %request.client_id, grant_type = %request.grant_type)
    )]
    pub async fn issue_token(&self, request: TokenRequest) -> Result<TokenResponse, AccessError> {
        let grant_label = request.grant_type.clone();
        let result = self.dispatch(request).await;

        match &result {
            Ok(_) => {
                metrics::counter!("oauth_tokens_issued_total", "grant_type" => grant_label)
                    .increment(1);
            }
            Err(e) => {
                tracing::warn!(reason = e.code(), "Token request rejected");
                metrics::counter!("oauth_grant_failures_total", "reason" => e.code())
                    .increment(1);
            }
        }

        result
    }

    async fn dispatch(&self, request: TokenRequest) -> Result<TokenResponse, AccessError> {
        let client = self
            .within(
                self.clients
                    .authenticate(&request.client_id, &request.client_secret),
            )
            .await?
            .ok_or(AccessError::InvalidClient)?;

        let grant: GrantType = request
            .grant_type
            .parse()
            .map_err(|_| AccessError::UnsupportedGrant)?;
        if !client.allows_grant(grant) {
            return Err(AccessError::UnsupportedGrant);
        }

        let requested = parse_scope(request.scope.as_deref());

        match grant {
            GrantType::Password => {
                let username = required(request.username, "username")?;
                let password = Password::new(required(request.password, "password")?);
                self.password_grant(&client, &username, &password, &requested)
                    .await
            }
            GrantType::RefreshToken => {
                let refresh_token = required(request.refresh_token, "refresh_token")?;
                self.refresh_grant(&client, &refresh_token, &requested).await
            }
            GrantType::ClientCredentials => {
                self.client_credentials_grant(&client, &requested).await
            }
        }
    }

    async fn password_grant(
        &self,
        client: &Client,
        username: &str,
        password: &Password,
        requested: &[String],
    ) -> Result<TokenResponse, AccessError> {
        let subject = self
            .within(self.subjects.verify(username, password))
            .await?
            .ok_or(AccessError::InvalidCredentials)?;

        if !subject.is_active() {
            return Err(AccessError::InactiveSubject);
        }

        let scopes = grant_scope(requested, &client.scopes);
        let pair = self.mint(client, Some(&subject), scopes, true)?;
        self.within(self.tokens.insert_pair(pair.clone())).await?;
        self.repoint_subject(&subject.id, &pair, None).await?;

        tracing::info!(subject_id = %subject.id, client_id = %client.client_id, "Password grant issued");
        Ok(self.response(&pair))
    }

    async fn refresh_grant(
        &self,
        client: &Client,
        refresh_token: &str,
        requested: &[String],
    ) -> Result<TokenResponse, AccessError> {
        let stored = self
            .within(self.tokens.find_by_refresh_token(refresh_token))
            .await?
            .ok_or(AccessError::InvalidGrant)?;

        if stored.is_refresh_expired(Utc::now()) {
            return Err(AccessError::ExpiredGrant);
        }

        if stored.client_id != client.client_id {
            tracing::warn!(
                client_id = %client.client_id,
                "Refresh token presented by a client it was not issued to"
            );
            return Err(AccessError::ClientMismatch);
        }

        let subject = match &stored.subject_id {
            Some(subject_id) => {
                let subject = self
                    .within(self.subjects.find_subject(subject_id))
                    .await?
                    .ok_or(AccessError::InvalidGrant)?;
                if !subject.is_active() {
                    return Err(AccessError::InactiveSubject);
                }
                Some(subject)
            }
            None => None,
        };

        if !self
            .within(self.tokens.delete_by_refresh_token(refresh_token))
            .await?
        {
            // Another request rotated this token first.
            return Err(AccessError::InvalidGrant);
        }

        let scopes = refresh_scope(requested, &client.scopes, &stored.scopes);
        let pair = self.mint(client, subject.as_ref(), scopes, true)?;
        self.within(self.tokens.insert_pair(pair.clone())).await?;

        if let Some(subject) = &subject {
            self.repoint_subject(&subject.id, &pair, Some(refresh_token))
                .await?;
        }

        tracing::info!(client_id = %client.client_id, "Refresh token rotated");
        Ok(self.response(&pair))
    }

    async fn client_credentials_grant(
        &self,
        client: &Client,
        requested: &[String],
    ) -> Result<TokenResponse, AccessError> {
        let scopes = grant_scope(requested, &client.scopes);
        let pair = self.mint(client, None, scopes, false)?;
        self.within(self.tokens.insert_pair(pair.clone())).await?;

        tracing::info!(client_id = %client.client_id, "Client credentials grant issued");
        Ok(self.response(&pair))
    }

    /// Point the subject at the pair's refresh token and revoke whatever it
    /// held before, so each subject keeps at most one live refresh token.
    /// `rotated` is the token this issuance replaced, already deleted.
    async fn repoint_subject(
        &self,
        subject_id: &str,
        pair: &TokenPair,
        rotated: Option<&str>,
    ) -> Result<(), AccessError> {
        let previous = self
            .within(
                self.subjects
                    .swap_refresh_token(subject_id, pair.refresh_token.as_deref()),
            )
            .await?;

        if let Some(previous) = previous {
            let superseded =
                Some(previous.as_str()) != pair.refresh_token.as_deref() && Some(previous.as_str()) != rotated;
            if superseded {
                let revoked = self
                    .within(self.tokens.delete_by_refresh_token(&previous))
                    .await?;
                tracing::debug!(subject_id = %subject_id, revoked, "Superseded refresh token revoked");
            }
        }
        Ok(())
    }

    fn mint(
        &self,
        client: &Client,
        subject: Option<&Subject>,
        scopes: Vec<String>,
        with_refresh: bool,
    ) -> Result<TokenPair, AccessError> {
        let issued_at = Utc::now();
        let access_expires_at = issued_at + self.settings.access_ttl;

        let role = match subject {
            Some(subject) => subject.role.clone().unwrap_or_default(),
            None => CLIENT_ROLE.to_string(),
        };

        let claims = AccessTokenClaims {
            sub: subject.map(|s| s.id.clone()).unwrap_or_default(),
            client_id: client.client_id.clone(),
            role,
            scopes: scopes.clone(),
            exp: access_expires_at.timestamp(),
            iat: issued_at.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let access_token = self.jwt.sign(&claims)?;

        let (refresh_token, refresh_expires_at) = if with_refresh {
            (
                Some(generate_refresh_token()),
                Some(refresh_expiry(
                    issued_at,
                    access_expires_at,
                    self.settings.refresh_ttl,
                )),
            )
        } else {
            (None, None)
        };

        Ok(TokenPair {
            access_token,
            refresh_token,
            subject_id: subject.map(|s| s.id.clone()),
            client_id: client.client_id.clone(),
            scopes,
            access_expires_at,
            refresh_expires_at,
            issued_at,
        })
    }

    fn response(&self, pair: &TokenPair) -> TokenResponse {
        TokenResponse {
            access_token: pair.access_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: (pair.access_expires_at - pair.issued_at).num_seconds(),
            refresh_token: pair.refresh_token.clone(),
            scope: (!pair.scopes.is_empty()).then(|| pair.scopes.join(" ")),
        }
    }

    /// Both the token store and the signature must accept the token: the
    /// store lookup makes revocation effective for tokens whose signature is
    /// still valid.
    #[tracing::instrument(skip_all)]
    pub async fn validate_access_token(&self, token: &str) -> Result<ValidatedToken, AccessError> {
        let pair = self
            .within(self.tokens.find_by_access_token(token))
            .await?
            .ok_or(AccessError::InvalidToken)?;

        if pair.is_access_expired(Utc::now()) {
            return Err(AccessError::ExpiredToken);
        }

        let claims = self.jwt.verify(token)?;
        if claims.client_id != pair.client_id {
            return Err(AccessError::InvalidToken);
        }

        let claim_map = match serde_json::to_value(&claims) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => {
                return Err(AccessError::Internal(anyhow::anyhow!(
                    "Access token claims did not serialize to an object"
                )))
            }
        };

        Ok(ValidatedToken {
            subject_id: pair.subject_id,
            client_id: claims.client_id,
            role: claims.role,
            scopes: claims.scopes,
            claims: claim_map,
        })
    }

    /// Idempotent: an unknown or already revoked token is not an error.
    #[tracing::instrument(skip_all)]
    pub async fn revoke_token(&self, refresh_token: &str) -> Result<(), AccessError> {
        let removed = self
            .within(self.tokens.delete_by_refresh_token(refresh_token))
            .await?;

        // The pointer is advisory; the pair is already gone.
        if let Err(e) = self
            .within(self.subjects.clear_refresh_token(refresh_token))
            .await
        {
            tracing::warn!(error = %e, "Failed to clear subject refresh pointer");
        }

        tracing::info!(removed, "Refresh token revoked");
        Ok(())
    }

    async fn within<T, F>(&self, op: F) -> Result<T, AccessError>
    where
        F: std::future::Future<Output = crate::services::stores::StoreResult<T>>,
    {
        with_deadline(self.settings.store_deadline, op).await
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AccessError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AccessError::InvalidRequest(format!("{} is required", field)))
}

/// Refresh tokens never expire before the access token they are paired with.
fn refresh_expiry(
    issued_at: DateTime<Utc>,
    access_expires_at: DateTime<Utc>,
    refresh_ttl: Duration,
) -> DateTime<Utc> {
    (issued_at + refresh_ttl).max(access_expires_at)
}

/// Split a space-delimited scope string, dropping empties and repeats.
pub fn parse_scope(raw: Option<&str>) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for tag in raw.unwrap_or_default().split_ascii_whitespace() {
        if !scopes.iter().any(|s| s == tag) {
            scopes.push(tag.to_string());
        }
    }
    scopes
}

fn intersect(requested: &[String], allowed: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|scope| allowed.contains(scope))
        .cloned()
        .collect()
}

/// Requested scopes the client may hold; if none survive, everything the
/// client may hold. Never more than the client's allowance.
pub fn grant_scope(requested: &[String], allowed: &[String]) -> Vec<String> {
    let granted = intersect(requested, allowed);
    if granted.is_empty() {
        allowed.to_vec()
    } else {
        granted
    }
}

/// A refresh keeps the original scope unless a non-empty narrower subset is
/// requested. Scopes the client has since lost are dropped.
pub fn refresh_scope(requested: &[String], allowed: &[String], original: &[String]) -> Vec<String> {
    let base = intersect(original, allowed);
    let narrowed = intersect(requested, &base);
    if narrowed.is_empty() {
        base
    } else {
        narrowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Client, Subject, SubjectStatus};
    use crate::services::stores::{InMemoryStore, SubjectUpdate};
    use crate::utils::{hash_password, Password};
    use secrecy::SecretString;

    fn scopes(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        engine: TokenEngine,
        subject_id: String,
    }

    async fn fixture(grants: Vec<GrantType>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let secret_hash = hash_password(&Password::new("s1")).unwrap().into_string();
        store
            .insert_client(Client::new(
                "c1".to_string(),
                secret_hash,
                "Test client".to_string(),
                vec![],
                grants,
                scopes(&["read", "write"]),
            ))
            .await
            .unwrap();

        let password_hash = hash_password(&Password::new("p1")).unwrap().into_string();
        let subject = Subject::new("u1".to_string(), password_hash, Some("admin".to_string()));
        let subject_id = subject.id.clone();
        store.insert_subject(subject).await.unwrap();

        let engine = TokenEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            JwtService::new(&SecretString::new("engine-test-secret-with-enough-bytes".into())),
            OAuthSettings {
                access_ttl: Duration::minutes(120),
                refresh_ttl: Duration::hours(168),
                store_deadline: StdDuration::from_secs(5),
            },
        );

        Fixture {
            store,
            engine,
            subject_id,
        }
    }

    fn all_grants() -> Vec<GrantType> {
        vec![
            GrantType::Password,
            GrantType::RefreshToken,
            GrantType::ClientCredentials,
        ]
    }

    fn password_request() -> TokenRequest {
        TokenRequest::new("password", "c1", "s1").with_credentials("u1", "p1")
    }

    #[test]
    fn test_parse_scope_dedupes() {
        assert_eq!(parse_scope(Some(" read  write read ")), scopes(&["read", "write"]));
        assert!(parse_scope(None).is_empty());
    }

    #[test]
    fn test_grant_scope_never_escalates() {
        let allowed = scopes(&["read", "write"]);
        assert_eq!(grant_scope(&scopes(&["write", "admin"]), &allowed), scopes(&["write"]));
        assert_eq!(grant_scope(&scopes(&["admin"]), &allowed), allowed);
        assert_eq!(grant_scope(&[], &allowed), allowed);
    }

    #[test]
    fn test_refresh_scope_only_narrows() {
        let allowed = scopes(&["read", "write", "admin"]);
        let original = scopes(&["read", "write"]);
        assert_eq!(refresh_scope(&scopes(&["read"]), &allowed, &original), scopes(&["read"]));
        // "admin" is allowed for the client but was never granted on this token.
        assert_eq!(refresh_scope(&scopes(&["admin"]), &allowed, &original), original);
        assert_eq!(refresh_scope(&[], &allowed, &original), original);
    }

    #[test]
    fn test_refresh_expiry_covers_access_expiry() {
        let now = Utc::now();
        let access = now + Duration::hours(3);
        assert_eq!(refresh_expiry(now, access, Duration::hours(1)), access);
        assert_eq!(
            refresh_expiry(now, access, Duration::hours(5)),
            now + Duration::hours(5)
        );
    }

    #[tokio::test]
    async fn test_password_grant_validates_to_subject() {
        let fx = fixture(all_grants()).await;
        let response = fx.engine.issue_token(password_request()).await.unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 120 * 60);
        assert_eq!(response.scope.as_deref(), Some("read write"));
        assert!(response.refresh_token.is_some());

        let validated = fx
            .engine
            .validate_access_token(&response.access_token)
            .await
            .unwrap();
        assert_eq!(validated.subject_id.as_deref(), Some(fx.subject_id.as_str()));
        assert_eq!(validated.role, "admin");
        assert_eq!(validated.claims["sub"], fx.subject_id.as_str());
    }

    #[tokio::test]
    async fn test_wrong_client_secret_is_invalid_client() {
        let fx = fixture(all_grants()).await;
        let request = TokenRequest::new("password", "c1", "wrong").with_credentials("u1", "p1");
        assert!(matches!(
            fx.engine.issue_token(request).await,
            Err(AccessError::InvalidClient)
        ));
    }

    #[tokio::test]
    async fn test_grant_not_allowed_for_client() {
        let fx = fixture(vec![GrantType::Password]).await;
        let request = TokenRequest::new("client_credentials", "c1", "s1");
        assert!(matches!(
            fx.engine.issue_token(request).await,
            Err(AccessError::UnsupportedGrant)
        ));

        let request = TokenRequest::new("authorization_code", "c1", "s1");
        assert!(matches!(
            fx.engine.issue_token(request).await,
            Err(AccessError::UnsupportedGrant)
        ));
    }

    #[tokio::test]
    async fn test_bad_password_and_inactive_subject() {
        let fx = fixture(all_grants()).await;
        let request = TokenRequest::new("password", "c1", "s1").with_credentials("u1", "nope");
        assert!(matches!(
            fx.engine.issue_token(request).await,
            Err(AccessError::InvalidCredentials)
        ));

        let hash = hash_password(&Password::new("p2")).unwrap().into_string();
        let mut inactive = Subject::new("u2".to_string(), hash, None);
        inactive.status = SubjectStatus::Inactive;
        fx.store.insert_subject(inactive).await.unwrap();

        let request = TokenRequest::new("password", "c1", "s1").with_credentials("u2", "p2");
        assert!(matches!(
            fx.engine.issue_token(request).await,
            Err(AccessError::InactiveSubject)
        ));
    }

    #[tokio::test]
    async fn test_missing_password_is_invalid_request() {
        let fx = fixture(all_grants()).await;
        let mut request = TokenRequest::new("password", "c1", "s1");
        request.username = Some("u1".to_string());
        assert!(matches!(
            fx.engine.issue_token(request).await,
            Err(AccessError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_invalidates_old_pair() {
        let fx = fixture(all_grants()).await;
        let first = fx.engine.issue_token(password_request()).await.unwrap();
        let old_refresh = first.refresh_token.clone().unwrap();

        let second = fx
            .engine
            .issue_token(TokenRequest::new("refresh_token", "c1", "s1").with_refresh_token(&old_refresh))
            .await
            .unwrap();

        assert_ne!(second.access_token, first.access_token);
        assert_ne!(second.refresh_token.as_deref(), Some(old_refresh.as_str()));
        assert_eq!(second.scope.as_deref(), Some("read write"));

        assert!(matches!(
            fx.engine.validate_access_token(&first.access_token).await,
            Err(AccessError::InvalidToken)
        ));
        let replay = fx
            .engine
            .issue_token(TokenRequest::new("refresh_token", "c1", "s1").with_refresh_token(&old_refresh))
            .await;
        assert!(matches!(replay, Err(AccessError::InvalidGrant)));
        assert!(fx
            .engine
            .validate_access_token(&second.access_token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_winner() {
        let fx = fixture(all_grants()).await;
        let issued = fx.engine.issue_token(password_request()).await.unwrap();
        let refresh = issued.refresh_token.unwrap();

        let request = TokenRequest::new("refresh_token", "c1", "s1").with_refresh_token(&refresh);
        let (a, b) = tokio::join!(
            fx.engine.issue_token(request.clone()),
            fx.engine.issue_token(request)
        );

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(AccessError::InvalidGrant)));
    }

    #[tokio::test]
    async fn test_new_login_revokes_previous_refresh_token() {
        let fx = fixture(all_grants()).await;
        let first = fx.engine.issue_token(password_request()).await.unwrap();
        let second = fx.engine.issue_token(password_request()).await.unwrap();

        let stale = fx
            .engine
            .issue_token(
                TokenRequest::new("refresh_token", "c1", "s1")
                    .with_refresh_token(first.refresh_token.as_deref().unwrap()),
            )
            .await;
        assert!(matches!(stale, Err(AccessError::InvalidGrant)));

        let current = fx.store.find_subject(&fx.subject_id).await.unwrap().unwrap();
        assert_eq!(current.refresh_token, second.refresh_token);
    }

    #[tokio::test]
    async fn test_refresh_rechecks_subject_status() {
        for status in [SubjectStatus::Inactive, SubjectStatus::Archived] {
            let fx = fixture(all_grants()).await;
            let issued = fx.engine.issue_token(password_request()).await.unwrap();
            let refresh = issued.refresh_token.unwrap();

            fx.store
                .update_subject(
                    &fx.subject_id,
                    SubjectUpdate {
                        status: Some(status),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();

            let result = fx
                .engine
                .issue_token(TokenRequest::new("refresh_token", "c1", "s1").with_refresh_token(&refresh))
                .await;
            assert!(matches!(result, Err(AccessError::InactiveSubject)));

            // Rejected before rotation: the pair is still stored.
            assert!(fx.store.find_by_refresh_token(&refresh).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_refresh_for_removed_subject_is_invalid_grant() {
        let fx = fixture(all_grants()).await;
        let issued = fx.engine.issue_token(password_request()).await.unwrap();
        let refresh = issued.refresh_token.unwrap();

        assert!(fx.store.delete_subject(&fx.subject_id).await.unwrap());

        let result = fx
            .engine
            .issue_token(TokenRequest::new("refresh_token", "c1", "s1").with_refresh_token(&refresh))
            .await;
        assert!(matches!(result, Err(AccessError::InvalidGrant)));
        assert!(fx.store.find_by_refresh_token(&refresh).await.unwrap().is_some());
        assert_eq!(fx.store.token_count(), 1);
    }

    #[test]
    fn test_settings_reject_out_of_range_expiry() {
        let mongodb = MongoConfig {
            uri: "mongodb://unused".to_string(),
            database: "unused".to_string(),
            timeout_seconds: 5,
        };
        let mut oauth = OAuthConfig {
            jwt_secret: SecretString::new("x".repeat(32)),
            access_token_expiry_minutes: 120,
            refresh_token_expiry_hours: i64::MAX,
        };
        assert!(OAuthSettings::from_config(&oauth, &mongodb).is_err());

        oauth.refresh_token_expiry_hours = 168;
        let settings = OAuthSettings::from_config(&oauth, &mongodb).unwrap();
        assert_eq!(settings.access_ttl, Duration::minutes(120));
        assert_eq!(settings.refresh_ttl, Duration::hours(168));
    }

    #[tokio::test]
    async fn test_expired_refresh_token() {
        let fx = fixture(all_grants()).await;
        let past = Utc::now() - Duration::hours(2);
        fx.store
            .insert_pair(TokenPair {
                access_token: "expired-at".to_string(),
                refresh_token: Some("expired-rt".to_string()),
                subject_id: Some(fx.subject_id.clone()),
                client_id: "c1".to_string(),
                scopes: scopes(&["read"]),
                access_expires_at: past,
                refresh_expires_at: Some(past + Duration::minutes(30)),
                issued_at: past - Duration::hours(1),
            })
            .await
            .unwrap();

        let result = fx
            .engine
            .issue_token(TokenRequest::new("refresh_token", "c1", "s1").with_refresh_token("expired-rt"))
            .await;
        assert!(matches!(result, Err(AccessError::ExpiredGrant)));

        assert!(matches!(
            fx.engine.validate_access_token("expired-at").await,
            Err(AccessError::ExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_by_other_client_is_mismatch() {
        let fx = fixture(all_grants()).await;
        let issued = fx.engine.issue_token(password_request()).await.unwrap();

        let hash = hash_password(&Password::new("s2")).unwrap().into_string();
        fx.store
            .insert_client(Client::new(
                "c2".to_string(),
                hash,
                "Other".to_string(),
                vec![],
                all_grants(),
                scopes(&["read"]),
            ))
            .await
            .unwrap();

        let result = fx
            .engine
            .issue_token(
                TokenRequest::new("refresh_token", "c2", "s2")
                    .with_refresh_token(issued.refresh_token.as_deref().unwrap()),
            )
            .await;
        assert!(matches!(result, Err(AccessError::ClientMismatch)));
    }

    #[tokio::test]
    async fn test_client_credentials_has_no_refresh_token() {
        let fx = fixture(all_grants()).await;
        let response = fx
            .engine
            .issue_token(TokenRequest::new("client_credentials", "c1", "s1").with_scope("read"))
            .await
            .unwrap();

        assert!(response.refresh_token.is_none());
        assert_eq!(response.scope.as_deref(), Some("read"));

        let validated = fx
            .engine
            .validate_access_token(&response.access_token)
            .await
            .unwrap();
        assert!(validated.subject_id.is_none());
        assert_eq!(validated.role, CLIENT_ROLE);
    }

    #[tokio::test]
    async fn test_revoke_invalidates_pair_and_is_idempotent() {
        let fx = fixture(all_grants()).await;
        let issued = fx.engine.issue_token(password_request()).await.unwrap();
        let refresh = issued.refresh_token.unwrap();

        fx.engine.revoke_token(&refresh).await.unwrap();
        fx.engine.revoke_token(&refresh).await.unwrap();
        fx.engine.revoke_token("never-issued").await.unwrap();

        assert!(matches!(
            fx.engine.validate_access_token(&issued.access_token).await,
            Err(AccessError::InvalidToken)
        ));
        let current = fx.store.find_subject(&fx.subject_id).await.unwrap().unwrap();
        assert!(current.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_store_outage_and_slowness_fail_closed() {
        let fx = fixture(all_grants()).await;
        let issued = fx.engine.issue_token(password_request()).await.unwrap();

        fx.store.set_unavailable(true);
        assert!(matches!(
            fx.engine.validate_access_token(&issued.access_token).await,
            Err(AccessError::StoreUnavailable(_))
        ));
        fx.store.set_unavailable(false);

        let slow = TokenEngine {
            settings: OAuthSettings {
                store_deadline: StdDuration::from_millis(20),
                ..fx.engine.settings.clone()
            },
            ..fx.engine.clone()
        };
        fx.store.set_latency(StdDuration::from_millis(200));
        assert!(matches!(
            slow.validate_access_token(&issued.access_token).await,
            Err(AccessError::Timeout(_))
        ));
    }
}
