use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use cms_api::{
    AppState, InMemoryRepository, InMemoryStorage,
    auth::{AuthUser, Claims, Principal, TokenIssuer, TokenKind},
    config::{AppConfig, Env},
    models::{NewUser, ProfileFields},
    repository::RepositoryState,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Signs arbitrary claims with the test secret, bypassing `TokenIssuer`.
fn forge_token(user_id: Uuid, exp: u64, token_type: TokenKind, secret: &str) -> String {
    let claims = Claims {
        sub: user_id,
        iat: now_secs() as usize,
        exp: exp as usize,
        token_type,
        jti: Uuid::new_v4(),
    };
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn issuer() -> TokenIssuer {
    TokenIssuer::new(TEST_JWT_SECRET, 300, 86_400)
}

async fn seed_user(repo: &RepositoryState, email: &str, is_admin: bool) -> Uuid {
    repo.create_user(NewUser {
        username: None,
        email: email.to_string(),
        password_hash: "unused".to_string(),
        profile: ProfileFields::default(),
        is_admin,
        is_author: true,
    })
    .await
    .unwrap()
    .id
}

fn create_app_state(env: Env, repo: RepositoryState) -> AppState {
    let mut config = AppConfig::default();
    config.env = env.clone();
    config.jwt_secret = TEST_JWT_SECRET.to_string();

    if env == Env::Production {
        config.db_url = Some("postgres://unused".to_string());
        config.s3_endpoint = "http://mock-prod-s3".to_string();
    }

    AppState {
        repo,
        storage: Arc::new(InMemoryStorage::new()),
        config,
    }
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(mut parts: Parts, token: &str) -> Parts {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    parts
}

fn with_bypass(mut parts: Parts, user_id: Uuid) -> Parts {
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user_id.to_string()).unwrap(),
    );
    parts
}

// --- TokenIssuer ---

#[test]
fn test_issued_pair_verifies_with_matching_kind() {
    let issuer = issuer();
    let user_id = Uuid::new_v4();
    let pair = issuer.issue_pair(user_id).unwrap();

    let access = issuer.verify(&pair.access, TokenKind::Access).unwrap();
    assert_eq!(access.sub, user_id);
    assert_eq!(access.exp - access.iat, 300);

    let refresh = issuer.verify(&pair.refresh, TokenKind::Refresh).unwrap();
    assert_eq!(refresh.sub, user_id);
    assert_eq!(refresh.exp - refresh.iat, 86_400);

    assert!(issuer.verify(&pair.access, TokenKind::Refresh).is_err());
    assert!(issuer.verify(&pair.refresh, TokenKind::Access).is_err());
}

#[test]
fn test_tokens_are_unique_per_issue() {
    let issuer = issuer();
    let user_id = Uuid::new_v4();
    let first = issuer.issue(user_id, TokenKind::Access).unwrap();
    let second = issuer.issue(user_id, TokenKind::Access).unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_verify_rejects_foreign_signature() {
    let token = forge_token(
        Uuid::new_v4(),
        now_secs() + 300,
        TokenKind::Access,
        "some-other-secret",
    );
    let err = issuer().verify(&token, TokenKind::Access).unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_verify_rejects_expired_token() {
    // Past the default 60 second leeway.
    let token = forge_token(Uuid::new_v4(), now_secs() - 600, TokenKind::Access, TEST_JWT_SECRET);
    let err = issuer().verify(&token, TokenKind::Access).unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(err.to_string(), "token has expired");
}

// --- AuthUser Extractor ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let repo: RepositoryState = Arc::new(InMemoryRepository::new());
    let user_id = seed_user(&repo, "test@example.com", true).await;
    let app_state = create_app_state(Env::Production, repo);

    let token = issuer().issue(user_id, TokenKind::Access).unwrap();
    let mut parts = with_bearer(get_request_parts(Method::GET, "/".parse().unwrap()), &token);

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(user.id, user_id);
    assert!(user.is_admin);
    assert!(user.is_author);
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, Arc::new(InMemoryRepository::new()));
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let repo: RepositoryState = Arc::new(InMemoryRepository::new());
    let user_id = seed_user(&repo, "expired@example.com", false).await;
    let app_state = create_app_state(Env::Production, repo);

    let token = forge_token(user_id, now_secs() - 600, TokenKind::Access, TEST_JWT_SECRET);
    let mut parts = with_bearer(get_request_parts(Method::GET, "/".parse().unwrap()), &token);

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_for_deleted_user() {
    let repo: RepositoryState = Arc::new(InMemoryRepository::new());
    let user_id = seed_user(&repo, "gone@example.com", false).await;
    let token = issuer().issue(user_id, TokenKind::Access).unwrap();
    repo.delete_user(user_id).await.unwrap();
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = with_bearer(get_request_parts(Method::GET, "/".parse().unwrap()), &token);
    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let repo: RepositoryState = Arc::new(InMemoryRepository::new());
    let user_id = seed_user(&repo, "local@dev.com", true).await;
    let app_state = create_app_state(Env::Local, repo);

    let mut parts = with_bypass(get_request_parts(Method::GET, "/".parse().unwrap()), user_id);
    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(user.id, user_id);
    assert!(user.is_admin);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let repo: RepositoryState = Arc::new(InMemoryRepository::new());
    let user_id = seed_user(&repo, "prod@dev.com", true).await;
    let app_state = create_app_state(Env::Production, repo);

    // Provide ONLY the local bypass header.
    let mut parts = with_bypass(get_request_parts(Method::GET, "/".parse().unwrap()), user_id);
    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

// --- Principal Extractor ---

#[tokio::test]
async fn test_principal_anonymous_without_credentials() {
    let app_state = create_app_state(Env::Production, Arc::new(InMemoryRepository::new()));
    let mut parts = get_request_parts(Method::GET, "/content-items".parse().unwrap());

    let principal = Principal::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(principal, Principal::Anonymous);
    assert!(!principal.is_admin());
}

#[tokio::test]
async fn test_principal_rejects_bad_token() {
    let app_state = create_app_state(Env::Production, Arc::new(InMemoryRepository::new()));
    let mut parts = with_bearer(
        get_request_parts(Method::GET, "/content-items".parse().unwrap()),
        "garbage",
    );

    let err = Principal::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_principal_resolves_user() {
    let repo: RepositoryState = Arc::new(InMemoryRepository::new());
    let user_id = seed_user(&repo, "someone@example.com", false).await;
    let app_state = create_app_state(Env::Production, repo);
    let token = issuer().issue(user_id, TokenKind::Access).unwrap();

    let mut parts = with_bearer(get_request_parts(Method::GET, "/".parse().unwrap()), &token);
    let principal = Principal::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(principal.user().map(|u| u.id), Some(user_id));
    assert_eq!(principal.to_string(), format!("user:{user_id}"));
}
