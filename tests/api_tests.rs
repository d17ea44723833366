use cms_api::{
    AppConfig, AppState, InMemoryRepository, InMemoryStorage, create_router,
    auth::TokenIssuer,
    models::{Category, ContentItem, TokenPair, User},
    repository::RepositoryState,
    storage::StorageState,
    stores::IdentityStore,
};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-password";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let storage = Arc::new(InMemoryStorage::new()) as StorageState;
    let config = AppConfig::default();

    IdentityStore::new(repo.clone(), TokenIssuer::from_config(&config))
        .ensure_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .expect("Failed to seed the administrator");

    let state = AppState {
        repo,
        storage,
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/users"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("register request failed")
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/token"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("token request failed")
    }

    async fn access_token(&self, email: &str, password: &str) -> String {
        let pair: TokenPair = self.login(email, password).await.json().await.unwrap();
        pair.access
    }

    /// Registers a fresh author and returns (user, access token).
    async fn author(&self, email: &str) -> (User, String) {
        let user: User = self.register(email, "author-password").await.json().await.unwrap();
        let token = self.access_token(email, "author-password").await;
        (user, token)
    }

    async fn create_category(&self, token: &str, name: &str) -> Category {
        let response = self
            .client
            .post(self.url("/categories"))
            .bearer_auth(token)
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    async fn create_content(&self, token: &str, title: &str, categories: &[Uuid]) -> ContentItem {
        let response = self
            .client
            .post(self.url("/content-items"))
            .bearer_auth(token)
            .json(&json!({
                "title": title,
                "body": "Body text",
                "summary": "Short summary",
                "categories": categories,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }
}

fn sorted(mut ids: Vec<Uuid>) -> Vec<Uuid> {
    ids.sort();
    ids
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.expect("req fail");
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let app = spawn_app().await;

    let response = app.register("short@example.com", "1234567").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");

    // No account was created.
    let login = app.login("short@example.com", "1234567").await;
    assert_eq!(login.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_defaults_and_duplicate_conflict() {
    let app = spawn_app().await;

    let response = app.register("writer@example.com", "password123").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body.get("password_hash").is_none());
    assert!(body.get("password").is_none());
    assert_eq!(body["is_author"], true);
    assert_eq!(body["is_admin"], false);

    // Email uniqueness ignores case.
    let duplicate = app.register("Writer@Example.com", "password456").await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_self_registration_cannot_pick_roles() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/users"))
        .json(&json!({ "email": "sneaky@example.com", "password": "password123", "is_admin": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // An administrator may.
    let admin_token = app.access_token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let response = app
        .client
        .post(app.url("/users"))
        .bearer_auth(&admin_token)
        .json(&json!({ "email": "reader@example.com", "password": "password123", "is_author": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let user: User = response.json().await.unwrap();
    assert!(!user.is_author);
}

#[tokio::test]
async fn test_token_issue_and_bad_password() {
    let app = spawn_app().await;
    app.register("login@example.com", "password123").await;

    let response = app.login("login@example.com", "password123").await;
    assert_eq!(response.status(), StatusCode::OK);
    let pair: TokenPair = response.json().await.unwrap();
    assert!(!pair.access.is_empty());
    assert!(!pair.refresh.is_empty());

    let response = app.login("login@example.com", "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_credentials");
    assert!(body.get("access").is_none());

    // Unknown accounts fail the same way.
    let response = app.login("nobody@example.com", "password123").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_flow() {
    let app = spawn_app().await;
    app.register("refresh@example.com", "password123").await;
    let pair: TokenPair = app
        .login("refresh@example.com", "password123")
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .client
        .post(app.url("/token/refresh"))
        .json(&json!({ "refresh": pair.refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    let access = body["access"].as_str().unwrap().to_string();

    let me = app
        .client
        .get(app.url("/users/me"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);

    // An access token is not a refresh token.
    let response = app
        .client
        .post(app.url("/token/refresh"))
        .json(&json!({ "refresh": pair.access }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // And a refresh token is not a bearer credential.
    let response = app
        .client
        .get(app.url("/users/me"))
        .bearer_auth(&pair.refresh)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_listing_requires_admin() {
    let app = spawn_app().await;
    let (_, author_token) = app.author("author@example.com").await;

    let response = app
        .client
        .get(app.url("/users"))
        .bearer_auth(&author_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let anonymous = app.client.get(app.url("/users")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let admin_token = app.access_token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let response = app
        .client
        .get(app.url("/users"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let users: Vec<User> = response.json().await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().any(|u| u.email == ADMIN_EMAIL));
    assert!(users.iter().any(|u| u.email == "author@example.com"));
}

#[tokio::test]
async fn test_profile_update_self_or_admin() {
    let app = spawn_app().await;
    let (alice, alice_token) = app.author("alice@example.com").await;
    let (bob, _) = app.author("bob@example.com").await;

    let response = app
        .client
        .patch(app.url(&format!("/users/{}", alice.id)))
        .bearer_auth(&alice_token)
        .json(&json!({ "first_name": "Alice", "city": "Dublin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: User = response.json().await.unwrap();
    assert_eq!(updated.first_name.as_deref(), Some("Alice"));
    assert_eq!(updated.email, "alice@example.com");

    // Someone else's profile.
    let response = app
        .client
        .patch(app.url(&format!("/users/{}", bob.id)))
        .bearer_auth(&alice_token)
        .json(&json!({ "first_name": "Mallory" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Self-promotion.
    let response = app
        .client
        .patch(app.url(&format!("/users/{}", alice.id)))
        .bearer_auth(&alice_token)
        .json(&json!({ "is_admin": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // PUT needs the email.
    let response = app
        .client
        .put(app.url(&format!("/users/{}", alice.id)))
        .bearer_auth(&alice_token)
        .json(&json!({ "first_name": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let admin_token = app.access_token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let response = app
        .client
        .patch(app.url(&format!("/users/{}", bob.id)))
        .bearer_auth(&admin_token)
        .json(&json!({ "is_author": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bob: User = response.json().await.unwrap();
    assert!(!bob.is_author);
}

#[tokio::test]
async fn test_change_password_flow() {
    let app = spawn_app().await;
    let (user, token) = app.author("pw@example.com").await;
    let url = app.url(&format!("/users/{}/change-password", user.id));

    // Wrong old password: 400 and the old password still works.
    let response = app
        .client
        .put(&url)
        .bearer_auth(&token)
        .json(&json!({ "old_password": "not-my-password", "new_password": "brand-new-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        app.login("pw@example.com", "author-password").await.status(),
        StatusCode::OK
    );

    let response = app
        .client
        .put(&url)
        .bearer_auth(&token)
        .json(&json!({ "old_password": "author-password", "new_password": "brand-new-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        app.login("pw@example.com", "brand-new-password").await.status(),
        StatusCode::OK
    );
    assert_eq!(
        app.login("pw@example.com", "author-password").await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_change_password_is_self_only() {
    let app = spawn_app().await;
    let (target, _) = app.author("target@example.com").await;
    let admin_token = app.access_token(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .client
        .put(app.url(&format!("/users/{}/change-password", target.id)))
        .bearer_auth(&admin_token)
        .json(&json!({ "old_password": "author-password", "new_password": "admin-chosen-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_content_category_association_replaced() {
    let app = spawn_app().await;
    let (_, token) = app.author("editor@example.com").await;
    let news = app.create_category(&token, "News").await;
    let tech = app.create_category(&token, "Tech").await;
    let sport = app.create_category(&token, "Sport").await;

    let item = app.create_content(&token, "Launch", &[news.id, tech.id]).await;
    assert_eq!(item.categories, sorted(vec![news.id, tech.id]));

    let response = app
        .client
        .patch(app.url(&format!("/content-items/{}", item.id)))
        .bearer_auth(&token)
        .json(&json!({ "categories": [sport.id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: ContentItem = response.json().await.unwrap();
    assert_eq!(updated.categories, vec![sport.id]);
    assert_eq!(updated.title, "Launch");

    let fetched: ContentItem = app
        .client
        .get(app.url(&format!("/content-items/{}", item.id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.categories, vec![sport.id]);
}

#[tokio::test]
async fn test_content_rejects_unknown_category() {
    let app = spawn_app().await;
    let (_, token) = app.author("dangling@example.com").await;

    let response = app
        .client
        .post(app.url("/content-items"))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Orphan",
            "body": "Body",
            "summary": "Summary",
            "categories": [Uuid::new_v4()],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let items: Vec<ContentItem> = app
        .client
        .get(app.url("/content-items"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_content_field_bounds() {
    let app = spawn_app().await;
    let (_, token) = app.author("bounds@example.com").await;

    let response = app
        .client
        .post(app.url("/content-items"))
        .bearer_auth(&token)
        .json(&json!({
            "title": "x".repeat(31),
            "body": "Body",
            "summary": "Summary",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .client
        .post(app.url("/content-items"))
        .bearer_auth(&token)
        .json(&json!({ "title": "No body" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deleting_category_keeps_content() {
    let app = spawn_app().await;
    let (_, token) = app.author("cascade@example.com").await;
    let keep = app.create_category(&token, "Keep").await;
    let dropped = app.create_category(&token, "Drop").await;
    let item = app.create_content(&token, "Tagged", &[keep.id, dropped.id]).await;

    let response = app
        .client
        .delete(app.url(&format!("/categories/{}", dropped.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let fetched: ContentItem = app
        .client
        .get(app.url(&format!("/content-items/{}", item.id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.categories, vec![keep.id]);
}

#[tokio::test]
async fn test_title_search_is_case_insensitive() {
    let app = spawn_app().await;
    let (_, token) = app.author("search@example.com").await;
    let first = app.create_content(&token, "Test Content 1", &[]).await;
    app.create_content(&token, "Other", &[]).await;

    let response = app
        .client
        .get(app.url("/content-items"))
        .query(&[("search", "test content")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let items: Vec<ContentItem> = response.json().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, first.id);

    let all: Vec<ContentItem> = app
        .client
        .get(app.url("/content-items"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_content_writes_require_author() {
    let app = spawn_app().await;
    let admin_token = app.access_token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    app.client
        .post(app.url("/users"))
        .bearer_auth(&admin_token)
        .json(&json!({ "email": "reader@example.com", "password": "password123", "is_author": false }))
        .send()
        .await
        .unwrap();
    let reader_token = app.access_token("reader@example.com", "password123").await;

    let response = app
        .client
        .post(app.url("/categories"))
        .bearer_auth(&reader_token)
        .json(&json!({ "name": "Nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .post(app.url("/content-items"))
        .json(&json!({ "title": "Anon", "body": "Body", "summary": "Summary" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_delete_missing_ids_is_not_found() {
    let app = spawn_app().await;
    let admin_token = app.access_token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let missing = Uuid::new_v4();

    for path in ["users", "content-items", "categories"] {
        let response = app
            .client
            .delete(app.url(&format!("/{path}/{missing}")))
            .bearer_auth(&admin_token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "DELETE /{path}/{{id}}");
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["code"], "not_found");
    }
}

#[tokio::test]
async fn test_multipart_upload_and_download() {
    let app = spawn_app().await;
    let (_, token) = app.author("upload@example.com").await;
    let category = app.create_category(&token, "Docs").await;

    let document = reqwest::multipart::Part::bytes(b"%PDF-1.4 fake".to_vec())
        .file_name("report.pdf")
        .mime_str("application/pdf")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .text("title", "Quarterly report")
        .text("body", "Numbers went up")
        .text("summary", "Up")
        .text("categories", category.id.to_string())
        .part("document", document);

    let response = app
        .client
        .post(app.url("/content-items"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let item: ContentItem = response.json().await.unwrap();
    let handle = item.document.clone().expect("document handle");
    assert!(handle.starts_with("documents/"));
    assert!(handle.ends_with(".pdf"));
    assert_eq!(item.categories, vec![category.id]);

    let response = app
        .client
        .get(app.url(&format!("/content-items/{}/document", item.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "application/pdf"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"%PDF-1.4 fake");
}

#[tokio::test]
async fn test_upload_filename_cannot_inject_header_parameters() {
    let app = spawn_app().await;
    let (_, token) = app.author("hostile@example.com").await;

    let document = reqwest::multipart::Part::bytes(b"data".to_vec())
        .file_name("a.pdf\"; evil=1")
        .mime_str("application/pdf")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .text("title", "Hostile name")
        .text("body", "Body")
        .text("summary", "Summary")
        .part("document", document);

    let response = app
        .client
        .post(app.url("/content-items"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let item: ContentItem = response.json().await.unwrap();
    let handle = item.document.clone().expect("document handle");
    assert!(handle.starts_with("documents/"));
    assert!(handle.ends_with(".bin"), "unexpected handle {handle}");

    let response = app
        .client
        .get(app.url(&format!("/content-items/{}/document", item.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[reqwest::header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    let filename = handle.rsplit('/').next().unwrap();
    assert_eq!(disposition, format!("attachment; filename=\"{filename}\""));
    assert!(!disposition.contains("evil"));
}

#[tokio::test]
async fn test_document_missing_is_not_found() {
    let app = spawn_app().await;
    let (_, token) = app.author("nodoc@example.com").await;
    let item = app.create_content(&token, "Plain", &[]).await;

    let response = app
        .client
        .get(app.url(&format!("/content-items/{}/document", item.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_bearer_token_is_rejected_on_public_routes() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/content-items"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
