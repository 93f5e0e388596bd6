use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use studycards_core::Assistant;
use studycards_shared::{CorsConfig, OpenAiConfig, RateLimitConfig};
use studycards_storage::Storage;

use super::*;

struct TestApp {
    router: Router,
}

impl TestApp {
    async fn new(llm_base_url: &str, limits: RateLimitConfig) -> Self {
        let storage = Arc::new(Storage::open_in_memory().await.expect("open storage"));
        let openai = OpenAiConfig {
            base_url: llm_base_url.to_string(),
            timeout_secs: 5,
            ..Default::default()
        };
        let assistant = Assistant::new(Arc::clone(&storage), &openai, "test-key").unwrap();
        let state = AppState::new(storage, assistant, &limits);
        let router = build_router(state, &CorsConfig::default()).expect("router");
        Self { router }
    }

    async fn offline() -> Self {
        Self::new("http://127.0.0.1:9", RateLimitConfig::default()).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    /// Register and log in a user; returns (user id, session token).
    async fn login(&self, email: &str) -> (String, String) {
        let (status, _, user) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"email": email, "username": "learner", "password": "Passw0rd"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {user}");

        let (status, _, session) = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": email, "password": "Passw0rd"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        (
            user["id"].as_str().unwrap().to_string(),
            session["token"].as_str().unwrap().to_string(),
        )
    }

    async fn create_card(&self, front: &str, tags: &[&str]) -> Value {
        let (status, _, card) = self
            .send(
                Method::POST,
                "/api/cards",
                Some("any-token"),
                Some(json!({"front": front, "back": "answer", "tags": tags})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        card
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

#[tokio::test]
async fn health_is_public_and_hardened() {
    let app = TestApp::offline().await;
    let (status, headers, body) = app.send(Method::GET, "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::REFERRER_POLICY], "no-referrer");
}

#[tokio::test]
async fn protected_routes_require_token() {
    let app = TestApp::offline().await;
    for uri in ["/api/cards", "/api/decks", "/api/users/x", "/api/pia/related-cards/x"] {
        let (status, _, body) = app.send(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "Access token required");
    }

    let (status, _, _) = app.send(Method::GET, "/api/cards", Some(""), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn any_token_passes_crud_routes() {
    let app = TestApp::offline().await;
    let (status, _, body) = app
        .send(Method::GET, "/api/cards", Some("not-a-session"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn card_lifecycle() {
    let app = TestApp::offline().await;
    let card = app.create_card("What is a slice?", &["Rust"]).await;
    let id = card["id"].as_str().unwrap();
    assert_eq!(card["difficulty"], "MEDIUM");
    assert_eq!(card["reviewCount"], 0);
    assert_eq!(card["tags"], json!(["rust"]));

    let uri = format!("/api/cards/{id}");
    let (status, _, updated) = app
        .send(Method::PUT, &uri, Some("t"), Some(json!({"back": "A view into a sequence"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["front"], "What is a slice?");
    assert_eq!(updated["back"], "A view into a sequence");

    let (status, _, reviewed) = app
        .send(
            Method::POST,
            &format!("{uri}/review"),
            Some("t"),
            Some(json!({"difficulty": "EASY"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["reviewCount"], 1);
    assert_eq!(reviewed["difficulty"], "EASY");
    assert!(reviewed["lastReviewed"].is_string());

    let (status, _, _) = app.send(Method::DELETE, &uri, Some("t"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = app.send(Method::GET, &uri, Some("t"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Card not found");
}

#[tokio::test]
async fn invalid_card_payloads_are_rejected() {
    let app = TestApp::offline().await;
    let (status, _, body) = app
        .send(Method::POST, "/api/cards", Some("t"), Some(json!({"front": " ", "back": "x"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("front"));

    let (status, _, body) = app
        .send(Method::POST, "/api/cards", Some("t"), Some(json!({"back": "x"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn deck_membership_and_stats() {
    let app = TestApp::offline().await;
    let (user_id, token) = app.login("ada@example.com").await;

    let (status, _, deck) = app
        .send(Method::POST, "/api/decks", Some(&token), Some(json!({"name": "Rust"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(deck["authorId"], user_id.as_str());
    assert_eq!(deck["isPublic"], false);
    let deck_uri = format!("/api/decks/{}", deck["id"].as_str().unwrap());

    let easy = app.create_card("easy one", &[]).await;
    let hard = app.create_card("hard one", &[]).await;
    for (card, difficulty) in [(&easy, "EASY"), (&hard, "HARD")] {
        let card_id = card["id"].as_str().unwrap();
        let (status, _, _) = app
            .send(Method::POST, &format!("{deck_uri}/cards"), Some(&token), Some(json!({"cardId": card_id})))
            .await;
        assert_eq!(status, StatusCode::OK);
        app.send(
            Method::POST,
            &format!("/api/cards/{card_id}/review"),
            Some(&token),
            Some(json!({"difficulty": difficulty})),
        )
        .await;
    }

    let (_, _, stats) = app
        .send(Method::GET, &format!("{deck_uri}/stats"), Some(&token), None)
        .await;
    assert_eq!(stats["totalCards"], 2);
    assert_eq!(stats["reviewedCards"], 2);
    assert_eq!(stats["averageDifficulty"], 2.0);

    let (status, _, after) = app
        .send(
            Method::DELETE,
            &format!("{deck_uri}/cards/{}", easy["id"].as_str().unwrap()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["cards"].as_array().unwrap().len(), 1);

    let (_, _, user) = app
        .send(Method::GET, &format!("/api/users/{user_id}"), Some(&token), None)
        .await;
    assert_eq!(user["decks"].as_array().unwrap().len(), 1);
    assert!(user.get("passwordHash").is_none());

    let (status, _, _) = app.send(Method::DELETE, &deck_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, body) = app.send(Method::GET, &deck_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Deck not found");
}

#[tokio::test]
async fn registration_and_login_errors() {
    let app = TestApp::offline().await;
    app.login("ada@example.com").await;

    let (status, _, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"email": "ada@example.com", "username": "again", "password": "Passw0rd"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email already registered");

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"email": "bob@example.com", "username": "bob", "password": "short"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "ada@example.com", "password": "Wr0ngPass"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn user_profile_and_progress() {
    let app = TestApp::offline().await;
    let (user_id, token) = app.login("ada@example.com").await;
    let uri = format!("/api/users/{user_id}");

    let (status, _, user) = app
        .send(
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({"preferences": {"theme": "DARK", "dailyGoal": 5}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["preferences"]["theme"], "DARK");
    assert_eq!(user["preferences"]["language"], "ENGLISH");

    let (status, _, _) = app
        .send(Method::PUT, &uri, Some(&token), Some(json!({"email": "not-an-email"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.create_card("Q", &[]).await;
    let (status, _, progress) = app
        .send(Method::GET, &format!("{uri}/progress"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["totalCards"], 1);
    assert_eq!(progress["dailyGoal"], 5);

    let (status, _, body) = app
        .send(Method::GET, "/api/users/ghost", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn assistant_requires_session() {
    let app = TestApp::offline().await;
    let (status, _, body) = app
        .send(Method::POST, "/api/pia", Some("not-a-session"), Some(json!({"prompt": "hi"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn assistant_answers_and_links_cards() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(
            "Answer: Use iterators.\nRelated topics: iterators\nConfidence: 90%\nSuggestions:\n- Try map and filter",
        ))
        .mount(&server)
        .await;

    let app = TestApp::new(&server.uri(), RateLimitConfig::default()).await;
    let (_, token) = app.login("ada@example.com").await;
    let card = app.create_card("What do iterators do?", &[]).await;

    let (status, _, body) = app
        .send(Method::POST, "/api/pia", Some(&token), Some(json!({"prompt": "How do I loop?"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Use iterators.");
    assert_eq!(body["confidence"], 0.9);
    assert_eq!(body["suggestions"], json!(["Try map and filter"]));
    assert_eq!(body["relatedCards"], json!([card["id"]]));
}

#[tokio::test]
async fn assistant_failure_is_internal_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .mount(&server)
        .await;

    let app = TestApp::new(&server.uri(), RateLimitConfig::default()).await;
    let (_, token) = app.login("ada@example.com").await;

    let (status, _, body) = app
        .send(Method::POST, "/api/pia", Some(&token), Some(json!({"prompt": "hi"})))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn ask_is_rate_limited_per_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("Answer: Borrow it.\nConfidence: 0.8"))
        .mount(&server)
        .await;

    let limits = RateLimitConfig {
        assistant_max: 1,
        ..Default::default()
    };
    let app = TestApp::new(&server.uri(), limits).await;
    let (_, ada) = app.login("ada@example.com").await;
    let (_, bob) = app.login("bob@example.com").await;
    let question = json!({"prompt": "How do I share data?"});

    let (status, _, body) = app
        .send(Method::POST, "/api/pia", Some(&ada), Some(question.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Borrow it.");

    let (status, headers, body) = app
        .send(Method::POST, "/api/pia", Some(&ada), Some(question.clone()))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 900);
    assert!(body["error"].is_string());

    // Each token has its own window.
    let (status, _, _) = app
        .send(Method::POST, "/api/pia", Some(&bob), Some(question.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    // The suggestions budget is separate from the ask budget.
    let (status, _, _) = app
        .send(Method::POST, "/api/pia/suggestions", Some(&ada), Some(question))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn suggestions_are_rate_limited_per_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("1. Review closures\n2. Practice iterators"))
        .mount(&server)
        .await;

    let limits = RateLimitConfig {
        suggestions_max: 1,
        ..Default::default()
    };
    let app = TestApp::new(&server.uri(), limits).await;
    let (_, token) = app.login("ada@example.com").await;
    let context = json!({"context": {"currentDeck": {"name": "Rust"}}});

    let (status, _, body) = app
        .send(Method::POST, "/api/pia/suggestions", Some(&token), Some(context.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["Review closures", "Practice iterators"]));

    let (status, headers, _) = app
        .send(Method::POST, "/api/pia/suggestions", Some(&token), Some(context))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key(header::RETRY_AFTER));

    // Routes without a limit layer are unaffected.
    let (status, _, _) = app
        .send(Method::GET, "/api/pia/related-cards/missing", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_allows_configured_origin() {
    let app = TestApp::offline().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/cards")
        .header(header::ORIGIN, "http://localhost:8080")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:8080"
    );
}

#[tokio::test]
async fn unknown_routes_return_json_404() {
    let app = TestApp::offline().await;
    let (status, _, body) = app.send(Method::GET, "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}
