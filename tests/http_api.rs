//! HTTP API tests driving the router in-process.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use patient_search::config::SignedUrlConfig;
use patient_search::credentials::signed_url::StorageAccount;
use patient_search::credentials::{
    BearerToken, CredentialCache, CredentialError, CredentialGenerator, CredentialKind,
    CredentialSlot, ManualClock, SasTokenSigner,
};
use patient_search::server::{build_router, AppState};
use patient_search_core::models::DocumentRecord;
use patient_search_core::store::memory::InMemoryIndex;
use patient_search_core::store::PatientIndex;
use patient_search_core::{SearchEngine, SearchLimits};

const CONN: &str =
    "AccountName=testacct;AccountKey=dGVzdC1hY2NvdW50LWtleS0wMTIzNDU2Nzg5;EndpointSuffix=core.windows.net";

struct StubIssuer {
    calls: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl CredentialGenerator<BearerToken> for StubIssuer {
    async fn generate(&self, now: DateTime<Utc>) -> Result<BearerToken, CredentialError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CredentialError::Upstream {
                status: 401,
                body: "Access denied due to invalid subscription key".into(),
            });
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(BearerToken {
            access_token: format!("stub-token-{}", n),
            token_type: "Bearer".into(),
            expires_in: 600,
            region: "eastus".into(),
            issued_at: now,
        })
    }

    fn details(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("speech_region".into(), "eastus".into());
        map
    }
}

fn doc(id: &str, user: &str, name: &str) -> DocumentRecord {
    DocumentRecord {
        document_id: id.to_string(),
        user_id: user.to_string(),
        patient_name: name.to_string(),
        filename: format!("4000123456_{}_6001467010_EMER.pdf", name),
        record_number: Some("4000123456".to_string()),
        episode_number: Some("6001467010".to_string()),
        category: Some("EMER".to_string()),
        processing_status: "registered".to_string(),
        created_at: 1_700_000_000,
        updated_at: 1_700_000_000,
    }
}

struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
    issuer: Arc<StubIssuer>,
}

fn harness() -> Harness {
    let index: Arc<dyn PatientIndex> = Arc::new(InMemoryIndex::with_documents(vec![
        doc("d1", "u1", "GARCIA LOPEZ, MARIA"),
        doc("d2", "u2", "GARCIA LOPEZ, MARIA"),
        doc("d3", "u1", "GARDUÑO RUIZ, ANA"),
        doc("d4", "u1", "MARTINEZ RODRIGUEZ, CARLOS ALBERTO"),
        doc("d5", "u1", "HERNANDEZ SILVA, ANA LUCIA"),
    ]));
    let engine = SearchEngine::new(index, SearchLimits::default());

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
    ));
    let issuer = Arc::new(StubIssuer {
        calls: AtomicUsize::new(0),
        fail: AtomicBool::new(false),
    });
    let signer = SasTokenSigner::new(
        &SignedUrlConfig {
            container: "documents".into(),
            cache_ttl_secs: 3300,
            token_ttl_secs: 3600,
            permissions: "rl".into(),
        },
        StorageAccount::parse(CONN).unwrap(),
    );

    let credentials = CredentialCache::new(
        Some(CredentialSlot::new(
            CredentialKind::Bearer,
            issuer.clone(),
            Duration::seconds(540),
            clock.clone(),
        )),
        Some(CredentialSlot::new(
            CredentialKind::SignedUrl,
            Arc::new(signer),
            Duration::seconds(3300),
            clock.clone(),
        )),
    );

    Harness {
        app: build_router(AppState::new(engine, credentials)),
        clock,
        issuer,
    }
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri).await
}

fn assert_envelope(body: &Value, code: &str) {
    assert_eq!(body["error_code"], code, "body: {}", body);
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    assert!(body["suggestion"].as_str().is_some_and(|s| !s.is_empty()));
    let request_id = body["request_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
}

// ============ Health ============

#[tokio::test]
async fn health_reports_version() {
    let h = harness();
    let (status, body) = get(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn unknown_route_uses_envelope() {
    let h = harness();
    let (status, body) = get(&h.app, "/api/v1/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_envelope(&body, "NOT_FOUND");
}

// ============ Search ============

#[tokio::test]
async fn search_is_tenant_isolated() {
    let h = harness();
    for (user, id) in [("u1", "d1"), ("u2", "d2")] {
        let (status, body) = get(
            &h.app,
            &format!(
                "/api/v1/search/patients?search_term=GARCIA&user_id={}&limit=5&min_similarity=0.3",
                user
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["document_id"], id);
        assert_eq!(body["results"][0]["match_type"], "prefix");
        assert_eq!(body["normalized_term"], "GARCIA");
        for hit in body["results"].as_array().unwrap() {
            assert_eq!(hit["user_id"], user);
        }
    }

    // u2 owns a single document; GARDUÑO RUIZ only scores for u1.
    let (_, body) = get(
        &h.app,
        "/api/v1/search/patients?search_term=GARCIA&user_id=u2&limit=5&min_similarity=0.3",
    )
    .await;
    assert_eq!(body["total_found"], 1);
}

#[tokio::test]
async fn search_response_carries_metadata() {
    let h = harness();
    let (status, body) = get(
        &h.app,
        "/api/v1/search/patients?search_term=garc%C3%ADa%20l%C3%B3pez%2C%20mar%C3%ADa&user_id=u1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_term"], "garcía lópez, maría");
    assert_eq!(body["normalized_term"], "GARCIA LOPEZ MARIA");
    assert_eq!(body["results"][0]["match_type"], "exact");
    assert_eq!(body["results"][0]["similarity_score"], 1.0);
    assert_eq!(body["limit"], 20);
    assert_eq!(body["skip"], 0);
    assert_eq!(body["current_page"], 1);
    assert_eq!(body["has_prev"], false);
    assert_eq!(body["min_similarity_threshold"], 0.3);
    assert!(body["search_strategies_used"]
        .as_array()
        .unwrap()
        .contains(&Value::from("exact")));
    assert!(body["search_timestamp"].as_str().is_some());
    assert_eq!(
        body["returned_count"].as_u64().unwrap(),
        body["results"].as_array().unwrap().len() as u64
    );
}

#[tokio::test]
async fn zero_threshold_returns_all_of_tenant() {
    let h = harness();
    let (_, body) = get(
        &h.app,
        "/api/v1/search/patients?search_term=ZZZ&user_id=u1&min_similarity=0&limit=100",
    )
    .await;
    assert_eq!(body["total_found"], 4);
    for hit in body["results"].as_array().unwrap() {
        assert_eq!(hit["user_id"], "u1");
    }
}

#[tokio::test]
async fn missing_user_id_is_rejected() {
    let h = harness();
    let (status, body) = get(&h.app, "/api/v1/search/patients?search_term=GARCIA").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_envelope(&body, "USER_ID_REQUIRED");
}

#[tokio::test]
async fn missing_user_id_wins_over_malformed_parameters() {
    let h = harness();
    for uri in [
        "/api/v1/search/patients?search_term=GARCIA&limit=abc",
        "/api/v1/search/patients?search_term=GARCIA&skip=-1&min_similarity=high",
        "/api/v1/search/patients/suggestions?partial_term=GAR&limit=many",
        "/api/v1/search/patients/GARCIA/documents?limit=abc&skip=x",
    ] {
        let (status, body) = get(&h.app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_envelope(&body, "USER_ID_REQUIRED");
    }

    let (status, body) = get(
        &h.app,
        "/api/v1/search/patients?search_term=GARCIA&user_id=&limit=abc",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_envelope(&body, "INVALID_USER_ID");
}

#[tokio::test]
async fn empty_user_id_is_rejected() {
    let h = harness();
    let (status, body) = get(
        &h.app,
        "/api/v1/search/patients?search_term=GARCIA&user_id=",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_envelope(&body, "INVALID_USER_ID");
    assert!(body["message"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn bad_parameters_are_unprocessable() {
    let h = harness();
    for uri in [
        "/api/v1/search/patients?search_term=GARCIA&user_id=u1&limit=0",
        "/api/v1/search/patients?search_term=GARCIA&user_id=u1&limit=101",
        "/api/v1/search/patients?search_term=GARCIA&user_id=u1&limit=abc",
        "/api/v1/search/patients?search_term=GARCIA&user_id=u1&min_similarity=1.5",
        "/api/v1/search/patients?search_term=GARCIA&user_id=u1&skip=-1",
        "/api/v1/search/patients?search_term=&user_id=u1",
    ] {
        let (status, body) = get(&h.app, uri).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", uri);
        assert_envelope(&body, "INVALID_PARAMETER");
    }
}

#[tokio::test]
async fn suggestions_list_prefix_matches() {
    let h = harness();
    let (status, body) = get(
        &h.app,
        "/api/v1/search/patients/suggestions?partial_term=GAR&user_id=u1&limit=5",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["GARDUÑO RUIZ, ANA", "GARCIA LOPEZ, MARIA"]);
    assert_eq!(body["total_suggestions"], 2);
    assert_eq!(body["partial_term"], "GAR");
}

#[tokio::test]
async fn suggestions_require_user_id() {
    let h = harness();
    let (status, body) = get(
        &h.app,
        "/api/v1/search/patients/suggestions?partial_term=GAR",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_envelope(&body, "USER_ID_REQUIRED");
}

#[tokio::test]
async fn documents_by_exact_name() {
    let h = harness();
    let (status, body) = get(
        &h.app,
        "/api/v1/search/patients/garcia%20lopez%2C%20maria/documents?user_id=u2",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["patient_name"], "garcia lopez, maria");
    assert_eq!(body["total_found"], 1);
    assert_eq!(body["results"][0]["document_id"], "d2");
    assert_eq!(body["results"][0]["match_type"], "exact");
    assert_eq!(body["results"][0]["similarity_score"], 1.0);
}

#[tokio::test]
async fn documents_require_non_blank_user_id() {
    let h = harness();
    let (status, body) = get(
        &h.app,
        "/api/v1/search/patients/GARCIA/documents?user_id=%20%20",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_envelope(&body, "INVALID_USER_ID");
}

// ============ Tokens ============

#[tokio::test]
async fn speech_token_is_cached_until_invalidated() {
    let h = harness();

    let (status, first) = get(&h.app, "/api/v1/tokens/speech").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["token_type"], "Bearer");
    assert_eq!(first["expires_in"], 600);
    assert_eq!(first["region"], "eastus");

    let (_, second) = get(&h.app, "/api/v1/tokens/speech").await;
    assert_eq!(first["access_token"], second["access_token"]);
    assert_eq!(h.issuer.calls.load(Ordering::SeqCst), 1);

    let (status, body) = send(&h.app, Method::POST, "/api/v1/tokens/speech/invalidate").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("invalidated"));
    assert_eq!(body["had_cached_token"], true);

    let (_, info) = get(&h.app, "/api/v1/tokens/speech/info").await;
    assert_eq!(info["has_cached_token"], false);
    assert_eq!(info["is_token_valid"], false);

    let (_, third) = get(&h.app, "/api/v1/tokens/speech").await;
    assert_ne!(first["access_token"], third["access_token"]);
}

#[tokio::test]
async fn speech_info_reflects_expiry() {
    let h = harness();
    get(&h.app, "/api/v1/tokens/speech").await;

    let (status, info) = get(&h.app, "/api/v1/tokens/speech/info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["has_cached_token"], true);
    assert_eq!(info["is_token_valid"], true);
    assert_eq!(info["speech_region"], "eastus");
    assert!(info["token_expires_at"].as_str().is_some());

    h.clock.advance(Duration::seconds(540));
    let (_, info) = get(&h.app, "/api/v1/tokens/speech/info").await;
    assert_eq!(info["has_cached_token"], true);
    assert_eq!(info["is_token_valid"], false);

    let (_, token) = get(&h.app, "/api/v1/tokens/speech").await;
    assert_eq!(token["access_token"], "stub-token-2");
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway() {
    let h = harness();
    h.issuer.fail.store(true, Ordering::SeqCst);
    let (status, body) = get(&h.app, "/api/v1/tokens/speech").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_envelope(&body, "UPSTREAM_CREDENTIAL_ERROR");

    let (_, info) = get(&h.app, "/api/v1/tokens/speech/info").await;
    assert_eq!(info["has_cached_token"], false);
}

#[tokio::test]
async fn storage_token_regenerates_after_invalidate() {
    let h = harness();

    let (status, first) = get(&h.app, "/api/v1/tokens/storage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["account_name"], "testacct");
    assert_eq!(first["container_name"], "documents");
    assert_eq!(first["resource_type"], "container");
    assert_eq!(first["permissions"], "rl");
    assert_eq!(first["base_url"], "https://testacct.blob.core.windows.net");
    let sas = first["sas_token"].as_str().unwrap();
    assert!(sas.starts_with("sv=2021-06-08&sr=c&sp=rl&se="));
    assert!(sas.contains("&sig="));
    assert_eq!(
        first["container_url"].as_str().unwrap(),
        format!("https://testacct.blob.core.windows.net/documents?{}", sas)
    );

    let (_, again) = get(&h.app, "/api/v1/tokens/storage").await;
    assert_eq!(first["sas_token"], again["sas_token"]);

    send(&h.app, Method::POST, "/api/v1/tokens/storage/invalidate").await;
    h.clock.advance(Duration::seconds(5));
    let (_, fresh) = get(&h.app, "/api/v1/tokens/storage").await;
    assert_ne!(first["expires_at"], fresh["expires_at"]);
    assert_ne!(first["sas_token"], fresh["sas_token"]);
}

#[tokio::test]
async fn storage_info_lists_account() {
    let h = harness();
    let (status, info) = get(&h.app, "/api/v1/tokens/storage/info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["has_cached_token"], false);
    assert_eq!(info["account_name"], "testacct");
    assert_eq!(info["container_name"], "documents");
    assert_eq!(info["base_url"], "https://testacct.blob.core.windows.net");
}

#[tokio::test]
async fn blob_url_uses_cached_token() {
    let h = harness();
    let (_, token) = get(&h.app, "/api/v1/tokens/storage").await;

    let (status, body) = get(
        &h.app,
        "/api/v1/tokens/storage/blob/2025/03/GARCIA%20LOPEZ%2C%20MARIA.pdf",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blob_name"], "2025/03/GARCIA LOPEZ, MARIA.pdf");
    assert_eq!(
        body["blob_url"].as_str().unwrap(),
        format!(
            "https://testacct.blob.core.windows.net/documents/2025/03/GARCIA%20LOPEZ%2C%20MARIA.pdf?{}",
            token["sas_token"].as_str().unwrap()
        )
    );
    assert!(body["generated_at"].as_str().is_some());
}

#[tokio::test]
async fn unconfigured_credentials_are_not_found() {
    let index: Arc<dyn PatientIndex> = Arc::new(InMemoryIndex::new());
    let app = build_router(AppState::new(
        SearchEngine::new(index, SearchLimits::default()),
        CredentialCache::empty(),
    ));

    for uri in [
        "/api/v1/tokens/speech",
        "/api/v1/tokens/storage",
        "/api/v1/tokens/speech/info",
        "/api/v1/tokens/storage/blob/a.pdf",
    ] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_envelope(&body, "NOT_FOUND");
    }

    let (status, _) = send(&app, Method::POST, "/api/v1/tokens/speech/invalidate").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
