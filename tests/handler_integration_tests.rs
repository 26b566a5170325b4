mod common;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode, header},
};
use common::{
    STUDENT_EMAIL, STUDENT_ID, TEST_PASSWORD, TestApp, raw_json_request, request, test_config,
};
use forum_api::{AppConfig, ApiError, extract::AppQuery, handlers, pagination::ListingParams};
use serde_json::{Value, json};
use tokio::test;

fn topic_ids(page: &Value) -> Vec<i64> {
    page["content"]
        .as_array()
        .unwrap()
        .iter()
        .map(|topic| topic["id"].as_i64().unwrap())
        .collect()
}

fn new_topic_body() -> Value {
    json!({
        "titulo": "Erro no deploy",
        "mensagem": "A aplicação não sobe no servidor",
        "nomeCurso": "Spring Boot"
    })
}

// --- Listing and cache ---

#[test]
async fn test_list_defaults_to_newest_first() {
    let app = TestApp::new();
    let response = app.get("/topicos").await;

    assert_eq!(response.status, StatusCode::OK);
    let page = response.json();
    assert_eq!(topic_ids(&page), vec![5, 2, 1]);
    assert_eq!(page["totalElements"], 3);
    assert_eq!(page["number"], 0);
    assert_eq!(page["size"], 10);
    assert_eq!(page["content"][0]["titulo"], "Dúvida 3");
    assert!(page["content"][0]["dataCriacao"].is_string());
}

#[test]
async fn test_repeated_listing_is_served_from_cache() {
    let app = TestApp::new();

    let first = app.get("/topicos").await;
    let second = app.get("/topicos").await;

    assert_eq!(first.body, second.body);
    assert_eq!(app.repo.topic_queries(), 1);
    assert_eq!(app.state.cache.stats().hits, 1);
}

#[test]
async fn test_distinct_queries_are_cached_separately() {
    let app = TestApp::new();

    app.get("/topicos").await;
    app.get("/topicos?nomeCurso=HTML%205").await;
    app.get("/topicos?page=0&size=10&sort=id,desc").await;

    // The explicit default paging canonicalizes to the same key as the bare listing.
    assert_eq!(app.repo.topic_queries(), 2);
}

#[test]
async fn test_course_filter_and_paging() {
    let app = TestApp::new();

    let html = app.get("/topicos?nomeCurso=HTML%205").await.json();
    assert_eq!(topic_ids(&html), vec![5]);

    let paged = app.get("/topicos?size=2&page=1&sort=id,asc").await.json();
    assert_eq!(topic_ids(&paged), vec![5]);
    assert_eq!(paged["totalPages"], 2);
    assert_eq!(paged["last"], true);

    let unknown = app.get("/topicos?nomeCurso=Inexistente").await.json();
    assert_eq!(unknown["empty"], true);
}

#[test]
async fn test_invalid_paging_is_rejected() {
    let app = TestApp::new();

    let bad_sort = app.get("/topicos?sort=senha").await;
    assert_eq!(bad_sort.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_sort.json()[0]["campo"], "sort");

    let bad_size = app.get("/topicos?size=0").await;
    assert_eq!(bad_size.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.repo.topic_queries(), 0);
}

#[test]
async fn test_created_topic_appears_in_next_listing() {
    let app = TestApp::new();
    let token = app.student_token();

    let before = app.get("/topicos").await.json();
    assert_eq!(topic_ids(&before).len(), 3);

    let created = app
        .send(request(
            Method::POST,
            "/topicos",
            Some(&token),
            Some(new_topic_body()),
        ))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let new_id = created.json()["id"].as_i64().unwrap();
    assert_eq!(
        created.headers.get(header::LOCATION).unwrap(),
        format!("/topicos/{new_id}").as_str()
    );

    let after = app.get("/topicos").await.json();
    assert_eq!(topic_ids(&after)[0], new_id);
    assert_eq!(after["totalElements"], 4);
    assert_eq!(app.repo.topic_queries(), 2);
}

#[test]
async fn test_created_topic_is_authored_by_caller() {
    let app = TestApp::new();
    let token = app.student_token();

    let created = app
        .send(request(
            Method::POST,
            "/topicos",
            Some(&token),
            Some(new_topic_body()),
        ))
        .await
        .json();
    let id = created["id"].as_i64().unwrap();

    let details = app.get(&format!("/topicos/{id}")).await.json();
    assert_eq!(details["nomeAutor"], "Aluno");
    assert_eq!(details["status"], "NAO_RESPONDIDO");
    assert_eq!(details["respostas"], json!([]));
}

#[test]
async fn test_update_invalidates_listing() {
    let app = TestApp::new();
    let token = app.student_token();
    app.get("/topicos").await;

    let updated = app
        .send(request(
            Method::PUT,
            "/topicos/1",
            Some(&token),
            Some(json!({ "titulo": "Dúvida resolvida", "mensagem": "Era a versão do Java" })),
        ))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["titulo"], "Dúvida resolvida");

    let listing = app.get("/topicos").await.json();
    let first = listing["content"]
        .as_array()
        .unwrap()
        .iter()
        .find(|topic| topic["id"] == 1)
        .unwrap()
        .clone();
    assert_eq!(first["titulo"], "Dúvida resolvida");
    assert_eq!(app.repo.topic_queries(), 2);
}

#[test]
async fn test_delete_invalidates_listing() {
    let app = TestApp::new();
    let token = app.student_token();
    app.get("/topicos").await;

    let deleted = app
        .send(request(Method::DELETE, "/topicos/2", Some(&token), None))
        .await;
    assert_eq!(deleted.status, StatusCode::OK);

    let listing = app.get("/topicos").await.json();
    assert_eq!(topic_ids(&listing), vec![5, 1]);
    assert_eq!(app.get("/topicos/2").await.status, StatusCode::NOT_FOUND);
}

#[test]
async fn test_failed_mutations_keep_cache() {
    let app = TestApp::new();
    let token = app.student_token();
    app.get("/topicos").await;

    let missing_update = app
        .send(request(
            Method::PUT,
            "/topicos/99",
            Some(&token),
            Some(json!({ "titulo": "Título válido", "mensagem": "Mensagem válida aqui" })),
        ))
        .await;
    assert_eq!(missing_update.status, StatusCode::NOT_FOUND);

    let missing_delete = app
        .send(request(Method::DELETE, "/topicos/99", Some(&token), None))
        .await;
    assert_eq!(missing_delete.status, StatusCode::NOT_FOUND);

    app.get("/topicos").await;
    assert_eq!(app.state.cache.stats().invalidations, 0);
    assert_eq!(app.repo.topic_queries(), 1);
}

// --- Validation ---

#[test]
async fn test_create_with_invalid_form_lists_field_errors() {
    let app = TestApp::new();
    let token = app.student_token();

    let response = app
        .send(request(
            Method::POST,
            "/topicos",
            Some(&token),
            Some(json!({ "titulo": "Oi", "mensagem": "", "nomeCurso": "Spring Boot" })),
        ))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let errors = response.json();
    let fields: Vec<&str> = errors
        .as_array()
        .unwrap()
        .iter()
        .map(|error| error["campo"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["titulo", "mensagem"]);
    assert_eq!(errors[1]["erro"], "must not be empty");
    assert_eq!(app.repo.mutations(), 0);
}

#[test]
async fn test_create_with_unknown_course_is_rejected() {
    let app = TestApp::new();
    let token = app.student_token();

    let response = app
        .send(request(
            Method::POST,
            "/topicos",
            Some(&token),
            Some(json!({
                "titulo": "Erro no deploy",
                "mensagem": "A aplicação não sobe no servidor",
                "nomeCurso": "COBOL"
            })),
        ))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()[0]["campo"], "nomeCurso");
    assert_eq!(app.repo.mutations(), 0);
    assert_eq!(app.state.cache.stats().invalidations, 0);
}

#[test]
async fn test_create_with_wrong_field_type_names_the_field() {
    let app = TestApp::new();
    let token = app.student_token();

    let response = app
        .send(request(
            Method::POST,
            "/topicos",
            Some(&token),
            Some(json!({ "titulo": 5, "mensagem": "Mensagem válida aqui", "nomeCurso": "Spring Boot" })),
        ))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let errors = response.json();
    assert_eq!(errors.as_array().unwrap().len(), 1);
    assert_eq!(errors[0]["campo"], "titulo");
    assert!(errors[0]["erro"].as_str().unwrap().contains("invalid type"));
    assert_eq!(app.repo.mutations(), 0);
}

#[test]
async fn test_malformed_json_body_is_a_field_error_list() {
    let app = TestApp::new();
    let token = app.student_token();

    let create = app
        .send(raw_json_request(Method::POST, "/topicos", Some(&token), "{not json"))
        .await;
    assert_eq!(create.status, StatusCode::BAD_REQUEST);
    assert_eq!(create.json()[0]["campo"], "body");

    let update = app
        .send(raw_json_request(Method::PUT, "/topicos/1", Some(&token), "not json at all"))
        .await;
    assert_eq!(update.status, StatusCode::BAD_REQUEST);
    assert_eq!(update.json()[0]["campo"], "body");

    let login = app
        .send(raw_json_request(Method::POST, "/auth", None, "{\"email\": "))
        .await;
    assert_eq!(login.status, StatusCode::BAD_REQUEST);
    assert!(login.json()[0]["erro"].is_string());
    assert_eq!(app.repo.mutations(), 0);
}

#[test]
async fn test_omitted_body_field_fails_validation() {
    let app = TestApp::new();
    let token = app.student_token();

    let response = app
        .send(request(
            Method::PUT,
            "/topicos/1",
            Some(&token),
            Some(json!({ "titulo": "Título novo" })),
        ))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()[0]["campo"], "mensagem");
    assert_eq!(app.repo.mutations(), 0);
}

#[test]
async fn test_non_numeric_page_is_a_field_error() {
    let app = TestApp::new();

    let response = app.get("/topicos?page=abc").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers.get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let errors = response.json();
    assert_eq!(errors[0]["campo"], "page");
    assert!(errors[0]["erro"].is_string());

    let negative_size = app.get("/topicos?size=-1").await;
    assert_eq!(negative_size.status, StatusCode::BAD_REQUEST);
    assert_eq!(negative_size.json()[0]["campo"], "size");
    assert_eq!(app.repo.topic_queries(), 0);
}

#[test]
async fn test_listing_cache_stays_within_capacity() {
    let app = TestApp::with_config(AppConfig {
        cache_capacity: 8,
        ..test_config()
    });

    for page in 0..50 {
        let response = app.get(&format!("/topicos?page={page}")).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let stats = app.state.cache.stats();
    assert_eq!(stats.entries, 8);
    assert_eq!(stats.evictions, 42);

    // The most recent page is still cached.
    app.get("/topicos?page=49").await;
    assert_eq!(app.repo.topic_queries(), 50);
}

#[test]
async fn test_topic_details_include_answers() {
    let app = TestApp::new();
    let details = app.get("/topicos/1").await.json();

    assert_eq!(details["titulo"], "Dúvida");
    assert_eq!(details["nomeAutor"], "Aluno");
    assert_eq!(details["respostas"][0]["mensagem"], "Reinstale as dependências");
    assert_eq!(details["respostas"][0]["nomeAutor"], "Moderador");
}

// --- Session ---

#[test]
async fn test_login_issues_usable_token() {
    let app = TestApp::new();

    let response = app
        .send(request(
            Method::POST,
            "/auth",
            None,
            Some(json!({ "email": STUDENT_EMAIL, "senha": TEST_PASSWORD })),
        ))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let body = response.json();
    assert_eq!(body["tipo"], "Bearer");
    let token = body["token"].as_str().unwrap();
    assert_eq!(app.state.tokens.subject_of(token).unwrap(), STUDENT_ID);
}

#[test]
async fn test_login_with_wrong_password_or_unknown_email_fails_alike() {
    let app = TestApp::new();

    let wrong_password = app
        .send(request(
            Method::POST,
            "/auth",
            None,
            Some(json!({ "email": STUDENT_EMAIL, "senha": "errada" })),
        ))
        .await;
    let unknown_email = app
        .send(request(
            Method::POST,
            "/auth",
            None,
            Some(json!({ "email": "ninguem@email.com", "senha": TEST_PASSWORD })),
        ))
        .await;

    assert_eq!(wrong_password.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_password.status, unknown_email.status);
    assert_eq!(wrong_password.body, unknown_email.body);
}

#[test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let response = app.get("/actuator/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "status": "UP" }));
}

// --- Handlers called directly ---

#[test]
async fn test_get_topic_handler_missing_id() {
    let app = TestApp::new();
    let result = handlers::get_topic(State(app.state.clone()), Path(404)).await;

    assert!(matches!(result, Err(ApiError::NotFound)));
}

#[test]
async fn test_list_handler_rejects_oversized_page() {
    let app = TestApp::new();
    let params = ListingParams {
        size: Some(101),
        ..ListingParams::default()
    };

    let result = handlers::list_topics(State(app.state.clone()), AppQuery(params)).await;
    match result {
        Err(ApiError::ValidationFailed(errors)) => assert_eq!(errors[0].field, "size"),
        other => panic!("expected validation failure, got {:?}", other.map(|r| r.status())),
    }
}
