mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use serde_json::json;
use study_assistant_core::assistant::FALLBACK_SUMMARY;
use study_assistant_core::domain::BlobRef;

const MITOCHONDRIA: &[u8] = b"Mitochondria is the powerhouse of the cell.";

#[tokio::test]
async fn bio_101_upload_produces_summary_and_questions() {
    let app = TestApp::new();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;

    let (status, body) = app.upload(&guest, &session_id, "notes.txt", MITOCHONDRIA).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "File processed successfully");
    assert_eq!(body["session"]["fileName"], "notes.txt");
    assert_eq!(body["session"]["guestId"], guest.as_str());

    let (status, body) = app
        .call(get(&format!("/api/study/sessions/{session_id}/summary"), Some(&guest)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["summary"].as_str().unwrap().contains("Mitochondria"));

    let (status, body) = app
        .call(get(&format!("/api/study/sessions/{session_id}/questions"), Some(&guest)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let questions = body["questions"].as_array().unwrap();
    assert!(!questions.is_empty());
    for question in questions {
        assert_eq!(question["options"].as_array().unwrap().len(), 4);
    }
    assert_eq!(questions[0]["answer"], "B");

    let (status, body) = app
        .call(get(&format!("/api/study/sessions/{session_id}/data"), Some(&guest)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["extractedText"],
        "Mitochondria is the powerhouse of the cell."
    );
    assert!(body["summary"].is_string());

    assert_eq!(app.store.blob_count().await, 1);
}

#[tokio::test]
async fn sessions_are_invisible_to_other_guests() {
    let app = TestApp::new();
    let owner = app.guest().await;
    let intruder = app.guest().await;
    assert_ne!(owner, intruder);
    let session_id = app.create_session(&owner, "Bio 101", "Biology").await;
    let path = format!("/api/study/sessions/{session_id}");

    let (status, body) = app
        .call(get(&format!("{path}/summary"), Some(&intruder)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Study session not found");

    let (status, _) = app
        .call(json_request(
            "PUT",
            &path,
            Some(&intruder),
            json!({ "name": "Stolen", "subject": "Biology" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call(delete(&path, Some(&intruder))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.upload(&intruder, &session_id, "notes.txt", MITOCHONDRIA).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.blob_count().await, 0);

    let (_, listed) = app.call(get("/api/study/sessions", Some(&intruder))).await;
    assert_eq!(listed, json!([]));

    let (_, listed) = app.call(get("/api/study/sessions", Some(&owner))).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], "Bio 101");
}

#[tokio::test]
async fn guest_id_header_is_accepted_without_a_cookie() {
    let app = TestApp::new();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Chem", "Chemistry").await;

    let request = Request::builder()
        .uri("/api/study/sessions")
        .header("X-Guest-ID", &guest)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.call(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], session_id.as_str());
}

#[tokio::test]
async fn oversized_upload_is_rejected_before_any_blob_is_written() {
    let app = TestApp::new();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;

    let too_big = vec![b'a'; 5 * 1024 * 1024 + 1];
    let (status, body) = app.upload(&guest, &session_id, "big.txt", &too_big).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "File is too large. The maximum size is 5 MB");
    assert_eq!(app.store.blob_count().await, 0);
}

#[tokio::test]
async fn failing_backend_still_persists_fallback_material() {
    let app = TestApp::with_failing_backend();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;

    let (status, body) = app.upload(&guest, &session_id, "notes.txt", MITOCHONDRIA).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["session"]["summary"], FALLBACK_SUMMARY);

    let (_, body) = app
        .call(get(&format!("/api/study/sessions/{session_id}/questions"), Some(&guest)))
        .await;
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0]["question"], "Sample question (API limitation)");
    assert_eq!(questions[0]["answer"], "A");
}

#[tokio::test]
async fn deleting_a_session_releases_its_blob() {
    let app = TestApp::new();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;
    let (_, body) = app.upload(&guest, &session_id, "notes.txt", MITOCHONDRIA).await;
    let blob = BlobRef::new(body["session"]["fileId"].as_str().unwrap());
    assert!(app.store.blob(&blob).await.is_some());

    let (status, body) = app
        .call(delete(&format!("/api/study/sessions/{session_id}"), Some(&guest)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Study session and associated data deleted successfully"
    );
    assert!(app.store.blob(&blob).await.is_none());
    assert_eq!(app.store.blob_count().await, 0);

    let (status, _) = app
        .call(get(&format!("/api/study/sessions/{session_id}/summary"), Some(&guest)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reupload_replaces_material_and_releases_the_old_blob() {
    let app = TestApp::new();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;

    let (_, first) = app.upload(&guest, &session_id, "one.txt", MITOCHONDRIA).await;
    let (status, second) = app
        .upload(&guest, &session_id, "two.txt", b"Ribosomes build proteins.")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["session"]["fileName"], "two.txt");

    let old = BlobRef::new(first["session"]["fileId"].as_str().unwrap());
    assert!(app.store.blob(&old).await.is_none());
    assert_eq!(app.store.blob_count().await, 1);
}

#[tokio::test]
async fn concurrent_uploads_to_one_session_are_last_writer_wins() {
    // No optimistic concurrency: both uploads succeed and whichever write lands
    // last is what the session keeps.
    let app = TestApp::new();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;

    let (a, b) = tokio::join!(
        app.upload(&guest, &session_id, "a.txt", b"Alpha helices are protein structures."),
        app.upload(&guest, &session_id, "b.txt", b"Beta sheets are protein structures."),
    );
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);

    let (_, data) = app
        .call(get(&format!("/api/study/sessions/{session_id}/data"), Some(&guest)))
        .await;
    let winner = data["fileName"].as_str().unwrap();
    assert!(winner == "a.txt" || winner == "b.txt");
    assert_eq!(app.store.blob_count().await, 1);
}

#[tokio::test]
async fn upload_rejections_map_to_client_errors() {
    let app = TestApp::new();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;

    let (status, body) = app.upload(&guest, &session_id, "old.doc", b"\xd0\xcf\x11\xe0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "DOC files are not supported. Please convert to DOCX."
    );

    let (status, body) = app.upload(&guest, &session_id, "blank.txt", b"  \n\t ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "The uploaded file contains no readable text");

    let (status, body) = app
        .upload(&guest, &session_id, "broken.pdf", b"not really a pdf")
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Error reading file");

    let request = guest_request(
        "POST",
        &format!("/api/study/sessions/{session_id}/upload"),
        Some(&guest),
    )
    .header(
        header::CONTENT_TYPE,
        "multipart/form-data; boundary=study-assistant-test-boundary",
    )
    .body(Body::from(multipart_body("notes", "notes.txt", MITOCHONDRIA)))
    .unwrap();
    let (status, body) = app.call(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No file uploaded");

    assert_eq!(app.store.blob_count().await, 0);
}

#[tokio::test]
async fn material_endpoints_report_missing_uploads() {
    let app = TestApp::new();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;
    let path = format!("/api/study/sessions/{session_id}");

    let (status, body) = app.call(get(&format!("{path}/summary"), Some(&guest))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Summary not found. Please upload a file first.");

    let (status, body) = app.call(get(&format!("{path}/questions"), Some(&guest))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Questions not found. Please upload a file first.");

    let (status, body) = app.call(get(&format!("{path}/data"), Some(&guest))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No file uploaded for this session");

    let (status, _) = app
        .call(get("/api/study/sessions/not-a-uuid/summary", Some(&guest)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_metadata_is_validated_and_updatable() {
    let app = TestApp::new();
    let guest = app.guest().await;

    let (status, body) = app
        .call(post_json(
            "/api/study/sessions",
            Some(&guest),
            json!({ "name": "  ", "subject": "Biology" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Name and subject are required");

    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;
    let (status, body) = app
        .call(json_request(
            "PUT",
            &format!("/api/study/sessions/{session_id}"),
            Some(&guest),
            json!({ "name": "Bio 102", "subject": "Cell biology" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Bio 102");
    assert_eq!(body["subject"], "Cell biology");
}

#[tokio::test]
async fn health_reports_the_store_state() {
    let app = TestApp::new();
    let (status, body) = app.call(get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "store": "ready" }));
}

#[tokio::test]
async fn undecodable_bodies_still_answer_with_a_message() {
    let app = TestApp::new();
    let guest = app.guest().await;

    let request = guest_request("POST", "/api/study/sessions", Some(&guest))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.call(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Malformed JSON request body");

    let request = guest_request("POST", "/api/study/sessions", Some(&guest))
        .body(Body::from(r#"{"name":"Bio 101","subject":"Biology"}"#))
        .unwrap();
    let (status, body) = app.call(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Expected a JSON request body");

    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;
    let request = guest_request(
        "POST",
        &format!("/api/study/sessions/{session_id}/upload"),
        Some(&guest),
    )
    .header(header::CONTENT_TYPE, "multipart/form-data")
    .body(Body::from(multipart_body("file", "notes.txt", MITOCHONDRIA)))
    .unwrap();
    let (status, body) = app.call(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Malformed multipart request");
    assert_eq!(app.store.blob_count().await, 0);
}

#[tokio::test]
async fn request_bodies_past_the_router_limit_are_reported_as_too_large() {
    let app = TestApp::new();
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;

    // An oversized leading part trips the body limit before the file part is reached.
    let boundary = "study-assistant-test-boundary";
    let mut payload = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"padding\"\r\n\r\n"
    )
    .into_bytes();
    payload.extend(std::iter::repeat(b'x').take(10 * 1024 * 1024 + 1));
    payload.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    let mut tail = multipart_body("file", "notes.txt", MITOCHONDRIA);
    tail.drain(..format!("--{boundary}\r\n").len());
    payload.extend(tail);

    let request = guest_request(
        "POST",
        &format!("/api/study/sessions/{session_id}/upload"),
        Some(&guest),
    )
    .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={boundary}"),
    )
    .body(Body::from(payload))
    .unwrap();
    let (status, body) = app.call(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "File is too large. The maximum size is 5 MB");
    assert_eq!(app.store.blob_count().await, 0);
}

#[tokio::test]
async fn upload_whose_questions_did_not_parse_reports_none_found() {
    let app = TestApp::with_generators(
        Scripted::ok("Mitochondria is the powerhouse of the cell."),
        Scripted::ok("I could not think of any questions."),
    );
    let guest = app.guest().await;
    let session_id = app.create_session(&guest, "Bio 101", "Biology").await;
    let (status, _) = app.upload(&guest, &session_id, "notes.txt", MITOCHONDRIA).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(get(&format!("/api/study/sessions/{session_id}/questions"), Some(&guest)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Questions not found. Please upload a file first.");

    let (status, body) = app
        .call(get(&format!("/api/study/sessions/{session_id}/data"), Some(&guest)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["questions"], json!([]));
}
