//! Integration tests for the backend client using wiremock mock server

use std::time::Duration;

use portal::backend::{AtsError, AtsSubmission, ResumeFile, ScoreBand};
use portal::models::{Identity, NewProfile, ProfilePatch, ProfileSeed};
use portal::{BackendClient, ProfileStore, ProfileSyncError, UpdateError};

use chrono::Utc;
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer) -> BackendClient {
    BackendClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_create_profile_posts_seeded_record() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/users"))
        .and(body_partial_json(json!({
            "uid": "u-1",
            "email": "a@x.com",
            "displayName": "A B",
            "package": "Basic"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "user": {
                "uid": "u-1",
                "email": "a@x.com",
                "displayName": "A B",
                "package": "Basic",
                "skills": null
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let identity = Identity::new("u-1", Some("a@x.com".to_string()));
    let record = NewProfile::from_seed(&identity, &ProfileSeed::with_full_name("A B"), Utc::now());
    let profile = client(&mock_server).create_profile(&record).await.unwrap();

    assert_eq!(profile.uid, "u-1");
    assert_eq!(profile.display_name.as_deref(), Some("A B"));
    assert!(profile.skills.is_empty());
}

#[tokio::test]
async fn test_fetch_profile_keeps_unknown_fields() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/users/u-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "user": {
                "uid": "u-1",
                "displayName": "Jane",
                "skills": ["Rust", "SQL"],
                "package": "premium",
                "referralCode": "JANE42"
            }
        })))
        .mount(&mock_server)
        .await;

    let profile = client(&mock_server).fetch_profile("u-1").await.unwrap();

    assert_eq!(profile.skills, vec!["Rust", "SQL"]);
    assert_eq!(profile.tier(), portal::plans::Tier::Premium);
    assert_eq!(profile.extra["referralCode"], "JANE42");
}

#[tokio::test]
async fn test_fetch_profile_not_found_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/users/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "success": false,
            "message": "User not found"
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).fetch_profile("missing").await.unwrap_err();
    assert_eq!(err, ProfileSyncError::Rejected("User not found".to_string()));
}

#[tokio::test]
async fn test_fetch_profile_server_error_is_unreachable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/users/u-1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).fetch_profile("u-1").await.unwrap_err();
    assert!(matches!(err, ProfileSyncError::Unreachable(_)));
}

#[tokio::test]
async fn test_success_without_user_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/users/u-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).fetch_profile("u-1").await.unwrap_err();
    assert!(matches!(err, ProfileSyncError::Malformed(_)));
}

#[tokio::test]
async fn test_update_profile_sends_only_set_fields() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/users/u-1"))
        .and(body_partial_json(json!({ "bio": "Hello", "skills": ["Rust"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "user": { "uid": "u-1", "bio": "Hello", "skills": ["Rust"] }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let patch = ProfilePatch {
        bio: Some("Hello".to_string()),
        skills: Some(vec!["Rust".to_string()]),
        ..Default::default()
    };
    let profile = client(&mock_server)
        .update_profile("u-1", &patch)
        .await
        .unwrap();

    assert_eq!(profile.bio.as_deref(), Some("Hello"));
    let received = &mock_server.received_requests().await.unwrap()[0];
    let body: serde_json::Value = serde_json::from_slice(&received.body).unwrap();
    assert!(body.get("location").is_none());
}

#[tokio::test]
async fn test_update_profile_rejection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/users/u-1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "error": { "message": "Invalid phone number" }
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .update_profile("u-1", &ProfilePatch::default())
        .await
        .unwrap_err();
    assert_eq!(err, UpdateError::Rejected("Invalid phone number".to_string()));
}

#[tokio::test]
async fn test_ats_check_posts_multipart_form() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/ats/check-score"))
        .and(body_string_contains("name=\"resume\"; filename=\"cv.pdf\""))
        .and(body_string_contains("a@x.com"))
        .and(body_string_contains("Backend Engineer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "score": 84,
                "strengths": ["Quantified achievements"],
                "improvements": [],
                "missingKeywords": ["Kubernetes"]
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let submission = AtsSubmission {
        resume: ResumeFile::new("cv.pdf", b"%PDF-1.4\n...".to_vec()).unwrap(),
        email: "a@x.com".to_string(),
        job_title: None,
        company: None,
    }
    .targeting(Some("Backend Engineer".to_string()), None);

    let report = client(&mock_server)
        .check_ats_score(submission)
        .await
        .unwrap();
    assert_eq!(report.score, 84);
    assert_eq!(report.band(), ScoreBand::Excellent);
    assert_eq!(report.missing_keywords, vec!["Kubernetes"]);
}

#[tokio::test]
async fn test_ats_check_failure_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/ats/check-score"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "success": false,
            "error": "Could not extract text from PDF"
        })))
        .mount(&mock_server)
        .await;

    let submission = AtsSubmission {
        resume: ResumeFile::new("cv.pdf", b"%PDF-1.4".to_vec()).unwrap(),
        email: "a@x.com".to_string(),
        job_title: None,
        company: None,
    };
    let err = client(&mock_server)
        .check_ats_score(submission)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AtsError::Rejected("Could not extract text from PDF".to_string())
    );
}
