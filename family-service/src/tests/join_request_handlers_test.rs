use axum::http::StatusCode;
use famledger_shared::auth::create_test_request;
use famledger_shared::models::JoinRequestStatus;
use famledger_shared::store::{FamilyStore, JoinRequestStore, UserStore};
use famledger_shared::test_utils::http_test_utils::response_to_json;
use serde_json::json;
use tower::ServiceExt;

use super::{aged_request, create_test_app, test_family, test_user};

#[tokio::test]
async fn test_request_to_join() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let payload = json!({ "aliasName": "ABCDEF", "message": "let me in" });
    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests",
            "user-1",
            Some(payload),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json_resp = response_to_json(response).await;
    assert_eq!(json_resp["joinRequest"]["status"], "PENDING");
    assert_eq!(json_resp["joinRequest"]["familyId"], "fam-1");
    assert_eq!(json_resp["joinRequest"]["message"], "let me in");

    let stored = ctx.join_requests.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, JoinRequestStatus::Pending);
}

#[tokio::test]
async fn test_request_to_join_unknown_alias() {
    let (app, ctx) = create_test_app();

    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let payload = json!({ "aliasName": "NOSUCH" });
    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests",
            "user-1",
            Some(payload),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(ctx.join_requests.all().await.is_empty());
}

#[tokio::test]
async fn test_request_to_join_conflicts_when_already_in_family() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", Some("fam-x")))
        .await;

    let payload = json!({ "aliasName": "ABCDEF" });
    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests",
            "user-1",
            Some(payload),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(ctx.join_requests.all().await.is_empty());
}

#[tokio::test]
async fn test_request_to_join_conflicts_on_existing_pending() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;
    ctx.join_requests
        .seed(aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 1))
        .await;

    let payload = json!({ "aliasName": "ABCDEF" });
    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests",
            "user-1",
            Some(payload),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(ctx.join_requests.all().await.len(), 1);
}

#[tokio::test]
async fn test_sixth_attempt_within_window_is_throttled() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    // Attempt 1: the initial request.
    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/join-requests",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Attempts 2-5: four resends, all allowed.
    for attempt in 2..=5 {
        let response = app
            .clone()
            .oneshot(create_test_request(
                "POST",
                "/join-requests/resend",
                "user-1",
                Some(json!({ "aliasName": "ABCDEF" })),
            ))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "attempt {} should be allowed",
            attempt
        );
    }

    // Attempt 6: blocked with the throttle reason.
    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests/resend",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json_resp = response_to_json(response).await;
    assert_eq!(json_resp["error"], "MAX_RETRIES");
    assert!(!json_resp["message"].as_str().unwrap().is_empty());

    // Exactly five rows exist: one PENDING, four REJECTED.
    let rows = ctx.join_requests.all().await;
    assert_eq!(rows.len(), 5);
    let pending = rows
        .iter()
        .filter(|r| r.status == JoinRequestStatus::Pending)
        .count();
    let rejected = rows
        .iter()
        .filter(|r| r.status == JoinRequestStatus::Rejected)
        .count();
    assert_eq!(pending, 1);
    assert_eq!(rejected, 4);
}

#[tokio::test]
async fn test_cancelled_attempts_never_count() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    // A pile of cancelled attempts inside the window consumes no budget.
    for age in 1..=5 {
        ctx.join_requests
            .seed(aged_request(
                "user-1",
                "fam-1",
                JoinRequestStatus::Cancelled,
                age,
            ))
            .await;
    }

    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_attempts_outside_window_never_count() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    // Five old attempts, all past the 7-day cutoff.
    for i in 0..5 {
        ctx.join_requests
            .seed(aged_request(
                "user-1",
                "fam-1",
                JoinRequestStatus::Rejected,
                7 * 24 + 1 + i,
            ))
            .await;
    }

    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_resend_rejects_previous_pending_row() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let original = aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 2);
    let original_id = original.id.clone();
    ctx.join_requests.seed(original).await;

    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests/resend",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF", "message": "still keen" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json_resp = response_to_json(response).await;
    let new_id = json_resp["joinRequest"]["id"].as_str().unwrap().to_string();
    assert_ne!(new_id, original_id);

    // Exactly one PENDING row, and the immediately preceding row is REJECTED.
    let rows = ctx.join_requests.all().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(
        ctx.join_requests
            .get_join_request(&original_id)
            .await
            .unwrap()
            .status,
        JoinRequestStatus::Rejected
    );
    assert_eq!(
        ctx.join_requests.get_join_request(&new_id).await.unwrap().status,
        JoinRequestStatus::Pending
    );
}

#[tokio::test]
async fn test_resend_without_prior_attempt() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests/resend",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resend_by_request_id() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let original = aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 2);
    let original_id = original.id.clone();
    ctx.join_requests.seed(original).await;

    let path = format!("/join-requests/{}/resend", original_id);
    let response = app
        .oneshot(create_test_request("POST", &path, "user-1", Some(json!({}))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        ctx.join_requests
            .get_join_request(&original_id)
            .await
            .unwrap()
            .status,
        JoinRequestStatus::Rejected
    );
    assert_eq!(ctx.join_requests.all().await.len(), 2);
}

#[tokio::test]
async fn test_resend_by_request_id_is_owner_only() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let original = aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 2);
    let original_id = original.id.clone();
    ctx.join_requests.seed(original).await;

    let path = format!("/join-requests/{}/resend", original_id);
    let response = app
        .oneshot(create_test_request(
            "POST",
            &path,
            "somebody-else",
            Some(json!({})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(ctx.join_requests.all().await.len(), 1);
}

#[tokio::test]
async fn test_cancel_join_request() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let pending = aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 1);
    let pending_id = pending.id.clone();
    ctx.join_requests.seed(pending).await;

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/join-requests/cancel",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        ctx.join_requests
            .get_join_request(&pending_id)
            .await
            .unwrap()
            .status,
        JoinRequestStatus::Cancelled
    );

    // Nothing pending any more, so a second cancel finds nothing.
    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests/cancel",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancelling_frees_throttle_budget() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    // Four rejected attempts plus one pending: budget exhausted.
    for age in 2..=5 {
        ctx.join_requests
            .seed(aged_request(
                "user-1",
                "fam-1",
                JoinRequestStatus::Rejected,
                age,
            ))
            .await;
    }
    ctx.join_requests
        .seed(aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 1))
        .await;

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/join-requests/resend",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json_resp = response_to_json(response).await;
    assert_eq!(json_resp["error"], "MAX_RETRIES");

    // Cancelling the pending attempt removes it from every future count.
    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/join-requests/cancel",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(create_test_request(
            "POST",
            "/join-requests/resend",
            "user-1",
            Some(json!({ "aliasName": "ABCDEF" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_get_own_pending_returns_latest_per_family() {
    let (app, ctx) = create_test_app();

    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    // Family A: an old rejected attempt and a pending one.
    ctx.join_requests
        .seed(aged_request("user-1", "fam-a", JoinRequestStatus::Rejected, 48))
        .await;
    let pending_a = aged_request("user-1", "fam-a", JoinRequestStatus::Pending, 3);
    let pending_a_id = pending_a.id.clone();
    ctx.join_requests.seed(pending_a).await;

    // Family B: two pending rows of different ages; only the newest counts.
    ctx.join_requests
        .seed(aged_request("user-1", "fam-b", JoinRequestStatus::Pending, 20))
        .await;
    let newest_b = aged_request("user-1", "fam-b", JoinRequestStatus::Pending, 2);
    let newest_b_id = newest_b.id.clone();
    ctx.join_requests.seed(newest_b).await;

    // Somebody else's pending request must not leak in.
    ctx.join_requests
        .seed(aged_request("user-2", "fam-a", JoinRequestStatus::Pending, 1))
        .await;

    let response = app
        .oneshot(create_test_request(
            "GET",
            "/join-requests/pending",
            "user-1",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json_resp = response_to_json(response).await;
    let requests = json_resp["joinRequests"].as_array().unwrap();
    assert_eq!(requests.len(), 2);

    for request in requests {
        match request["familyId"].as_str().unwrap() {
            "fam-a" => assert_eq!(request["id"], pending_a_id.as_str()),
            "fam-b" => assert_eq!(request["id"], newest_b_id.as_str()),
            other => panic!("unexpected family in response: {}", other),
        }
    }
}

#[tokio::test]
async fn test_accept_join_request() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("head-1", "head-1@example.com", Some("fam-1")))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let pending = aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 1);
    let pending_id = pending.id.clone();
    ctx.join_requests.seed(pending).await;

    let path = format!("/join-requests/{}/accept", pending_id);
    let response = app
        .oneshot(create_test_request("POST", &path, "head-1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json_resp = response_to_json(response).await;
    assert_eq!(json_resp["joinRequest"]["status"], "ACCEPTED");

    let family = ctx.families.get_family("fam-1").await.unwrap();
    assert!(family.is_member("user-1"));
    assert_eq!(
        ctx.users.get_user("user-1").await.unwrap().family_id.as_deref(),
        Some("fam-1")
    );
}

#[tokio::test]
async fn test_accept_join_request_is_head_only() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family(
            "fam-1",
            "ABCDEF",
            "head-1",
            10,
            &["head-1", "member-1"],
        ))
        .await;
    ctx.users
        .seed(test_user("member-1", "member-1@example.com", Some("fam-1")))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let pending = aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 1);
    let pending_id = pending.id.clone();
    ctx.join_requests.seed(pending).await;

    let path = format!("/join-requests/{}/accept", pending_id);
    let response = app
        .oneshot(create_test_request("POST", &path, "member-1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!ctx.families.get_family("fam-1").await.unwrap().is_member("user-1"));
    assert_eq!(
        ctx.join_requests
            .get_join_request(&pending_id)
            .await
            .unwrap()
            .status,
        JoinRequestStatus::Pending
    );
}

#[tokio::test]
async fn test_accept_terminal_request_conflicts() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let rejected = aged_request("user-1", "fam-1", JoinRequestStatus::Rejected, 1);
    let rejected_id = rejected.id.clone();
    ctx.join_requests.seed(rejected).await;

    let path = format!("/join-requests/{}/accept", rejected_id);
    let response = app
        .oneshot(create_test_request("POST", &path, "head-1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_accept_into_full_family_conflicts() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family(
            "fam-1",
            "ABCDEF",
            "head-1",
            2,
            &["head-1", "member-1"],
        ))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let pending = aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 1);
    let pending_id = pending.id.clone();
    ctx.join_requests.seed(pending).await;

    let path = format!("/join-requests/{}/accept", pending_id);
    let response = app
        .oneshot(create_test_request("POST", &path, "head-1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The request is untouched and can be accepted later.
    assert_eq!(
        ctx.join_requests
            .get_join_request(&pending_id)
            .await
            .unwrap()
            .status,
        JoinRequestStatus::Pending
    );
}

#[tokio::test]
async fn test_accept_when_requester_joined_elsewhere_conflicts() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", Some("fam-other")))
        .await;

    let pending = aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 1);
    let pending_id = pending.id.clone();
    ctx.join_requests.seed(pending).await;

    let path = format!("/join-requests/{}/accept", pending_id);
    let response = app
        .oneshot(create_test_request("POST", &path, "head-1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(!ctx.families.get_family("fam-1").await.unwrap().is_member("user-1"));
}

#[tokio::test]
async fn test_reject_join_request() {
    let (app, ctx) = create_test_app();

    ctx.families
        .seed(test_family("fam-1", "ABCDEF", "head-1", 10, &["head-1"]))
        .await;
    ctx.users
        .seed(test_user("user-1", "user-1@example.com", None))
        .await;

    let pending = aged_request("user-1", "fam-1", JoinRequestStatus::Pending, 1);
    let pending_id = pending.id.clone();
    ctx.join_requests.seed(pending).await;

    let path = format!("/join-requests/{}/reject", pending_id);
    let response = app
        .oneshot(create_test_request("POST", &path, "head-1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        ctx.join_requests
            .get_join_request(&pending_id)
            .await
            .unwrap()
            .status,
        JoinRequestStatus::Rejected
    );
    assert_eq!(ctx.users.get_user("user-1").await.unwrap().family_id, None);
    assert!(!ctx.families.get_family("fam-1").await.unwrap().is_member("user-1"));
}
