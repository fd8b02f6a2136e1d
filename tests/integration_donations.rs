// Integration tests for donations, card payments and the Stripe webhook

#[path = "common/mod.rs"]
mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use gifted_giving::core::models::DonationStatus;
use gifted_giving::payments::webhook::{sign_payload, SIGNATURE_HEADER};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use uuid::Uuid;

use common::*;

const WEBHOOK_SECRET: &str = "whsec_test_secret";

fn offline_donation(program_id: Option<Uuid>, amount_cents: i64) -> Value {
    json!({
        "program_id": program_id,
        "amount_cents": amount_cents,
        "donor_name": "Ada Lovelace",
        "donor_email": "ada@example.org",
        "payment_method": "bank_transfer",
        "message": "Keep it up",
    })
}

fn webhook_request(event: &Value) -> Request<Body> {
    let payload = event.to_string();
    let signature = sign_payload(payload.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp()).unwrap();
    Request::builder()
        .method("POST")
        .uri("/api/stripe/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(payload))
        .unwrap()
}

fn intent_event(event_id: &str, event_type: &str, payment_intent_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": {
            "id": payment_intent_id,
            "object": "payment_intent",
            "last_payment_error": { "message": "Your card has insufficient funds." },
        }},
    })
}

async fn complete(app: &TestApp, admin_token: &str, donation_id: &str) -> (StatusCode, Value) {
    app.put(
        &format!("/api/donations/{}/status", donation_id),
        json!({ "status": "completed" }),
        Some(admin_token),
    )
    .await
}

#[tokio::test]
async fn test_offline_donation_is_pending() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;
    let program_id = app.create_program(&admin_token, "Clean Water", None).await;

    let (status, body) = app.post("/api/donations", offline_donation(Some(program_id), 5_000), None).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["payment_method"], "bank_transfer");
    assert_eq!(body["frequency"], "one_time");
    assert_eq!(body["currency"], "usd");

    // pending donations do not move the program
    let program = app.store.program(program_id).unwrap();
    assert_eq!(program.raised_cents, 0);
}

#[tokio::test]
async fn test_card_donation_must_use_payment_intent() {
    let app = test_app().await;
    let mut body = offline_donation(None, 5_000);
    body["payment_method"] = json!("card");

    let (status, response) = app.post("/api/donations", body, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("create-payment-intent"));
}

#[tokio::test]
async fn test_donation_amount_bounds() {
    let app = test_app().await;

    let (status, body) = app.post("/api/donations", offline_donation(None, 99), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "amount_cents");

    let (status, _) = app.post("/api/donations", offline_donation(None, 10_000_001), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_paused_program_rejects_donations() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;
    let program_id = app.create_program(&admin_token, "Clean Water", None).await;
    app.put(
        &format!("/api/programs/{}", program_id),
        json!({ "status": "paused" }),
        Some(&admin_token),
    )
    .await;

    let (status, body) = app.post("/api/donations", offline_donation(Some(program_id), 5_000), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This program is not accepting donations");

    let (status, _) = app
        .post("/api/donations", offline_donation(Some(Uuid::new_v4()), 5_000), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_completion_updates_program_and_stats_once() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;
    let program_id = app.create_program(&admin_token, "Clean Water", Some(2_500)).await;

    // warm the stats cache so invalidation is exercised
    let (_, stats) = app.get("/api/donations/stats", None).await;
    assert_eq!(stats["total_raised_cents"], 0);

    let (_, donation) = app.post("/api/donations", offline_donation(Some(program_id), 10_000), None).await;
    let id = donation["id"].as_str().unwrap();

    let (status, body) = complete(&app, &admin_token, id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["donation"]["status"], "completed");

    let (status, body) = complete(&app, &admin_token, id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], false);

    let program = app.store.program(program_id).unwrap();
    assert_eq!(program.raised_cents, 10_000);
    assert_eq!(program.donor_count, 1);
    assert_eq!(program.beneficiaries_reached, 4);

    let (_, stats) = app.get("/api/donations/stats", None).await;
    assert_eq!(stats["total_raised_cents"], 10_000);
    assert_eq!(stats["donation_count"], 1);
    assert_eq!(stats["by_program"][0]["title"], "Clean Water");

    let emails = app.wait_for_emails(1).await;
    assert_eq!(emails[0].to, "ada@example.org");
    assert!(emails[0].html.contains("$100.00"));
    assert!(emails[0].html.contains("Clean Water"));
}

#[tokio::test]
async fn test_invalid_transition_is_conflict() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;
    let (_, donation) = app.post("/api/donations", offline_donation(None, 5_000), None).await;
    let id = donation["id"].as_str().unwrap();

    let (status, _) = app
        .put(
            &format!("/api/donations/{}/status", id),
            json!({ "status": "failed", "failure_reason": "Check bounced" }),
            Some(&admin_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = complete(&app, &admin_token, id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Cannot change donation status from failed to completed");
}

#[tokio::test]
async fn test_recent_donations_respect_anonymity() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;

    let mut anonymous = offline_donation(None, 5_000);
    anonymous["is_anonymous"] = json!(true);
    let (_, donation) = app.post("/api/donations", anonymous, None).await;
    complete(&app, &admin_token, donation["id"].as_str().unwrap()).await;

    let (status, body) = app.get("/api/donations/recent", None).await;
    assert_eq!(status, StatusCode::OK);
    let recent = body.as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["donor_name"], "Anonymous");
    assert!(recent[0].get("donor_email").is_none());
}

#[tokio::test]
async fn test_donation_visibility_and_mine() {
    let app = test_app().await;
    let (ada_token, _) = app.register("Ada Lovelace", "ada@example.org").await;
    let (grace_token, _) = app.register("Grace Hopper", "grace@example.org").await;

    // given before signing in, matched by email
    let (_, donation) = app.post("/api/donations", offline_donation(None, 5_000), None).await;
    let id = donation["id"].as_str().unwrap();

    let (status, _) = app.get(&format!("/api/donations/{}", id), Some(&ada_token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/api/donations/{}", id), Some(&grace_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, mine) = app.get("/api/donations/mine", Some(&ada_token)).await;
    assert_eq!(mine["total"], 1);
    let (_, mine) = app.get("/api/donations/mine", Some(&grace_token)).await;
    assert_eq!(mine["total"], 0);

    let (status, _) = app.get("/api/donations", Some(&ada_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_user_dashboard_summarizes_giving() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;
    let (ada_token, _) = app.register("Ada Lovelace", "ada@example.org").await;
    let program_id = app.create_program(&admin_token, "Clean Water", None).await;

    for amount in [5_000, 7_500] {
        let (_, donation) = app
            .post("/api/donations", offline_donation(Some(program_id), amount), Some(&ada_token))
            .await;
        complete(&app, &admin_token, donation["id"].as_str().unwrap()).await;
    }
    app.post("/api/donations", offline_donation(None, 1_000), Some(&ada_token)).await;

    let (status, body) = app.get("/api/users/dashboard", Some(&ada_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total_given_cents"], 12_500);
    assert_eq!(body["summary"]["donation_count"], 2);
    assert_eq!(body["summary"]["programs_supported"], 1);
    assert_eq!(body["recent_donations"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_payment_intent_then_webhook_completes_donation() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;
    let program_id = app.create_program(&admin_token, "Clean Water", None).await;

    let (status, body) = app
        .post(
            "/api/stripe/create-payment-intent",
            json!({
                "program_id": program_id,
                "amount_cents": 2_000,
                "donor_name": "Ada Lovelace",
                "donor_email": "ada@example.org",
                "frequency": "monthly",
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["client_secret"], "pi_test_1_secret_abc");
    let donation_id: Uuid = body["donation_id"].as_str().unwrap().parse().unwrap();

    {
        let intents = app.payments.intents.lock().unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].amount_cents, 2_000);
        assert_eq!(intents[0].donation_id, donation_id);
        assert_eq!(intents[0].description, "Donation to Clean Water");
    }

    let event = intent_event("evt_1", "payment_intent.succeeded", "pi_test_1");
    let (status, body) = app.send(webhook_request(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let donation = app.store.donation(donation_id).unwrap();
    assert_eq!(donation.status, DonationStatus::Completed);
    assert_eq!(app.store.program(program_id).unwrap().raised_cents, 2_000);

    // redelivery of the same event is acknowledged without effect
    let (status, _) = app.send(webhook_request(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.program(program_id).unwrap().raised_cents, 2_000);

    let metrics = app.state.metrics.render().unwrap();
    assert!(metrics.contains("gifted_giving_donations_completed_total 1"));
}

#[tokio::test]
async fn test_declined_card_marks_donation_failed() {
    let app = test_app().await;
    app.payments.decline.store(true, Ordering::SeqCst);

    let (status, body) = app
        .post(
            "/api/stripe/create-payment-intent",
            json!({ "amount_cents": 2_000, "donor_name": "Ada Lovelace", "donor_email": "ada@example.org" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "Your card was declined.");

    let donations = app.store.donations.lock().unwrap();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0].status, DonationStatus::Failed);
}

#[tokio::test]
async fn test_webhook_failure_event_records_reason() {
    let app = test_app().await;
    let (_, body) = app
        .post(
            "/api/stripe/create-payment-intent",
            json!({ "amount_cents": 2_000, "donor_name": "Ada Lovelace", "donor_email": "ada@example.org" }),
            None,
        )
        .await;
    let donation_id: Uuid = body["donation_id"].as_str().unwrap().parse().unwrap();

    let event = intent_event("evt_2", "payment_intent.payment_failed", "pi_test_1");
    let (status, _) = app.send(webhook_request(&event)).await;
    assert_eq!(status, StatusCode::OK);

    let donation = app.store.donation(donation_id).unwrap();
    assert_eq!(donation.status, DonationStatus::Failed);
    assert_eq!(donation.failure_reason.as_deref(), Some("Your card has insufficient funds."));
}

#[tokio::test]
async fn test_card_retry_after_decline_completes_donation() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;
    let program_id = app.create_program(&admin_token, "Clean Water", Some(1_000)).await;
    let (_, body) = app
        .post(
            "/api/stripe/create-payment-intent",
            json!({
                "program_id": program_id,
                "amount_cents": 3_000,
                "donor_name": "Ada Lovelace",
                "donor_email": "ada@example.org",
            }),
            None,
        )
        .await;
    let donation_id: Uuid = body["donation_id"].as_str().unwrap().parse().unwrap();

    let declined = intent_event("evt_decline", "payment_intent.payment_failed", "pi_test_1");
    app.send(webhook_request(&declined)).await;
    assert_eq!(app.store.donation(donation_id).unwrap().status, DonationStatus::Failed);

    // the donor confirms the same intent again with another card
    let succeeded = intent_event("evt_retry", "payment_intent.succeeded", "pi_test_1");
    let (status, _) = app.send(webhook_request(&succeeded)).await;
    assert_eq!(status, StatusCode::OK);

    let donation = app.store.donation(donation_id).unwrap();
    assert_eq!(donation.status, DonationStatus::Completed);
    assert_eq!(donation.failure_reason, None);
    assert!(donation.completed_at.is_some());

    let program = app.store.program(program_id).unwrap();
    assert_eq!(program.raised_cents, 3_000);
    assert_eq!(program.donor_count, 1);
    assert_eq!(program.beneficiaries_reached, 3);

    let emails = app.wait_for_emails(1).await;
    assert_eq!(emails[0].to, "ada@example.org");
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let app = test_app().await;
    let event = intent_event("evt_3", "payment_intent.succeeded", "pi_test_1");

    let request = Request::builder()
        .method("POST")
        .uri("/api/stripe/webhook")
        .header(SIGNATURE_HEADER, format!("t={},v1=deadbeef", Utc::now().timestamp()))
        .body(Body::from(event.to_string()))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/api/stripe/webhook")
        .body(Body::from(event.to_string()))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_unknown_intent_and_unhandled_type_are_acknowledged() {
    let app = test_app().await;

    let (status, _) = app
        .send(webhook_request(&intent_event("evt_4", "payment_intent.succeeded", "pi_unknown")))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(webhook_request(&intent_event("evt_5", "customer.created", "cus_1")))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refund_reverses_program_totals() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;
    let program_id = app.create_program(&admin_token, "Clean Water", Some(1_000)).await;

    let (_, body) = app
        .post(
            "/api/stripe/create-payment-intent",
            json!({
                "program_id": program_id,
                "amount_cents": 3_000,
                "donor_name": "Ada Lovelace",
                "donor_email": "ada@example.org",
            }),
            None,
        )
        .await;
    let donation_id = body["donation_id"].as_str().unwrap().to_string();

    // refunding before completion is refused
    let (status, _) = app
        .post(&format!("/api/stripe/refund/{}", donation_id), json!({}), Some(&admin_token))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.send(webhook_request(&intent_event("evt_6", "payment_intent.succeeded", "pi_test_1")))
        .await;
    assert_eq!(app.store.program(program_id).unwrap().beneficiaries_reached, 3);

    let (status, body) = app
        .post(&format!("/api/stripe/refund/{}", donation_id), json!({}), Some(&admin_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refund"]["status"], "succeeded");
    assert_eq!(body["donation"]["status"], "refunded");
    assert_eq!(*app.payments.refunds.lock().unwrap(), vec!["pi_test_1".to_string()]);

    let program = app.store.program(program_id).unwrap();
    assert_eq!(program.raised_cents, 0);
    assert_eq!(program.donor_count, 0);
    assert_eq!(program.beneficiaries_reached, 0);

    // Stripe's charge.refunded echo is a no-op
    let echo = json!({
        "id": "evt_7",
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_1", "payment_intent": "pi_test_1" } },
    });
    let (status, _) = app.send(webhook_request(&echo)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.program(program_id).unwrap().raised_cents, 0);
}

#[tokio::test]
async fn test_offline_donation_cannot_be_refunded_through_stripe() {
    let app = test_app().await;
    let (admin_token, _) = app.admin().await;
    let (_, donation) = app.post("/api/donations", offline_donation(None, 5_000), None).await;
    let id = donation["id"].as_str().unwrap();
    complete(&app, &admin_token, id).await;

    let (status, _) = app
        .post(&format!("/api/stripe/refund/{}", id), json!({}), Some(&admin_token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.payments.refunds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stripe_config_exposes_publishable_key_only() {
    let app = test_app().await;
    let (status, body) = app.get("/api/stripe/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "publishable_key": "pk_test_dummy" }));
}
