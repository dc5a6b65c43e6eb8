//! Scenario: Twilio sender against a mock HTTP server
//!
//! # Invariants under test
//!
//! 1. One send is one form-encoded POST to the account's Messages resource,
//!    authenticated with HTTP basic auth (sid:token), carrying From/To/Body.
//! 2. A 4xx answer becomes `DeliveryError::Rejected` with Twilio's message.
//! 3. An unreachable endpoint becomes `DeliveryError::Transport`.

use httpmock::prelude::*;
use kdw_notify::TwilioSender;
use kdw_reconcile::{DeliveryError, NotificationSender, OutboundMessage};
use serde_json::json;

fn message() -> OutboundMessage {
    OutboundMessage {
        from: "+15550000001".to_string(),
        to: "+15550000002".to_string(),
        body: "Faker#KR1 just went negative.".to_string(),
    }
}

#[tokio::test]
async fn posts_form_with_basic_auth() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/2010-04-01/Accounts/AC0001/Messages.json")
                // base64("AC0001:tok")
                .header("authorization", "Basic QUMwMDAxOnRvaw==")
                .header("content-type", "application/x-www-form-urlencoded")
                .x_www_form_urlencoded_tuple("From", "+15550000001")
                .x_www_form_urlencoded_tuple("To", "+15550000002")
                .x_www_form_urlencoded_tuple("Body", "Faker#KR1 just went negative.");
            then.status(201).json_body(json!({ "sid": "SM1", "status": "queued" }));
        })
        .await;

    let sender =
        TwilioSender::new_with_base_url("AC0001".to_string(), "tok".to_string(), server.base_url());
    sender.send(&message()).await.unwrap();
    m.assert_async().await;
}

#[tokio::test]
async fn rejection_carries_twilio_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(400).json_body(json!({
                "code": 21211,
                "message": "The 'To' number +15550000002 is not a valid phone number.",
                "status": 400
            }));
        })
        .await;

    let sender =
        TwilioSender::new_with_base_url("AC0001".to_string(), "tok".to_string(), server.base_url());
    let err = sender.send(&message()).await.unwrap_err();
    assert_eq!(
        err,
        DeliveryError::Rejected {
            status: 400,
            body: "code=21211 The 'To' number +15550000002 is not a valid phone number.".to_string()
        }
    );
}

#[tokio::test]
async fn unreachable_is_transport_error() {
    // Port 9 (discard) on localhost: nothing listens there in test environments.
    let sender = TwilioSender::new_with_base_url(
        "AC0001".to_string(),
        "tok".to_string(),
        "http://127.0.0.1:9".to_string(),
    );
    let err = sender.send(&message()).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Transport(_)));
}
