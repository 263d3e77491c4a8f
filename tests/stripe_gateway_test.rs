use std::collections::HashMap;

use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_api::errors::ServiceError;
use storefront_api::gateway::{CreateSessionRequest, PaymentGateway, StripeGateway};

fn request(metadata: HashMap<String, String>) -> CreateSessionRequest {
    CreateSessionRequest {
        amount: dec!(59.97),
        currency: "AUD".to_string(),
        success_url: "http://localhost:5173/order-placed?success=true&session_id={CHECKOUT_SESSION_ID}".to_string(),
        cancel_url: "http://localhost:5173/place-order?cancel=true".to_string(),
        metadata,
    }
}

#[tokio::test]
async fn create_session_sends_a_single_order_total_line_in_cents() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(body_string_contains("mode=payment"))
        .and(body_string_contains("unit_amount%5D=5997"))
        .and(body_string_contains("Order+Total"))
        .and(body_string_contains("currency%5D=aud"))
        .and(body_string_contains("metadata%5BuserId%5D=guest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_abc",
            "url": "https://checkout.stripe.com/c/pay/cs_test_abc",
            "payment_status": "unpaid",
            "metadata": {"userId": "guest"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = StripeGateway::new("sk_test_123".to_string(), server.uri());
    let mut metadata = HashMap::new();
    metadata.insert("userId".to_string(), "guest".to_string());

    let session = gateway.create_session(request(metadata)).await.unwrap();
    assert_eq!(session.id, "cs_test_abc");
    assert_eq!(
        session.url.as_deref(),
        Some("https://checkout.stripe.com/c/pay/cs_test_abc")
    );
    assert!(!session.is_paid());
}

#[tokio::test]
async fn retrieve_session_returns_payment_state_and_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_test_abc"))
        .and(header("authorization", "Bearer sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_abc",
            "payment_status": "paid",
            "payment_intent": "pi_123",
            "metadata": {"amount": "59.97", "userId": "guest"},
        })))
        .mount(&server)
        .await;

    let gateway = StripeGateway::new("sk_test_123".to_string(), server.uri());
    let session = gateway.retrieve_session("cs_test_abc").await.unwrap();

    assert!(session.is_paid());
    assert_eq!(session.payment_intent.as_deref(), Some("pi_123"));
    assert_eq!(
        session.metadata.get("amount").map(String::as_str),
        Some("59.97")
    );
}

#[tokio::test]
async fn gateway_errors_surface_the_stripe_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"message": "No such checkout.session: 'cs_missing'"}
        })))
        .mount(&server)
        .await;

    let gateway = StripeGateway::new("sk_test_123".to_string(), server.uri());
    let err = gateway.retrieve_session("cs_missing").await.unwrap_err();

    match err {
        ServiceError::ExternalServiceError(message) => {
            assert!(message.contains("No such checkout.session"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
