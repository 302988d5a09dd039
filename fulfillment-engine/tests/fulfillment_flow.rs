// End-to-end fulfillment scenarios: the real consumer and HTTP ledger client
// against a mock ledger server, with dead letters captured in memory.

use async_trait::async_trait;
use bytes::Bytes;
use fulfillment_engine::config::LedgerConfig;
use fulfillment_engine::dead_letter::{DeadLetterPublisher, DeadLetterRecord};
use fulfillment_engine::ledger_client::HttpLedgerClient;
use fulfillment_engine::models::{FulfillmentMessage, TransferFulfillmentRequest};
use fulfillment_engine::nats_consumer::{FulfillmentConsumer, FulfillmentSettings};
use fulfillment_engine::{FailureKind, FulfillmentError};
use message_bus::{Delivery, Disposition, MessageHandler};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REDELIVERY_DELAY: Duration = Duration::from_millis(10_000);

#[derive(Default)]
struct CapturingPublisher {
    records: Mutex<Vec<DeadLetterRecord>>,
    unavailable: bool,
}

impl CapturingPublisher {
    fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterPublisher for CapturingPublisher {
    async fn publish(&self, record: &DeadLetterRecord) -> fulfillment_engine::Result<()> {
        if self.unavailable {
            return Err(FulfillmentError::Publish {
                kind: FailureKind::Transient,
                message: "timed out waiting for publish ack".to_string(),
            });
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct Harness {
    server: MockServer,
    dead_letters: Arc<CapturingPublisher>,
    consumer: FulfillmentConsumer,
}

impl Harness {
    async fn start() -> Self {
        Self::with_publisher(CapturingPublisher::default(), 100).await
    }

    async fn with_publisher(publisher: CapturingPublisher, max_redeliveries: u64) -> Self {
        let server = MockServer::start().await;
        let ledger = HttpLedgerClient::new(&LedgerConfig {
            ait_id: "27834".to_string(),
            post_transaction_url: format!("{}/Transaction", server.uri()),
            commit_reservation_url: format!("{}/CommitTransaction", server.uri()),
            connect_timeout_ms: 200,
            request_timeout_ms: 200,
            max_attempts: 3,
            backoff_initial_ms: 10,
            backoff_max_ms: 50,
            backoff_multiplier: 2.0,
        })
        .unwrap();

        let dead_letters = Arc::new(publisher);
        let consumer = FulfillmentConsumer::new(
            Arc::new(ledger),
            dead_letters.clone(),
            FulfillmentSettings {
                redelivery_delay: REDELIVERY_DELAY,
                max_redeliveries,
            },
        );

        Self {
            server,
            dead_letters,
            consumer,
        }
    }

    async fn ledger_responds(&self, endpoint: &str, status: &str) {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "serviceTimeElapsed": 1234,
                "payload": {"status": status}
            })))
            .mount(&self.server)
            .await;
    }

    async fn requests_to(&self, endpoint: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == endpoint)
            .count()
    }
}

fn request(amount: i64) -> TransferFulfillmentRequest {
    TransferFulfillmentRequest {
        version: Some("1_0".to_string()),
        from_account_number: Some("237489237492".to_string()),
        to_account_number: Some("8923478923".to_string()),
        request_uuid: Some(Uuid::new_v4()),
        reservation_uuid: Some(Uuid::new_v4()),
        transaction_amount: amount,
        transaction_meta_data_json: Some("{\"memo\": \"rent\"}".to_string()),
    }
}

fn delivery(request: TransferFulfillmentRequest, delivery_count: u64) -> Delivery {
    let message = FulfillmentMessage::new("234234", "sdjfsjdlfjslkdfj", "jskdfjsdjfls", request);
    Delivery {
        subject: "transfer.fulfillment.237489237492".to_string(),
        payload: Bytes::from(message.to_bytes().unwrap()),
        delivery_count,
    }
}

#[tokio::test]
async fn scenario_a_both_calls_succeed() {
    let harness = Harness::start().await;
    harness.ledger_responds("/Transaction", "SUCCESS").await;
    harness.ledger_responds("/CommitTransaction", "SUCCESS").await;

    let disposition = harness.consumer.handle(delivery(request(2500), 1)).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(harness.requests_to("/Transaction").await, 1);
    assert_eq!(harness.requests_to("/CommitTransaction").await, 1);
    assert!(harness.dead_letters.records().is_empty());
}

#[tokio::test]
async fn scenario_b_record_recovers_within_retries() {
    let harness = Harness::start().await;

    // First two attempts outlive the client timeout
    Mock::given(method("POST"))
        .and(path("/Transaction"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"payload": {"status": "SUCCESS"}}))
                .set_delay(Duration::from_millis(1000)),
        )
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&harness.server)
        .await;
    harness.ledger_responds("/Transaction", "SUCCESS").await;
    harness.ledger_responds("/CommitTransaction", "SUCCESS").await;

    let disposition = harness.consumer.handle(delivery(request(2500), 1)).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(harness.requests_to("/Transaction").await, 3);
    assert_eq!(harness.requests_to("/CommitTransaction").await, 1);
    assert!(harness.dead_letters.records().is_empty());
}

#[tokio::test]
async fn scenario_c_record_keeps_timing_out() {
    let harness = Harness::start().await;

    Mock::given(method("POST"))
        .and(path("/Transaction"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"payload": {"status": "SUCCESS"}}))
                .set_delay(Duration::from_millis(1000)),
        )
        .mount(&harness.server)
        .await;
    harness.ledger_responds("/CommitTransaction", "SUCCESS").await;

    let disposition = harness.consumer.handle(delivery(request(2500), 1)).await;

    assert_eq!(disposition, Disposition::Nak(REDELIVERY_DELAY));
    assert_eq!(harness.requests_to("/Transaction").await, 3);
    assert_eq!(harness.requests_to("/CommitTransaction").await, 0);
    assert!(harness.dead_letters.records().is_empty());
}

#[tokio::test]
async fn scenario_d_zero_amount_is_dead_lettered() {
    let harness = Harness::start().await;

    let disposition = harness.consumer.handle(delivery(request(0), 1)).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(harness.requests_to("/Transaction").await, 0);

    let records = harness.dead_letters.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key(), "237489237492");
    assert_eq!(
        records[0].failure_description,
        "Malformed message. Transaction Amount: must be greater than 0"
    );
}

#[tokio::test]
async fn scenario_e_commit_returns_unknown_status() {
    let harness = Harness::start().await;
    harness.ledger_responds("/Transaction", "SUCCESS").await;
    harness.ledger_responds("/CommitTransaction", "RESERVATION_NOT_FOUND").await;

    let original = request(2500);
    let disposition = harness.consumer.handle(delivery(original.clone(), 1)).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(harness.requests_to("/CommitTransaction").await, 1);

    let records = harness.dead_letters.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].original_payload.as_ref(), Some(&original));
    assert_eq!(records[0].failure_kind, "permanent");
    assert!(records[0].failure_description.contains("RESERVATION_NOT_FOUND"));
}

#[tokio::test]
async fn replayed_message_reports_already_applied() {
    let harness = Harness::start().await;
    harness.ledger_responds("/Transaction", "ALREADY_APPLIED").await;
    harness.ledger_responds("/CommitTransaction", "ALREADY_APPLIED").await;

    let disposition = harness.consumer.handle(delivery(request(2500), 2)).await;

    assert_eq!(disposition, Disposition::Ack);
    assert!(harness.dead_letters.records().is_empty());
}

#[tokio::test]
async fn same_message_handled_twice_completes_once() {
    let harness = Harness::start().await;

    // Ledger applies the first call and reports the replay afterwards
    for endpoint in ["/Transaction", "/CommitTransaction"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "serviceTimeElapsed": 1234,
                "payload": {"status": "SUCCESS"}
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&harness.server)
            .await;
        harness.ledger_responds(endpoint, "ALREADY_APPLIED").await;
    }

    let message = delivery(request(2500), 1);
    let redelivered = Delivery {
        delivery_count: 2,
        ..message.clone()
    };

    assert_eq!(harness.consumer.handle(message).await, Disposition::Ack);
    assert_eq!(harness.consumer.handle(redelivered).await, Disposition::Ack);

    assert_eq!(harness.requests_to("/Transaction").await, 2);
    assert_eq!(harness.requests_to("/CommitTransaction").await, 2);
    assert!(harness.dead_letters.records().is_empty());

    let bodies: Vec<serde_json::Value> = harness
        .server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/Transaction")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn dead_letter_outage_leaves_message_for_redelivery() {
    let harness = Harness::with_publisher(
        CapturingPublisher {
            unavailable: true,
            ..Default::default()
        },
        100,
    )
    .await;

    let disposition = harness.consumer.handle(delivery(request(-5), 1)).await;

    assert_eq!(disposition, Disposition::Nak(REDELIVERY_DELAY));
}

#[tokio::test]
async fn transient_failure_past_redelivery_limit_is_dead_lettered() {
    let harness = Harness::with_publisher(CapturingPublisher::default(), 3).await;

    Mock::given(method("POST"))
        .and(path("/Transaction"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(1000)))
        .mount(&harness.server)
        .await;

    let disposition = harness.consumer.handle(delivery(request(2500), 3)).await;
    assert_eq!(disposition, Disposition::Nak(REDELIVERY_DELAY));
    assert!(harness.dead_letters.records().is_empty());

    // Fourth delivery is the third redelivery
    let disposition = harness.consumer.handle(delivery(request(2500), 4)).await;

    assert_eq!(disposition, Disposition::Ack);
    let records = harness.dead_letters.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].failure_kind, "transient");
    assert_eq!(records[0].delivery_attempt, 4);
}

#[tokio::test]
async fn undecodable_body_is_dead_lettered_with_raw_content() {
    let harness = Harness::start().await;

    let disposition = harness
        .consumer
        .handle(Delivery {
            subject: "transfer.fulfillment.237489237492".to_string(),
            payload: Bytes::from_static(b"{\"producerAit\": 42"),
            delivery_count: 1,
        })
        .await;

    assert_eq!(disposition, Disposition::Ack);
    let records = harness.dead_letters.records();
    assert_eq!(records[0].raw_message.as_deref(), Some("{\"producerAit\": 42"));
    assert_eq!(records[0].key(), "unknown");
}
