mod common;

use std::time::Duration;

use chrono::Utc;
use serial_test::serial;
use uuid::Uuid;

use common::{setup_db, test_channel_settings};
use leadflow::channel::{self, decode_created_msg, Consumer, Publisher, RetryPublisher};
use leadflow::lead_lists::LeadListCreatedMsg;

fn msg() -> LeadListCreatedMsg {
    LeadListCreatedMsg {
        lead_list_id: Uuid::new_v4(),
        correlation_id: Uuid::new_v4(),
        source_url: "https://example.com/leads.csv".to_string(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[serial]
async fn publish_fans_out_only_to_queues_with_matching_bindings() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    // Wildcard binding on a second queue.
    sqlx::query(
        "INSERT INTO channel_bindings (queue, exchange, routing_key) VALUES ('audit', $1, 'leadlist.*')",
    )
    .bind(&settings.exchange)
    .execute(&pool)
    .await
    .unwrap();

    let publisher = Publisher::new(pool.clone());

    let n = publisher
        .publish(&settings.exchange, &settings.routing_key, &msg())
        .await
        .unwrap();
    assert_eq!(n, 2, "worker queue and wildcard audit queue");

    let n = publisher
        .publish(&settings.exchange, "other.topic", &msg())
        .await
        .unwrap();
    assert_eq!(n, 0, "unbound routing key is dropped");
}

#[tokio::test]
#[serial]
async fn consume_ack_and_requeue_follow_queue_semantics() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let publisher = Publisher::new(pool.clone());
    let first = msg();
    let second = msg();
    publisher
        .publish(&settings.exchange, &settings.routing_key, &first)
        .await
        .unwrap();
    publisher
        .publish(&settings.exchange, &settings.routing_key, &second)
        .await
        .unwrap();

    let consumer = Consumer::with_pool(pool.clone(), &settings);

    // Oldest first.
    let d1 = consumer.fetch_one().await.unwrap().unwrap();
    assert_eq!(
        decode_created_msg(&d1.body).unwrap().correlation_id,
        first.correlation_id
    );

    // Requeue sends it to the back: the next fetch sees the second message.
    consumer.nack(&d1, true).await.unwrap();
    let d2 = consumer.fetch_one().await.unwrap().unwrap();
    assert_eq!(
        decode_created_msg(&d2.body).unwrap().correlation_id,
        second.correlation_id
    );
    consumer.ack(&d2).await.unwrap();

    // The requeued first message comes around again, marked redelivered.
    let d3 = consumer.fetch_one().await.unwrap().unwrap();
    assert_eq!(
        decode_created_msg(&d3.body).unwrap().correlation_id,
        first.correlation_id
    );
    assert!(d3.redelivered());

    // Permanent rejection removes it for good.
    consumer.nack(&d3, false).await.unwrap();
    assert!(consumer.fetch_one().await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn prefetch_window_limits_unacked_deliveries() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let publisher = Publisher::new(pool.clone());
    publisher
        .publish(&settings.exchange, &settings.routing_key, &msg())
        .await
        .unwrap();
    publisher
        .publish(&settings.exchange, &settings.routing_key, &msg())
        .await
        .unwrap();

    let consumer = Consumer::with_pool(pool.clone(), &settings);

    let d1 = consumer.fetch_one().await.unwrap().unwrap();
    assert!(
        consumer.fetch_one().await.unwrap().is_none(),
        "window of one in-flight message"
    );

    consumer.ack(&d1).await.unwrap();
    assert!(consumer.fetch_one().await.unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn expired_visibility_window_releases_a_stuck_delivery() {
    let pool = setup_db().await;
    let mut settings = test_channel_settings();
    settings.visibility_secs = 1;
    channel::declare_topology(&pool, &settings).await.unwrap();

    Publisher::new(pool.clone())
        .publish(&settings.exchange, &settings.routing_key, &msg())
        .await
        .unwrap();

    // First consumer leases the message and crashes without acking.
    let crashed = Consumer::with_pool(pool.clone(), &settings);
    let _abandoned = crashed.fetch_one().await.unwrap().unwrap();

    let other = Consumer::with_pool(pool.clone(), &settings);
    assert!(other.fetch_one().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let redelivered = other.fetch_one().await.unwrap().unwrap();
    assert!(redelivered.redelivered());
}

#[tokio::test]
#[serial]
async fn round_trip_preserves_fields_regardless_of_casing() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let original = msg();
    Publisher::new(pool.clone())
        .publish(&settings.exchange, &settings.routing_key, &original)
        .await
        .unwrap();

    let consumer = Consumer::with_pool(pool.clone(), &settings);
    let delivery = consumer.fetch_one().await.unwrap().unwrap();
    assert_eq!(decode_created_msg(&delivery.body).unwrap(), original);
    consumer.ack(&delivery).await.unwrap();

    // A producer with different casing conventions is decoded identically.
    let drifted = format!(
        r#"{{"LeadListId":"{}","CORRELATIONID":"{}","sourceUrl":"{}","createdat":"{}"}}"#,
        original.lead_list_id,
        original.correlation_id,
        original.source_url,
        original.created_at.to_rfc3339(),
    );
    sqlx::query(
        "INSERT INTO channel_messages (id, queue, exchange, routing_key, body) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(&settings.queue)
    .bind(&settings.exchange)
    .bind(&settings.routing_key)
    .bind(&drifted)
    .execute(&pool)
    .await
    .unwrap();

    let delivery = consumer.fetch_one().await.unwrap().unwrap();
    let decoded = decode_created_msg(&delivery.body).unwrap();
    assert_eq!(decoded.lead_list_id, original.lead_list_id);
    assert_eq!(decoded.correlation_id, original.correlation_id);
    assert_eq!(decoded.source_url, original.source_url);
}

#[tokio::test]
#[serial]
async fn delayed_redelivery_hides_the_message_until_its_ttl_expires() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let retry = RetryPublisher::new(Publisher::new(pool.clone()), &settings);
    let n = retry
        .publish_for_retry(&settings.routing_key, &msg(), Duration::from_millis(700))
        .await
        .unwrap();
    assert_eq!(n, 1, "retry exchange routes back into the worker queue");

    let consumer = Consumer::with_pool(pool.clone(), &settings);
    assert!(
        consumer.fetch_one().await.unwrap().is_none(),
        "not visible before the TTL"
    );

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(consumer.fetch_one().await.unwrap().is_some());
}
