mod common;

use chrono::Utc;
use serial_test::serial;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::{
    fast_correlator_settings, insert_lead_list, setup_db, test_channel_settings,
    CountingProcessor, FailingProcessor,
};
use leadflow::channel::{self, Consumer, Publisher};
use leadflow::correlator::{Correlator, RunOutcome};
use leadflow::lead_lists::{LeadList, LeadListCreatedMsg, LeadListsRepo};

fn created_msg(lead_list_id: Uuid, correlation_id: Uuid) -> LeadListCreatedMsg {
    LeadListCreatedMsg {
        lead_list_id,
        correlation_id,
        source_url: "https://example.com/leads.csv".to_string(),
        created_at: Utc::now(),
    }
}

async fn fetch_record(pool: &sqlx::PgPool, id: Uuid) -> LeadList {
    sqlx::query_as::<_, LeadList>("SELECT * FROM lead_lists WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn queue_depth(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM channel_messages")
        .fetch_one(pool)
        .await
        .unwrap()
}

fn correlator(
    pool: &sqlx::PgPool,
    lead_list_id: Uuid,
    correlation_id: Uuid,
    timeout_secs: u64,
) -> Correlator {
    let settings = test_channel_settings();
    Correlator::new(
        Consumer::with_pool(pool.clone(), &settings),
        LeadListsRepo::new(pool.clone()),
        lead_list_id,
        correlation_id,
        fast_correlator_settings(timeout_secs),
    )
}

#[tokio::test]
#[serial]
async fn matching_message_drives_the_record_to_completed() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let correlation_id = Uuid::new_v4();
    let id = insert_lead_list(&pool, "pending", correlation_id).await;

    Publisher::new(pool.clone())
        .publish(
            &settings.exchange,
            &settings.routing_key,
            &created_msg(id, correlation_id),
        )
        .await
        .unwrap();

    let processor = CountingProcessor::returning(42);
    let outcome = correlator(&pool, id, correlation_id, 5)
        .run(&processor, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            processed_count: 42
        }
    );

    let record = fetch_record(&pool, id).await;
    assert_eq!(record.status, "completed");
    assert_eq!(record.processed_count, 42);
    assert_eq!(record.error_message, None);

    assert_eq!(queue_depth(&pool).await, 0, "the matched message was acked");
}

#[tokio::test]
#[serial]
async fn foreign_message_is_requeued_and_never_applied() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let my_correlation = Uuid::new_v4();
    let id = insert_lead_list(&pool, "pending", my_correlation).await;

    // The only message in the queue belongs to some other job.
    let other_correlation = Uuid::new_v4();
    let other_id = insert_lead_list(&pool, "pending", other_correlation).await;
    Publisher::new(pool.clone())
        .publish(
            &settings.exchange,
            &settings.routing_key,
            &created_msg(other_id, other_correlation),
        )
        .await
        .unwrap();

    let processor = CountingProcessor::returning(1);
    let outcome = correlator(&pool, id, my_correlation, 1)
        .run(&processor, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::TimedOut);
    assert_eq!(*processor.calls.lock().unwrap(), 0);

    // The foreign message survived every requeue; its record is untouched.
    assert_eq!(queue_depth(&pool).await, 1);
    let other_record = fetch_record(&pool, other_id).await;
    assert_eq!(other_record.status, "pending");
}

#[tokio::test]
#[serial]
async fn timeout_marks_the_record_failed_with_a_timeout_reason() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let correlation_id = Uuid::new_v4();
    let id = insert_lead_list(&pool, "pending", correlation_id).await;

    let processor = CountingProcessor::returning(1);
    let outcome = correlator(&pool, id, correlation_id, 1)
        .run(&processor, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::TimedOut);

    let record = fetch_record(&pool, id).await;
    assert_eq!(record.status, "failed");
    let reason = record.error_message.unwrap();
    assert!(
        reason.contains("no matching job message"),
        "timeout reason must be distinguishable, got: {reason}"
    );
}

#[tokio::test]
#[serial]
async fn processing_failure_marks_the_record_failed_with_the_error() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let correlation_id = Uuid::new_v4();
    let id = insert_lead_list(&pool, "pending", correlation_id).await;

    Publisher::new(pool.clone())
        .publish(
            &settings.exchange,
            &settings.routing_key,
            &created_msg(id, correlation_id),
        )
        .await
        .unwrap();

    let outcome = correlator(&pool, id, correlation_id, 5)
        .run(&FailingProcessor, CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Failed { .. }));

    let record = fetch_record(&pool, id).await;
    assert_eq!(record.status, "failed");
    assert_eq!(
        record.error_message.as_deref(),
        Some("source returned a malformed row")
    );
}

#[tokio::test]
#[serial]
async fn duplicate_delivery_of_the_same_correlation_id_is_a_noop() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let correlation_id = Uuid::new_v4();
    let id = insert_lead_list(&pool, "pending", correlation_id).await;

    let publisher = Publisher::new(pool.clone());
    let msg = created_msg(id, correlation_id);
    publisher
        .publish(&settings.exchange, &settings.routing_key, &msg)
        .await
        .unwrap();
    publisher
        .publish(&settings.exchange, &settings.routing_key, &msg)
        .await
        .unwrap();

    let processor = CountingProcessor::returning(7);
    let outcome = correlator(&pool, id, correlation_id, 5)
        .run(&processor, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::Completed { processed_count: 7 });
    assert_eq!(
        *processor.calls.lock().unwrap(),
        1,
        "work must run exactly once"
    );

    let record = fetch_record(&pool, id).await;
    assert_eq!(record.status, "completed");

    // The duplicate is still sitting in the queue, untouched.
    assert_eq!(queue_depth(&pool).await, 1);
}

#[tokio::test]
#[serial]
async fn poison_message_is_dropped_and_the_search_continues() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let correlation_id = Uuid::new_v4();
    let id = insert_lead_list(&pool, "pending", correlation_id).await;

    // Undecodable body ahead of the real message.
    sqlx::query(
        "INSERT INTO channel_messages (id, queue, exchange, routing_key, body) VALUES ($1, $2, $3, $4, 'this is not json')",
    )
    .bind(Uuid::new_v4())
    .bind(&settings.queue)
    .bind(&settings.exchange)
    .bind(&settings.routing_key)
    .execute(&pool)
    .await
    .unwrap();

    Publisher::new(pool.clone())
        .publish(
            &settings.exchange,
            &settings.routing_key,
            &created_msg(id, correlation_id),
        )
        .await
        .unwrap();

    let processor = CountingProcessor::returning(3);
    let outcome = correlator(&pool, id, correlation_id, 5)
        .run(&processor, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::Completed { processed_count: 3 });
    assert_eq!(queue_depth(&pool).await, 0, "poison rejected permanently");
}

#[tokio::test]
#[serial]
async fn cancellation_exits_gracefully_without_touching_the_record() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let correlation_id = Uuid::new_v4();
    let id = insert_lead_list(&pool, "pending", correlation_id).await;

    let cancel = CancellationToken::new();
    let processor = CountingProcessor::returning(1);

    let correlator = correlator(&pool, id, correlation_id, 30);
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { correlator.run(&processor, cancel).await }
    });

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    cancel.cancel();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);

    let record = fetch_record(&pool, id).await;
    assert_eq!(record.status, "pending", "cancellation is not a failure");
    assert_eq!(record.error_message, None);
}

#[tokio::test]
#[serial]
async fn superseded_worker_never_writes_through_a_stale_correlation_id() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    // The record has been re-dispatched: its live correlation id is newer
    // than the one this worker (and its message) were born with.
    let stale_correlation = Uuid::new_v4();
    let id = insert_lead_list(&pool, "pending", Uuid::new_v4()).await;

    Publisher::new(pool.clone())
        .publish(
            &settings.exchange,
            &settings.routing_key,
            &created_msg(id, stale_correlation),
        )
        .await
        .unwrap();

    let processor = CountingProcessor::returning(9);
    let outcome = correlator(&pool, id, stale_correlation, 5)
        .run(&processor, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::Orphaned);
    assert_eq!(*processor.calls.lock().unwrap(), 0);

    let record = fetch_record(&pool, id).await;
    assert_eq!(record.status, "pending", "stale writes must be rejected");
}

#[tokio::test]
#[serial]
async fn concurrent_workers_on_a_shared_queue_each_apply_only_their_own_message() {
    let pool = setup_db().await;
    let settings = test_channel_settings();
    channel::declare_topology(&pool, &settings).await.unwrap();

    let corr_a = Uuid::new_v4();
    let corr_b = Uuid::new_v4();
    let id_a = insert_lead_list(&pool, "pending", corr_a).await;
    let id_b = insert_lead_list(&pool, "pending", corr_b).await;

    // B's message lands first, so worker A must skip past it.
    let publisher = Publisher::new(pool.clone());
    publisher
        .publish(&settings.exchange, &settings.routing_key, &created_msg(id_b, corr_b))
        .await
        .unwrap();
    publisher
        .publish(&settings.exchange, &settings.routing_key, &created_msg(id_a, corr_a))
        .await
        .unwrap();

    let processor_a = CountingProcessor::returning(11);
    let processor_b = CountingProcessor::returning(22);
    let correlator_a = correlator(&pool, id_a, corr_a, 10);
    let correlator_b = correlator(&pool, id_b, corr_b, 10);

    let (outcome_a, outcome_b) = tokio::join!(
        correlator_a.run(&processor_a, CancellationToken::new()),
        correlator_b.run(&processor_b, CancellationToken::new()),
    );

    assert_eq!(
        outcome_a.unwrap(),
        RunOutcome::Completed {
            processed_count: 11
        }
    );
    assert_eq!(
        outcome_b.unwrap(),
        RunOutcome::Completed {
            processed_count: 22
        }
    );

    let record_a = fetch_record(&pool, id_a).await;
    let record_b = fetch_record(&pool, id_b).await;
    assert_eq!(record_a.processed_count, 11);
    assert_eq!(record_b.processed_count, 22);
    assert_eq!(queue_depth(&pool).await, 0);
}
