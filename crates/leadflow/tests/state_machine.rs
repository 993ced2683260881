mod common;

use std::sync::Arc;

use serial_test::serial;
use uuid::Uuid;

use common::{insert_lead_list, make_service, setup_db, RecordingLauncher};
use leadflow::config::LaunchFailurePolicy;
use leadflow::lead_lists::NewLeadList;
use leadflow::Error;

fn req(name: &str) -> NewLeadList {
    NewLeadList {
        name: name.to_string(),
        source_url: "https://example.com/leads.csv".to_string(),
    }
}

#[tokio::test]
#[serial]
async fn update_and_delete_are_allowed_only_while_pending_or_failed() {
    let pool = setup_db().await;
    let service = make_service(
        &pool,
        Arc::new(RecordingLauncher::default()),
        LaunchFailurePolicy::Rollback,
    );

    for status in ["pending", "failed"] {
        let id = insert_lead_list(&pool, status, Uuid::new_v4()).await;

        let updated = service.update(id, req("renamed")).await.unwrap();
        assert_eq!(updated.name, "renamed");

        service.delete(id).await.unwrap();
        assert!(matches!(service.get(id).await, Err(Error::NotFound(_))));
    }

    for status in ["processing", "completed"] {
        let id = insert_lead_list(&pool, status, Uuid::new_v4()).await;

        let err = service.update(id, req("renamed")).await.unwrap_err();
        assert!(matches!(err, Error::StateConflict { action: "update", .. }));

        let err = service.delete(id).await.unwrap_err();
        assert!(matches!(err, Error::StateConflict { action: "delete", .. }));

        // Record untouched by either refusal.
        let record = service.get(id).await.unwrap();
        assert_eq!(record.status, status);
        assert_eq!(record.name, "test list");
    }
}

#[tokio::test]
#[serial]
async fn reprocess_is_allowed_only_from_failed() {
    let pool = setup_db().await;
    let service = make_service(
        &pool,
        Arc::new(RecordingLauncher::default()),
        LaunchFailurePolicy::Rollback,
    );

    for status in ["pending", "processing", "completed"] {
        let id = insert_lead_list(&pool, status, Uuid::new_v4()).await;
        let err = service.reprocess(id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::StateConflict {
                action: "reprocess",
                ..
            }
        ));
    }

    let old_correlation = Uuid::new_v4();
    let id = insert_lead_list(&pool, "failed", old_correlation).await;

    let reprocessed = service.reprocess(id).await.unwrap();
    assert_eq!(reprocessed.status, "pending");
    assert_eq!(reprocessed.processed_count, 0);
    assert_eq!(reprocessed.error_message, None);
    assert_ne!(reprocessed.correlation_id, old_correlation);
}

#[tokio::test]
#[serial]
async fn missing_records_report_not_found_without_side_effects() {
    let pool = setup_db().await;
    let service = make_service(
        &pool,
        Arc::new(RecordingLauncher::default()),
        LaunchFailurePolicy::Rollback,
    );

    let ghost = Uuid::new_v4();
    assert!(matches!(service.get(ghost).await, Err(Error::NotFound(_))));
    assert!(matches!(
        service.update(ghost, req("x")).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(service.delete(ghost).await, Err(Error::NotFound(_))));
    assert!(matches!(
        service.reprocess(ghost).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn validation_rejects_blank_and_oversized_fields() {
    let pool = setup_db().await;
    let service = make_service(
        &pool,
        Arc::new(RecordingLauncher::default()),
        LaunchFailurePolicy::Rollback,
    );

    let err = service.create(req("")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = service.create(req(&"x".repeat(101))).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = service
        .create(NewLeadList {
            name: "ok".into(),
            source_url: "  ".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}
