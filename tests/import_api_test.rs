// ==========================================
// ImportApi 集成测试（经 AppState 装配）
// ==========================================

mod test_helpers;

use catalog_import::app::AppState;
use catalog_import::config::config_keys;
use catalog_import::logging;
use catalog_import::{ApiError, ImportStatus};
use test_helpers::BIZ;

async fn create_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("api.db").to_string_lossy().to_string();
    let state = AppState::new(db_path).await.unwrap();
    (dir, state)
}

#[tokio::test]
async fn test_full_flow_through_api() {
    logging::init_test();
    let (_dir, state) = create_state().await;
    let api = state.import_api.clone();

    let validation = api
        .validate(BIZ, "catalog.csv", "text/csv", b"Product,Price,Qty\nWidget,9.99,5\nGadget,3.00,1\n".to_vec())
        .await
        .unwrap();
    assert_eq!(validation.status, ImportStatus::Validated);

    let started = api
        .start_processing(&validation.job_id, None, "")
        .await
        .unwrap();
    assert_eq!(started.status, ImportStatus::Processing);

    api.engine().wait_for(&validation.job_id).await.unwrap();
    let progress = api.get_progress(&validation.job_id).await.unwrap();
    assert_eq!(progress.status, ImportStatus::Completed);
    assert_eq!(progress.percent, 100);
    assert_eq!(progress.summary.created, 2);
    assert_eq!(state.catalog_repo.count_products(BIZ).unwrap(), 2);

    let history = api.list_history(BIZ, None, None).await.unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.page, 1);

    let rolled = api.rollback(&validation.job_id).await.unwrap();
    assert_eq!(rolled.status, ImportStatus::RolledBack);
    assert_eq!(state.catalog_repo.count_products(BIZ).unwrap(), 0);
}

#[tokio::test]
async fn test_api_error_mapping() {
    logging::init_test();
    let (_dir, state) = create_state().await;
    let api = state.import_api.clone();

    let err = api.get_job("missing").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(err.to_payload().code, "NOT_FOUND");

    let err = api.get_job("  ").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    let validation = api
        .validate(BIZ, "catalog.csv", "", b"Product,Price\nWidget,1.00\n".to_vec())
        .await
        .unwrap();

    let err = api
        .start_processing(&validation.job_id, None, "merge")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    let err = api.rollback(&validation.job_id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE_TRANSITION");

    let err = api.cancel(&validation.job_id).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_history_limit_is_clamped() {
    logging::init_test();
    let (_dir, state) = create_state().await;
    let api = state.import_api.clone();

    for _ in 0..3 {
        api.validate(BIZ, "c.csv", "", b"Product,Price\nA,1\n".to_vec())
            .await
            .unwrap();
    }

    let page = api.list_history(BIZ, Some(0), Some(10_000)).await.unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.limit, state.import_api.engine().config().history_max_limit);
    assert_eq!(page.jobs.len(), 3);

    let page = api.list_history(BIZ, Some(2), Some(-5)).await.unwrap();
    assert_eq!(page.limit, 1);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.jobs.len(), 1);
}

#[tokio::test]
async fn test_engine_reads_persisted_config() {
    logging::init_test();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cfg.db").to_string_lossy().to_string();

    {
        let state = AppState::new(db_path.clone()).await.unwrap();
        state
            .config_manager
            .set_config_value(config_keys::MAX_PARALLEL_ROWS, "8")
            .unwrap();
    }

    let state = AppState::new(db_path).await.unwrap();
    assert_eq!(state.import_api.engine().config().max_parallel_rows, 8);
}
