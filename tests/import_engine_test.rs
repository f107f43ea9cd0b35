// ==========================================
// 导入引擎集成测试
// ==========================================
// 覆盖: validate → startProcessing → 结果汇总
//       行级故障隔离 / 结构性失败 / 确认映射 / 重复策略 / 历史分页
// ==========================================

mod test_helpers;

use catalog_import::domain::{ColumnMapping, UploadedFile};
use catalog_import::logging;
use catalog_import::{DuplicateAction, ImportError, ImportStatus, RowOutcome};
use std::sync::Arc;
use test_helpers::*;

fn mapping(pairs: &[(&str, &str)]) -> ColumnMapping {
    pairs
        .iter()
        .map(|(h, k)| (h.to_string(), k.to_string()))
        .collect()
}

// ==========================================
// 基本流程
// ==========================================

#[tokio::test]
async fn test_widget_row_is_created_with_suggested_mapping() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    let file = csv_file("Product,Price,Qty\nWidget,9.99,5\n");
    let validation = engine.validate(BIZ, &file).await.unwrap();

    assert_eq!(validation.status, ImportStatus::Validated);
    assert_eq!(
        validation.suggested_mapping,
        mapping(&[("Product", "name"), ("Price", "sellingPrice"), ("Qty", "quantity")])
    );
    assert!(validation.validation.is_valid);
    assert_eq!(validation.validation.total_rows, 1);
    assert_eq!(validation.sample_data.len(), 1);

    let started = engine
        .start_processing(&validation.job_id, None, DuplicateAction::Skip)
        .await
        .unwrap();
    assert_eq!(started.status, ImportStatus::Processing);
    assert!(started.started_at.is_some());

    let job = engine.wait_for(&validation.job_id).await.unwrap();
    assert_eq!(job.status, ImportStatus::Completed);
    assert_eq!(job.created_count, 1);
    assert_eq!(job.processed_rows, 1);
    assert!(job.completed_at.is_some());
    assert_eq!(job.results[0].status, RowOutcome::Created);

    let product_id = job.results[0].product_id.clone().unwrap();
    let product = env.product(&product_id).await.unwrap();
    assert_eq!(product.fields.name, "Widget");
    assert_eq!(product.fields.selling_price, 9.99);
    assert_eq!(product.fields.quantity, 5);
}

#[tokio::test]
async fn test_invalid_row_fails_alone() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    let mut content = String::from("Product,SKU,Price,Qty\n");
    for i in 1..=10 {
        let name = if i == 5 { String::new() } else { format!("Item {}", i) };
        content.push_str(&format!("{},SKU-{},{}.00,{}\n", name, i, i, i));
    }

    let validation = engine.validate(BIZ, &csv_file(&content)).await.unwrap();
    assert_eq!(validation.status, ImportStatus::Validated);
    assert!(!validation.validation.is_valid);
    assert_eq!(validation.validation.valid_rows, 9);
    assert_eq!(validation.validation.errors.len(), 1);
    assert_eq!(validation.validation.errors[0].row, 5);
    assert_eq!(validation.validation.errors[0].field, "name");

    engine
        .start_processing(&validation.job_id, None, DuplicateAction::Skip)
        .await
        .unwrap();
    let job = engine.wait_for(&validation.job_id).await.unwrap();

    assert_eq!(job.status, ImportStatus::Completed);
    assert_eq!(job.processed_rows, 10);
    assert_eq!(job.failed_count, 1);
    assert_eq!(job.created_count, 9);
    assert!(job.counters_consistent());

    let failed = &job.results[4];
    assert_eq!(failed.row, 5);
    assert_eq!(failed.status, RowOutcome::Failed);
    assert!(failed.error.as_deref().unwrap().contains("name"));
    assert_eq!(env.product_count(), 9);
}

#[tokio::test]
async fn test_results_follow_file_order_with_parallel_rows() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine_with(config_with_parallel(4));

    let job = import_and_wait(&engine, &generated_csv(23), "skip").await;

    assert_eq!(job.status, ImportStatus::Completed);
    assert_eq!(job.created_count, 23);
    assert!(job.counters_consistent());
    let rows: Vec<usize> = job.results.iter().map(|r| r.row).collect();
    assert_eq!(rows, (1..=23).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_store_rejection_is_row_level() {
    logging::init_test();
    let env = create_test_env();
    let store = FaultyStore::wrap(env.catalog.clone()).reject_name("Item 2");
    let engine = env.engine_with_store(std::sync::Arc::new(store), config_with_parallel(1));

    let job = import_and_wait(&engine, &generated_csv(3), "skip").await;

    assert_eq!(job.status, ImportStatus::Completed);
    assert_eq!(job.created_count, 2);
    assert_eq!(job.failed_count, 1);
    assert_eq!(job.results[1].status, RowOutcome::Failed);
    assert!(job.results[1].error.as_deref().unwrap().contains("rejected by store"));
}

// ==========================================
// 结构性失败
// ==========================================

#[tokio::test]
async fn test_missing_required_field_fails_job() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    // 没有任何列能映射到 sellingPrice
    let file = csv_file("Product,Colour\nWidget,red\n");
    let validation = engine.validate(BIZ, &file).await.unwrap();

    assert_eq!(validation.status, ImportStatus::Failed);
    assert!(validation.error_message.as_deref().unwrap().contains("sellingPrice"));
    assert_eq!(validation.headers, vec!["Product".to_string(), "Colour".to_string()]);

    let job = engine.get_job(&validation.job_id).await.unwrap();
    assert_eq!(job.status, ImportStatus::Failed);
    assert_eq!(job.processed_rows, 0);

    let err = engine
        .start_processing(&validation.job_id, None, DuplicateAction::Skip)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_empty_and_unsupported_files_fail_structurally() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    let header_only = engine
        .validate(BIZ, &csv_file("Product,Price\n"))
        .await
        .unwrap();
    assert_eq!(header_only.status, ImportStatus::Failed);

    let empty = engine.validate(BIZ, &csv_file("")).await.unwrap();
    assert_eq!(empty.status, ImportStatus::Failed);

    let pdf = UploadedFile::new("catalog.pdf", "application/pdf", b"%PDF-1.4".to_vec());
    let unsupported = engine.validate(BIZ, &pdf).await.unwrap();
    assert_eq!(unsupported.status, ImportStatus::Failed);
    assert!(unsupported.error_message.is_some());
}

#[tokio::test]
async fn test_validation_is_idempotent_per_file() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    let file = csv_file("Product,SKU,Price\nA,A-1,1.00\nB,A-1,-2\n");
    let first = engine.validate(BIZ, &file).await.unwrap();
    let second = engine.validate(BIZ, &file).await.unwrap();

    assert_ne!(first.job_id, second.job_id);
    assert_eq!(first.suggested_mapping, second.suggested_mapping);
    assert_eq!(first.validation, second.validation);
    assert_eq!(first.validation.warnings.len(), 1);
    assert_eq!(first.validation.errors.len(), 1);
}

#[tokio::test]
async fn test_storage_error_during_validation_fails_job() {
    logging::init_test();
    let env = create_test_env();
    let jobs = FaultyJobs::wrap(env.jobs.clone()).fail_staging();
    let engine = env.engine_with_jobs(Arc::new(jobs));

    let err = engine
        .validate(BIZ, &csv_file("Product,Price\nWidget,1.00\n"))
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::Repository(_)));

    // 作业不会停留在 validating
    let history = engine.list_history(BIZ, 1, 10).await.unwrap();
    assert_eq!(history.total, 1);
    let job = &history.jobs[0];
    assert_eq!(job.status, ImportStatus::Failed);
    assert!(job.completed_at.is_some());
    assert!(job.error_message.as_deref().unwrap().contains("disk full"));

    let err = engine
        .start_processing(&job.id, None, DuplicateAction::Skip)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ImportError::InvalidTransition {
            from: ImportStatus::Failed,
            to: ImportStatus::Processing
        }
    ));
    let err = engine.rollback(&job.id).await.unwrap_err();
    assert!(matches!(err, ImportError::NothingToRollback(_)));
}

// ==========================================
// 确认映射
// ==========================================

#[tokio::test]
async fn test_confirmed_mapping_rejections_keep_job_validated() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    let file = csv_file("Product,Price,Notes\nWidget,9.99,hello\n");
    let validation = engine.validate(BIZ, &file).await.unwrap();
    assert_eq!(validation.status, ImportStatus::Validated);

    // 目标字段不存在
    let unknown = mapping(&[("Product", "name"), ("Price", "sellingPrice"), ("Notes", "colour")]);
    let err = engine
        .start_processing(&validation.job_id, Some(unknown), DuplicateAction::Skip)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidMapping(_)));

    // 缺少必填字段
    let missing = mapping(&[("Product", "name")]);
    let err = engine
        .start_processing(&validation.job_id, Some(missing), DuplicateAction::Skip)
        .await
        .unwrap_err();
    match err {
        ImportError::MissingRequiredMapping(keys) => assert_eq!(keys, vec!["sellingPrice"]),
        other => panic!("unexpected error: {:?}", other),
    }

    let job = engine.get_job(&validation.job_id).await.unwrap();
    assert_eq!(job.status, ImportStatus::Validated);
}

#[tokio::test]
async fn test_confirmed_mapping_revalidates_rows() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    // 建议映射把 Notes 留空；确认映射将其作为描述导入
    let file = csv_file("Product,Price,Notes\nWidget,9.99,hand made\n");
    let validation = engine.validate(BIZ, &file).await.unwrap();
    assert!(!validation.suggested_mapping.contains_key("Notes"));

    let confirmed = mapping(&[
        ("Product", "name"),
        ("Price", "sellingPrice"),
        ("Notes", "description"),
    ]);
    engine
        .start_processing(&validation.job_id, Some(confirmed.clone()), DuplicateAction::Skip)
        .await
        .unwrap();
    let job = engine.wait_for(&validation.job_id).await.unwrap();

    assert_eq!(job.status, ImportStatus::Completed);
    assert_eq!(job.column_mapping, confirmed);
    let id = job.results[0].product_id.clone().unwrap();
    let product = env.product(&id).await.unwrap();
    assert_eq!(product.fields.description.as_deref(), Some("hand made"));
}

// ==========================================
// 重复策略
// ==========================================

#[tokio::test]
async fn test_skip_leaves_existing_record_untouched() {
    logging::init_test();
    let env = create_test_env();
    let existing = env.seed_product("Widget", Some("W-1"), 5.0, 1).await;
    let engine = env.engine();

    let file = csv_file("Product,SKU,Price\nWidget Deluxe,W-1,19.99\nGadget,G-1,3.50\n");
    let job = import_and_wait(&engine, &file, "skip").await;

    assert_eq!(job.skipped_count, 1);
    assert_eq!(job.created_count, 1);
    assert_eq!(job.results[0].status, RowOutcome::Skipped);
    assert_eq!(job.results[0].product_id.as_deref(), Some(existing.id.as_str()));

    let unchanged = env.product(&existing.id).await.unwrap();
    assert_eq!(unchanged.fields, existing.fields);
}

#[tokio::test]
async fn test_update_overlays_mapped_fields_and_keeps_pre_image() {
    logging::init_test();
    let env = create_test_env();
    let existing = env.seed_product("Widget", Some("W-1"), 5.0, 1).await;
    let engine = env.engine();

    let file = csv_file("Product,SKU,Price\nWidget v2,W-1,7.25\n");
    let job = import_and_wait(&engine, &file, "update").await;

    assert_eq!(job.updated_count, 1);
    let result = &job.results[0];
    assert_eq!(result.status, RowOutcome::Updated);
    assert_eq!(result.pre_image.as_ref(), Some(&existing.fields));

    let updated = env.product(&existing.id).await.unwrap();
    assert_eq!(updated.fields.name, "Widget v2");
    assert_eq!(updated.fields.selling_price, 7.25);
    // 未映射字段保持原值
    assert_eq!(updated.fields.quantity, existing.fields.quantity);
    assert_eq!(updated.fields.description, existing.fields.description);
    assert_eq!(env.product_count(), 1);
}

#[tokio::test]
async fn test_create_new_ignores_matches() {
    logging::init_test();
    let env = create_test_env();
    env.seed_product("Widget", Some("W-1"), 5.0, 1).await;
    let engine = env.engine();

    let file = csv_file("Product,SKU,Price\nWidget,W-1,5.00\n");
    let job = import_and_wait(&engine, &file, "create_new").await;

    assert_eq!(job.created_count, 1);
    assert_eq!(env.product_count(), 2);
}

#[tokio::test]
async fn test_repeated_rows_in_file_create_once() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    let file = csv_file("Product,SKU,Price\nWidget,W-1,5.00\nWidget,W-1,6.00\n");
    let validation = engine.validate(BIZ, &file).await.unwrap();
    assert!(validation
        .validation
        .warnings
        .iter()
        .any(|w| w.row == 2 && w.field == "sku"));

    engine
        .start_processing(&validation.job_id, None, DuplicateAction::Skip)
        .await
        .unwrap();
    let job = engine.wait_for(&validation.job_id).await.unwrap();

    assert_eq!(job.created_count, 1);
    assert_eq!(job.skipped_count, 1);
    assert_eq!(job.results[1].product_id, job.results[0].product_id);
    assert_eq!(env.product_count(), 1);
}

// ==========================================
// 历史分页
// ==========================================

#[tokio::test]
async fn test_history_pagination() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    for i in 0..5 {
        let file = csv_file(&format!("Product,Price\nItem {},1.00\n", i));
        engine.validate(BIZ, &file).await.unwrap();
    }
    engine
        .validate("other-business", &csv_file("Product,Price\nX,1.00\n"))
        .await
        .unwrap();

    let page1 = engine.list_history(BIZ, 1, 2).await.unwrap();
    assert_eq!(page1.total, 5);
    assert_eq!(page1.total_pages, 3);
    assert_eq!(page1.jobs.len(), 2);
    assert!(page1.jobs.iter().all(|j| j.business_id == BIZ));

    let page3 = engine.list_history(BIZ, 3, 2).await.unwrap();
    assert_eq!(page3.jobs.len(), 1);

    let beyond = engine.list_history(BIZ, 4, 2).await.unwrap();
    assert!(beyond.jobs.is_empty());

    assert!(matches!(
        engine.list_history(BIZ, 0, 2).await,
        Err(ImportError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.list_history(BIZ, 1, 0).await,
        Err(ImportError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_get_unknown_job() {
    logging::init_test();
    let env = create_test_env();
    let engine = env.engine();

    let err = engine.get_job("no-such-job").await.unwrap_err();
    assert!(matches!(err, ImportError::JobNotFound(_)));
}
