// ==========================================
// 商品目录导入引擎 - 命令行入口
// ==========================================
// 用法: catalog-import <db_path> <business_id> <file> [skip|update|create_new]
// 流程: validate → startProcessing(建议映射) → 等待 → 输出作业汇总 JSON
// ==========================================

use catalog_import::app::{get_default_db_path, AppState};
use catalog_import::{logging, ImportStatus, APP_NAME, VERSION};
use std::path::Path;
use std::process::ExitCode;

const USAGE: &str = "用法: catalog-import <db_path|-> <business_id> <file> [skip|update|create_new]";

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    tracing::info!("{} v{}", APP_NAME, VERSION);

    match run(std::env::args().skip(1).collect()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "导入失败");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Vec<String>) -> anyhow::Result<ExitCode> {
    if args.len() < 3 || args.len() > 4 {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    }

    // "-" 表示使用默认数据库路径
    let db_path = if args[0] == "-" {
        get_default_db_path()
    } else {
        args[0].clone()
    };
    let business_id = &args[1];
    let file_path = Path::new(&args[2]);
    let action = args.get(3).map(String::as_str).unwrap_or("skip");

    let state = AppState::new(db_path).await?;
    let api = state.import_api.clone();

    let bytes = std::fs::read(file_path)?;
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args[2].clone());

    // 1. 校验
    let validation = api.validate(business_id, &file_name, "", bytes).await?;
    tracing::info!(
        job_id = %validation.job_id,
        headers = ?validation.headers,
        mapping = ?validation.suggested_mapping,
        "文件校验完成"
    );
    if validation.status != ImportStatus::Validated {
        println!("{}", serde_json::to_string_pretty(&validation)?);
        return Ok(ExitCode::FAILURE);
    }

    // 2. 执行（使用建议映射）
    api.start_processing(&validation.job_id, None, action).await?;
    let job = api.engine().wait_for(&validation.job_id).await?;

    // 3. 输出
    let output = serde_json::json!({
        "jobId": job.id,
        "status": job.status,
        "summary": job.summary(),
        "errors": job.errors,
        "warnings": job.warnings,
        "errorMessage": job.error_message,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(if job.status == ImportStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
