use clap::Parser;
use entity_update::utils::error::{ErrorSeverity, UpdateError};
use entity_update::utils::{logger, validation::Validate};
use entity_update::{app, CliConfig, UpdateConfig};

fn exit_with(e: &UpdateError) -> ! {
    tracing::error!(
        "❌ Update failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 4,      // 找不到資料
        ErrorSeverity::Medium => 2,   // 表單或路由設定
        ErrorSeverity::High => 1,     // 流程或配置錯誤
        ErrorSeverity::Critical => 3, // 儲存或系統錯誤
    };
    std::process::exit(exit_code);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting entity-update");
    tracing::info!("📁 Loading configuration from: {}", cli.config);

    if let Err(e) = cli.validate() {
        exit_with(&e);
    }

    let config = match UpdateConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };
    if let Err(e) = config.validate() {
        exit_with(&e);
    }

    let params = match cli.load_params() {
        Ok(params) => params,
        Err(e) => exit_with(&e),
    };
    let options = cli.merge_options(config.options);
    tracing::debug!(params = params.len(), ?options, "📋 Request prepared");

    let result = if cli.delete {
        app::run_delete(config, &params, options).await
    } else {
        app::run_update(config, &params, options).await
    };

    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.valid {
                // 驗證失敗：結果已輸出，以非零狀態結束
                std::process::exit(5);
            }
        }
        Err(e) => exit_with(&e),
    }

    Ok(())
}
