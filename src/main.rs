use std::io;

use chrono::Utc;
use clap::Parser;
use lequery::app::{self, AppError, Context};
use lequery::backend::HttpBackend;
use lequery::cli::Cli;
use lequery::config::{build_config, config_path, load_file_config};
use lequery::format::Palette;
use lequery::logging::init_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Some(path) = config_path(&cli) else {
        eprintln!("le-query: cannot determine the config directory, pass --config <path>");
        std::process::exit(1);
    };

    let file_cfg = match load_file_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            app::report_error(&mut io::stderr(), &AppError::Config(e));
            std::process::exit(1);
        }
    };

    let app_config = build_config(&cli, &file_cfg);
    tracing::debug!(?app_config, "effective config");

    let palette = Palette::detect(app_config.color);
    let backend = HttpBackend::new(app_config.api_url.as_str());

    let ctx = Context {
        config: &app_config,
        config_path: &path,
        accounts: &file_cfg.accounts,
        backend: &backend,
        palette: &palette,
        now: Utc::now(),
    };

    let code = app::run(&cli, ctx, &mut io::stdout(), &mut io::stderr()).await;
    std::process::exit(code);
}
