use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use pushgate::api;
use pushgate::config::{self, Config};
use pushgate::push::WebPush;
use pushgate::static_files::StaticFiles;
use pushgate::store::FileStore;
use pushgate::vapid::VapidKey;
use pushgate::Server;

fn main() -> ExitCode {
    let config = Config::parse();
    config::init_tracing(config.dev);

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(workers) = config.workers {
        runtime.worker_threads(workers.max(1));
    }
    let runtime = match runtime.build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pushgate stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(&config.db_path).await?;
    let vapid = VapidKey::load_or_generate(&config.key_path).await?;
    let pusher = WebPush::new(&vapid, config.vapid_subject.clone())?;
    info!(public_key = %vapid.public_key(), db = %store.dir().display(), "resources ready");

    let dispatcher = api::app(
        Box::new(store),
        vapid,
        Box::new(pusher),
        StaticFiles::new(&config.public_dir),
    )
    .api_prefix(config.api_prefix.clone())
    .build()?;

    Server::bind(config.socket_addr()).serve(dispatcher).await?;
    info!("shutdown complete");
    Ok(())
}
