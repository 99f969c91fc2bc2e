// src/main.rs

use spine_items::item::ItemExecutionFinishState;
use spine_items::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(ItemExecutionFinishState::Failure | ItemExecutionFinishState::Stopped) => {
            std::process::exit(1);
        }
        Ok(_) => {}
        Err(err) => {
            eprintln!("spine-items error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<ItemExecutionFinishState> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
