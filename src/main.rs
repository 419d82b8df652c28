// src/main.rs

use goforge::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("goforge error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let verbose = matches!(&args.command, cli::Commands::Watch(w) if w.verbose);
    logging::init_logging(args.log_level, verbose)?;
    run(args).await
}
