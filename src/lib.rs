use std::process::ExitCode;

use clap::Parser;

pub mod core;
pub mod models;
pub mod shell;
pub mod storage;

pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = shell::Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    ExitCode::from(runtime.block_on(shell::run(cli)))
}
