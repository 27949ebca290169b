use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = framegate::cli::Cli::parse();
    if let Err(e) = framegate::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
