use anyhow::Result;
use clap::{Parser, Subcommand};
use hy2sub::{convert, decode, sub_parse};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Convert a Hysteria2/Hy2 subscription into an encoded sing-box config (JSON result on stdout).
  Convert(convert::Args),

  /// Parse a Hysteria2/Hy2 subscription and output endpoint JSONL.
  Parse(sub_parse::Args),

  /// Decode an encoded config (or a stored short id) back to base64 text or JSON.
  Decode(decode::Args),
}

fn init_tracing() {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hy2sub=info,hy2sub_rs=info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();
  match cli.command {
    Commands::Convert(args) => convert::run(args).await,
    Commands::Parse(args) => sub_parse::run(args).await,
    Commands::Decode(args) => decode::run(args).await,
  }
}
