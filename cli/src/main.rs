use clap::Parser;
use toolbox_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    toolbox_cli::init_tracing();
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    toolbox_cli::run(cli, &mut stdout).await
}
