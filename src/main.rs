use log_filter::{cli_parse, run};

fn main() -> anyhow::Result<()> {
    let cli = cli_parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    run(&cli)
}
