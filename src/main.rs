use clap::Parser;
use dve::Cli;
use human_panic::setup_panic;

fn main() -> anyhow::Result<()> {
    setup_panic!();
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .init();
    cli.run()
}
