mod artifacts;
mod commands;
mod terminal;

use commands::{CommandLine, Commands, check, run};
use gatescan_common::config::Config;
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.verbose);

    let cfg = Config {
        no_banner: commands.no_banner,
        quiet: commands.quiet,
    };
    print::banner(cfg.no_banner, cfg.quiet);

    match commands.command {
        Commands::Run(args) => run::run(args, &cfg).await,
        Commands::Check { scanner } => check::check(scanner, &cfg),
    }
}
