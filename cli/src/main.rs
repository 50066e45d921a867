mod commands;
mod terminal;

use commands::{CommandLine, Commands, info, scan};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.verbose)?;
    print::banner();

    match commands.command {
        Commands::Info => info::info(),
        Commands::Scan(args) => {
            print::header("starting scan");
            scan::scan(args).await
        }
    }
}
