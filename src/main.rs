use clap::Parser;
use imgsearch::Opts;
use imgsearch::cli::SubCommandExtend;
use imgsearch::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Init(cmd) => cmd.run(&opts).await,
        SubCommand::Add(cmd) => cmd.run(&opts).await,
        SubCommand::Search(cmd) => cmd.run(&opts).await,
        SubCommand::Delete(cmd) => cmd.run(&opts).await,
        SubCommand::Count(cmd) => cmd.run(&opts).await,
    }
}
