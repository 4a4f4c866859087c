use clap::Parser;
use log::info;
use std::sync::Arc;
use turtlebot::config::{Config, Opts, Settings};
use turtlebot::discord::DiscordChannel;
use turtlebot::ledger::WalletdClient;
use turtlebot::rain::RainService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opts::parse();
    let config = Config::parse_from_file(&opt.config);

    let ledger = Arc::new(WalletdClient::setup(&config.walletd, None)?);
    let discord = Arc::new(DiscordChannel::new(&config.discord)?);
    let settings = Arc::new(Settings::from_config(&config.rain));

    let rain = Arc::new(RainService::new(
        discord.clone(),
        ledger,
        discord,
        settings,
        config.discord.channel_id,
    ));

    // The chat routing layer feeds administrative commands and registration
    // messages into the service; standalone the daemon just runs the loop.
    rain.start().await;
    if rain.state() == turtlebot::state::RainState::Stopped {
        anyhow::bail!("rain service did not start, check the wallet daemon");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    rain.stop().await;
    Ok(())
}
