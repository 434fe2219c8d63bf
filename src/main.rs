use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use signald_webhook::{
    AppContext, api,
    config::read_config_file,
    supervisor,
    templates::TemplateSet,
};
use tokio::spawn;
use tracing::{debug, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// [ip]:port to listen on for HTTP
    #[arg(long, default_value = "0.0.0.0:9716")]
    listen: SocketAddr,

    /// UNIX socket to connect to signald on
    #[arg(long, default_value = "/var/run/signald/signald.sock")]
    signald: PathBuf,

    /// YAML configuration file
    #[arg(long, short)]
    config: String,
}

fn init() {
    let filter = filter::Targets::new().with_target("signald_webhook", LevelFilter::TRACE);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.config)?;
    let receivers = config.receiver_map()?;
    debug!(receivers = receivers.len(), "configuration loaded");

    let templates = TemplateSet::from_globs(&config.templates)?;

    let context = Arc::new(AppContext::new(receivers, templates, args.signald));

    spawn(supervisor::run(Arc::clone(&context)));

    api::serve(args.listen, context).await
}
