use structopt::StructOpt;

mod config;
mod proxy;
mod response;
mod server;
mod service;

const ABOUT: &str = "A proxy server that routes requests by regex over the request path.";

#[derive(Debug, StructOpt)]
#[structopt(about = ABOUT)]
#[structopt(setting = structopt::clap::AppSettings::UnifiedHelpMessage)]
pub struct Options {
    #[structopt(flatten)]
    config: config::Options,
    #[structopt(flatten)]
    server: server::Options,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().filter_or("PATH_ROUTER_LOG", "info"));
    log_panics::init();
    let options = Options::from_args();
    log::debug!("{:#?}", options);

    let config = config::parse(&options.config)?;

    let router = config.into_router();
    server::log_routes(&router);
    server::run(&options.server, router).await
}
