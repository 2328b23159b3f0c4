#[macro_use]
extern crate log;

use clap::Parser;

use crate::result::Result;
use crate::viewer::Args;

mod config;
mod description;
mod error;
mod output;
mod peer;
mod result;
mod session;
mod signaller;
mod stats;
mod stream;
mod ui;
mod viewer;
#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();
    let config = config::load(&args.config_path())?;
    viewer::start_viewer(args, config).await
}
