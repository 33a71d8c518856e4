#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::similar_names)]

//! The `kassenbuch` ledger server.
//!
//! Serves a fresh ledger (only the genesis block) on port 8888 unless configured otherwise.

use kassenbuch::{config::Config, server, Error, Server};
use std::{net::IpAddr, path::PathBuf, process};
use structopt::StructOpt;

// https://crates.io/crates/structopt

#[derive(StructOpt, Debug)]
struct Opt {
    /// Path to a TOML configuration file.
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// The port to listen on.
    #[structopt(short, long)]
    port: Option<u16>,

    /// The IP address to listen on.
    #[structopt(short, long)]
    bind: Option<IpAddr>,

    /// Number of clients served in parallel.
    #[structopt(short, long)]
    workers: Option<usize>,
}

fn main() {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    log::debug!("Command line arguments: {:#?}", opt);

    if let Err(err) = run(opt) {
        log::error!("{}", err);
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), Error> {
    let mut config = match &opt.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(ip) = opt.bind {
        config.bind_address.set_ip(ip);
    }
    if let Some(port) = opt.port {
        config.bind_address.set_port(port);
    }
    if let Some(workers) = opt.workers {
        config.workers = workers;
    }
    config.validate()?;
    log::debug!("Configuration: {:#?}", config);

    let listener = server::bind(config.bind_address)?;
    Server::new(config).serve(&listener)
}
