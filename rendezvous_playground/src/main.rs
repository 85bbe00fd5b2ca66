// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use std::env;
use std::time::Duration;

use clap::Parser;
use rendezvous_net::NetworkPort;

mod local;
mod remote;

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Serve a group registry over TCP
    Registry {
        /// The port to listen on
        #[arg(long, default_value_t = 7070)]
        port: NetworkPort,
    },
    /// Join a group through a TCP registry and print the assigned rank
    Join {
        /// The registry's address (host:port)
        #[arg(long)]
        registry: String,
        /// The group to join
        #[arg(long)]
        group: String,
        /// The number of members the group closes at
        #[arg(long)]
        size: usize,
        /// Tag to publish instead of the local address
        #[arg(long)]
        tag: Option<String>,
        /// Signal termination once the rank is known
        #[arg(long)]
        terminate: bool,
        /// Give up if the group doesn't close in time
        #[arg(long)]
        join_timeout_ms: Option<u64>,
    },
    /// Run a whole group in this process against an in-process registry
    Local {
        /// The group's name
        #[arg(long, default_value = "local")]
        group: String,
        /// The number of members
        #[arg(long, default_value_t = 4)]
        size: usize,
    },
}

/// Rendezvous playground
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Registry { port } => remote::serve_registry(port).await,
        Command::Join {
            registry,
            group,
            size,
            tag,
            terminate,
            join_timeout_ms,
        } => {
            remote::join_remote(
                registry,
                group,
                size,
                tag,
                terminate,
                join_timeout_ms.map(Duration::from_millis),
            )
            .await
        }
        Command::Local { group, size } => local::run_local_group(group, size).await,
    }
}

// MAIN //
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // if it's not set, set the log level to debug
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "debug");
    }
    env_logger::builder().format_timestamp_millis().init();

    tokio::select! {
        out = run(args.command) => {
            out?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("CTRL-C pressed, exiting");
        }
    }
    log::info!("Playground exiting");
    Ok(())
}
