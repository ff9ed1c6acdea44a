// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The mine-and-die server binary: composition root for the hub, the
//! simulation loop, and the HTTP/WebSocket surface.
//!
//! Exit codes: 0 clean shutdown, 1 config error, 2 bind error.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn,
    clippy::use_self
)]

mod hub;
mod http;
mod ws;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lode_core::config::WorldConfig;

use crate::hub::Hub;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative mine-and-die game server")]
struct Args {
    /// TCP listener for HTTP and WebSocket clients.
    #[arg(long, default_value = "0.0.0.0:8790")]
    addr: SocketAddr,
    /// Simulation rate in ticks per second.
    #[arg(long, default_value_t = lode_core::config::DEFAULT_TICK_RATE)]
    tick_rate: u32,
    /// Seed for all deterministic world streams.
    #[arg(long, default_value = "prospect")]
    world_seed: String,
    /// Ticks between periodic keyframes.
    #[arg(long, default_value_t = 30)]
    keyframe_interval: u32,
    /// Keyframe ring capacity.
    #[arg(long, default_value_t = 32)]
    max_keyframes: usize,
    /// Keyframe retention age, seconds.
    #[arg(long, default_value_t = 60)]
    max_keyframe_age: u64,
}

impl Args {
    fn into_config(self) -> WorldConfig {
        WorldConfig {
            seed: self.world_seed,
            tick_rate: self.tick_rate,
            keyframe_interval: self.keyframe_interval,
            max_keyframes: self.max_keyframes,
            max_keyframe_age_ms: self.max_keyframe_age.saturating_mul(1000),
            ..WorldConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let addr = args.addr;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config();
    if let Err(err) = config.validate() {
        error!(%err, "invalid configuration");
        return ExitCode::from(1);
    }

    let hub = match Hub::new(config) {
        Ok(hub) => Arc::new(hub),
        Err(err) => {
            error!(%err, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, %addr, "failed to bind");
            return ExitCode::from(2);
        }
    };

    // Simulation loop: one task owns the tick cadence; catch-up inside the
    // engine bounds the work after a stall.
    let loop_hub = hub.clone();
    let tick_millis = hub.tick_millis().await;
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(tick_millis));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            loop_hub.tick().await;
        }
    });

    info!(%addr, "lode server listening");
    let app = http::router(hub);
    let serve = axum::serve(listener, app.into_make_service());

    let result = tokio::select! {
        result = serve => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "server error");
            ExitCode::from(2)
        }
    }
}
