/*
 * climate-hub-core
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::info;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use climate_hub_core::client::CloudApiClient;
use climate_hub_core::config::ClimateHubConfig;
use climate_hub_core::coordinator::Coordinator;
use climate_hub_core::device::Region;
use climate_hub_core::logger;
use climate_hub_core::push::CloudPushListener;

/// Core digital-twin service for a cloud-connected HVAC hub
#[derive(Parser, Debug)]
#[clap(author, about, long_about = None)]
struct Args {
    /// Vendor cloud region
    #[clap(long, value_enum, default_value = "eu")]
    region: RegionArg,

    /// Account email
    #[clap(long, env = "CLIMATE_HUB_EMAIL")]
    email: String,

    /// Account password
    #[clap(long, env = "CLIMATE_HUB_PASSWORD")]
    password: String,

    /// Device discovery poll interval, in seconds
    #[clap(long, default_value_t = 60)]
    discovery_interval: u64,

    /// Per-device state poll interval, in seconds
    #[clap(long, default_value_t = 60)]
    monitor_interval: u64,

    /// Enable debug output
    #[clap(long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum RegionArg {
    Eu,
    Usa,
    Cn,
}

impl From<RegionArg> for Region {
    fn from(value: RegionArg) -> Self {
        match value {
            RegionArg::Eu => Region::Eu,
            RegionArg::Usa => Region::Usa,
            RegionArg::Cn => Region::Cn,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd_args = Args::parse();
    logger::setup_logging(cmd_args.debug)?;
    info!("initializing climate hub core");

    let config = ClimateHubConfig::new(cmd_args.region.into(), cmd_args.email, cmd_args.password)
        .with_discovery_interval_secs(cmd_args.discovery_interval)?
        .with_monitor_interval_secs(cmd_args.monitor_interval)?
        .with_debug(cmd_args.debug);

    let api = CloudApiClient::new(config.region);
    api.login(&config.email, &config.password)
        .await
        .context("initial login to the vendor cloud API failed")?;
    info!("logged in to the vendor cloud API");

    let coordinator = Coordinator::with_intervals(
        api.clone(),
        config.discovery_interval,
        config.monitor_interval,
    );
    coordinator.start().await?;
    info!("device discovery and monitoring started");

    let (loginsession, userid) = api
        .session_credentials()
        .await
        .ok_or_else(|| anyhow!("missing session credentials after login"))?;
    let push_listener = CloudPushListener::new(config.region, loginsession, userid);
    let push_cancel = CancellationToken::new();
    let push_handle = tokio::spawn({
        let push_listener = push_listener.clone();
        let push_cancel = push_cancel.clone();
        async move { push_listener.run(push_cancel).await }
    });

    // Bridges the push relay into the coordinator: a push frame naming an
    // endpoint triggers that device's immediate refresh, everything else is
    // forwarded unchanged to the fan-out.
    let mut push_events = push_listener.subscribe();
    let push_bridge_handle = tokio::spawn({
        let coordinator = coordinator.clone();
        let push_cancel = push_cancel.clone();
        async move {
            loop {
                tokio::select! {
                    () = push_cancel.cancelled() => return,
                    message = push_events.recv() => {
                        match message {
                            Ok(message) => coordinator.dispatch_push_message(message).await,
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => return,
                        }
                    }
                }
            }
        }
    });

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received, stopping");

    push_cancel.cancel();
    let _ = push_handle.await;
    let _ = push_bridge_handle.await;
    coordinator.stop().await;

    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
    Ok(())
}
