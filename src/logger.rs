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

//! Logging setup. Wraps `env_logger` behind our own [`Log`] impl so the
//! level-selection logic (`--debug`/`CLIMATE_HUB_LOG`) lives in one place
//! and so chatter from HTTP/WebSocket library crates is raised one level
//! above whatever the application is logging at.

use std::str::FromStr;

use anyhow::Result;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError, info};

pub const LOG_ENV: &str = "CLIMATE_HUB_LOG";

pub fn setup_logging(debug: bool) -> Result<()> {
    let log_level = if debug {
        LevelFilter::Debug
    } else if let Ok(log_lvl) = std::env::var(LOG_ENV) {
        LevelFilter::from_str(&log_lvl).unwrap_or(LevelFilter::Info)
    } else {
        LevelFilter::Info
    };
    let logger = HubLogger::new(log_level);
    logger.init()?;
    info!("logging level: {}", log::max_level());
    Ok(())
}

/// Our own `Log` impl, mainly so library filtering lives next to the
/// application's filter instead of being set piecemeal at call sites.
struct HubLogger {
    max_level: LevelFilter,
    log_filter: env_logger::Logger,
    logger: env_logger::Logger,
}

impl HubLogger {
    fn new(max_level: LevelFilter) -> Self {
        // Keep HTTP/WebSocket client chatter one level above the app's own
        // level, same as raising zbus/tower_http in the upstream daemon.
        let lib_log_level = if max_level == LevelFilter::Trace {
            LevelFilter::Debug
        } else if max_level == LevelFilter::Debug {
            LevelFilter::Info
        } else {
            LevelFilter::Warn
        };
        let timestamp_precision = if max_level >= LevelFilter::Debug {
            env_logger::fmt::TimestampPrecision::Millis
        } else {
            env_logger::fmt::TimestampPrecision::Seconds
        };
        let log_filter = env_logger::Builder::from_env(LOG_ENV)
            .filter_level(max_level)
            .filter_module("reqwest", lib_log_level)
            .filter_module("hyper", lib_log_level)
            .filter_module("tokio_tungstenite", lib_log_level)
            .filter_module("tungstenite", lib_log_level)
            .build();
        let logger = env_logger::Builder::new()
            .filter_level(max_level)
            .format_timestamp(Some(timestamp_precision))
            .build();
        Self {
            max_level,
            log_filter,
            logger,
        }
    }

    fn init(self) -> Result<(), SetLoggerError> {
        log::set_max_level(self.max_level);
        log::set_boxed_logger(Box::new(self))
    }
}

impl Log for HubLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.log_filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.log_filter.matches(record) {
            self.logger.log(record);
        }
    }

    fn flush(&self) {}
}
