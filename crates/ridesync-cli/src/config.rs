//! Command-line and environment configuration.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use ridesync_app::{Credentials, RuntimeConfig};
use ridesync_client::ClientConfig;
use ridesync_core::ChannelConfig;
use ridesync_proto::Role;

/// Session role as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Request rides.
    Rider,
    /// Accept and drive rides.
    Driver,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Rider => Role::Rider,
            RoleArg::Driver => Role::Driver,
        }
    }
}

/// Line-oriented ride client.
#[derive(Parser, Debug, Clone)]
#[command(name = "ridesync")]
#[command(about = "Ride lifecycle client over REST and WebSocket")]
pub struct Args {
    /// Bearer token for the socket and REST calls
    #[arg(long, env = "RIDESYNC_TOKEN")]
    pub token: String,

    /// Session role
    #[arg(long, env = "RIDESYNC_ROLE", value_enum, default_value_t = RoleArg::Rider)]
    pub role: RoleArg,

    /// WebSocket endpoint, without the token query
    #[arg(long, env = "RIDESYNC_WS_URL", default_value = "ws://localhost:5000/ws")]
    pub ws_url: String,

    /// REST base URL
    #[arg(long, env = "RIDESYNC_API_URL", default_value = "http://localhost:5000/api")]
    pub api_url: String,

    /// Log filter directive (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Seconds to wait before a reconnect attempt
    #[arg(long, default_value_t = 2)]
    pub reconnect_backoff_secs: u64,

    /// Consecutive reconnect attempts before giving up
    #[arg(long, default_value_t = 10)]
    pub max_reconnect_attempts: u32,

    /// Seconds a request may wait for a driver
    #[arg(long, default_value_t = 120)]
    pub match_timeout_secs: u64,

    /// Seconds between resyncs while a ride is active
    #[arg(long, default_value_t = 10)]
    pub poll_interval_secs: u64,

    /// Seconds before a REST call is abandoned as a network error
    #[arg(long, env = "RIDESYNC_REQUEST_TIMEOUT", default_value_t = 15)]
    pub request_timeout_secs: u64,
}

impl Args {
    /// Who we are to the backend.
    pub fn credentials(&self) -> Credentials {
        Credentials { token: self.token.clone(), role: self.role.into() }
    }

    /// Runtime settings, defaults overridden by the arguments.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            channel: ChannelConfig {
                endpoint: self.ws_url.clone(),
                reconnect_backoff: Duration::from_secs(self.reconnect_backoff_secs),
                max_reconnect_attempts: self.max_reconnect_attempts,
                ..ChannelConfig::default()
            },
            client: ClientConfig {
                match_timeout: Duration::from_secs(self.match_timeout_secs),
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                ..ClientConfig::default()
            },
            ..RuntimeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_fill_the_runtime_config() {
        let args = Args::try_parse_from([
            "ridesync",
            "--token",
            "t0k",
            "--role",
            "driver",
            "--ws-url",
            "ws://rides.test/ws",
            "--max-reconnect-attempts",
            "3",
        ])
        .unwrap();

        let credentials = args.credentials();
        assert_eq!(credentials.role, Role::Driver);
        assert_eq!(credentials.token, "t0k");

        let config = args.runtime_config();
        assert_eq!(config.channel.endpoint, "ws://rides.test/ws");
        assert_eq!(config.channel.max_reconnect_attempts, 3);
        assert_eq!(config.channel.auth_close_codes, ChannelConfig::default().auth_close_codes);
        assert_eq!(config.client.match_timeout, Duration::from_secs(120));
        assert_eq!(args.request_timeout_secs, 15);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let result = Args::try_parse_from(["ridesync", "--token", "t", "--role", "pilot"]);
        assert!(result.is_err());
    }
}
