use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use evalgate_mcp_runtime::{ConfigurationFault, UpstreamConfig};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "evalgate",
    version,
    about = "evalgate: MCP gateway exposing the events API as tools over streamable HTTP"
)]
pub struct Cli {
    /// Interface to bind
    #[arg(long, env = "EVALGATE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Base URL of the upstream events API
    #[arg(long, env = "EVALGATE_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Bearer credential for the upstream events API
    #[arg(long, env = "EVALGATE_UPSTREAM_API_KEY", hide_env_values = true)]
    pub upstream_api_key: Option<String>,

    /// Per-request timeout for upstream calls, in seconds
    #[arg(long, env = "EVALGATE_UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    /// Seconds a session may sit idle before it is expired
    #[arg(
        long,
        env = "EVALGATE_SESSION_IDLE_TTL_SECS",
        default_value_t = 3600,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub session_idle_ttl_secs: u64,

    /// Comma-separated list of allowed browser origins
    #[arg(long, env = "EVALGATE_CORS_ORIGINS", default_value = "http://localhost:3000")]
    pub cors_origins: String,
}

impl Cli {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Missing values surface as `ConfigurationFault`, not as a clap usage error,
    /// so the process logs the fault before exiting.
    pub fn upstream_config(&self) -> Result<UpstreamConfig, ConfigurationFault> {
        UpstreamConfig::new(
            self.upstream_url.as_deref().unwrap_or_default(),
            self.upstream_api_key.as_deref().unwrap_or_default(),
            Duration::from_secs(self.upstream_timeout_secs),
        )
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_secs)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }
}
