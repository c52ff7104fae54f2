use clap::Parser;
use std::net::SocketAddr;

/// CLI arguments for the relay hub.
#[derive(Parser, Debug, Clone)]
#[command(name = "trios")]
#[command(about = "trio relay hub server")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:8765", env = "TRIOS_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "TRIOS_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Comma-delimited set of accepted tokens for role "b".
    #[arg(long, default_value = "demo-token", env = "TRIOS_B_TOKENS")]
    pub b_tokens: String,
    /// Maximum total concurrent connections.
    #[arg(long, default_value = "1024", env = "TRIOS_MAX_CONNS")]
    pub max_conns: usize,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Comma-delimited set of accepted tokens for role "b".
    pub b_tokens: String,
    /// Maximum total concurrent connections.
    pub max_conns: usize,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated bound.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            b_tokens: args.b_tokens,
            max_conns: args.max_conns,
        }
    }
}
