use clap::Parser;
use std::time::Duration;

// one year
pub const MAX_TOKEN_MINUTES: u64 = 525_600;

// CLI argument structure; every flag falls back to an environment variable
#[derive(Parser, Debug, Clone)]
#[command(name = "ai-backend")]
#[command(about = "AI backend service API with token auth and per-client rate limiting")]
pub struct Args {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    // Secret used to sign access tokens
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    // Token signature algorithm (HS256, HS384 or HS512)
    #[arg(long, env = "ALGORITHM", default_value = "HS256")]
    pub algorithm: String,

    // Access token lifetime in minutes
    #[arg(
        long,
        env = "ACCESS_TOKEN_EXPIRE_MINUTES",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_MINUTES)
    )]
    pub access_token_expire_minutes: u64,

    // Rate limit max requests per window
    #[arg(
        long,
        env = "RATE_LIMIT_REQUESTS",
        default_value_t = 100,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub rate_limit_requests: u32,

    // Rate limit window in seconds
    #[arg(
        long,
        env = "RATE_LIMIT_PERIOD",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub rate_limit_period: u64,

    // How often idle rate-limit clients are swept, in seconds
    #[arg(
        long,
        env = "RATE_LIMIT_SWEEP_INTERVAL",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub rate_limit_sweep_interval: u64,

    // Allowed CORS origins (comma-separated)
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://localhost:8000"
    )]
    pub cors_origins: Vec<String>,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_expire_minutes.saturating_mul(60))
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_period)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_interval)
    }
}
