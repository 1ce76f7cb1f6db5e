use std::{env, time::Duration};

use fsp_common::Secret;
use funding_engine::jobs::RetryPolicy;
use log::*;

const DEFAULT_FSP_HOST: &str = "127.0.0.1";
const DEFAULT_FSP_PORT: u16 = 8480;
const DEFAULT_PLATFORM_FEE_BPS: i64 = 500;
const DEFAULT_DISPUTE_WINDOW_HOURS: u64 = 24;
const DEFAULT_SETTLEMENT_RETRY_HOURS: u64 = 1;
const DEFAULT_SETTLEMENT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_JOB_RETRY_SECONDS: u64 = 60;
const DEFAULT_JOB_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_CHECKOUT_URL: &str = "https://pay.localhost";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The shared secret the gateway signs webhook payloads with.
    pub webhook_secret: Secret<String>,
    /// The platform's settlement fee, in basis points of the total raised.
    pub platform_fee_bps: i64,
    /// Base URL of the hosted checkout the server redirects investors to.
    pub checkout_base_url: String,
    pub retry_policy: RetryPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_FSP_HOST.to_string(),
            port: DEFAULT_FSP_PORT,
            database_url: String::default(),
            webhook_secret: Secret::default(),
            platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
            checkout_base_url: DEFAULT_CHECKOUT_URL.to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("FSP_HOST").ok().unwrap_or_else(|| DEFAULT_FSP_HOST.into());
        let port = env::var("FSP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for FSP_PORT. {e} Using the default, {DEFAULT_FSP_PORT}, instead."
                    );
                    DEFAULT_FSP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_FSP_PORT);
        let database_url = env::var("FSP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ FSP_DATABASE_URL is not set. Please set it to the URL for the funding database.");
            String::default()
        });
        let webhook_secret = configure_webhook_secret();
        let platform_fee_bps = env_parse("FSP_PLATFORM_FEE_BPS", DEFAULT_PLATFORM_FEE_BPS);
        let checkout_base_url = env::var("FSP_CHECKOUT_URL").ok().unwrap_or_else(|| {
            info!("🪛️ FSP_CHECKOUT_URL is not set. Using the default, {DEFAULT_CHECKOUT_URL}.");
            DEFAULT_CHECKOUT_URL.to_string()
        });
        let retry_policy = configure_retry_policy();
        Self { host, port, database_url, webhook_secret, platform_fee_bps, checkout_base_url, retry_policy }
    }
}

fn configure_webhook_secret() -> Secret<String> {
    let secret = env::var("FSP_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
        let random: String = (0..32).map(|_| format!("{:02x}", rand::random::<u8>())).collect();
        error!(
            "🚨️ FSP_WEBHOOK_SECRET is not set. A random secret has been generated for this run, which means NO \
             gateway webhook will verify. Set FSP_WEBHOOK_SECRET to the endpoint secret from your gateway dashboard."
        );
        random
    });
    Secret::new(secret)
}

fn configure_retry_policy() -> RetryPolicy {
    let defaults = RetryPolicy::default();
    let policy = RetryPolicy {
        job_retry: Duration::from_secs(env_parse("FSP_JOB_RETRY_SECONDS", DEFAULT_JOB_RETRY_SECONDS)),
        job_max_attempts: env_parse("FSP_JOB_MAX_ATTEMPTS", DEFAULT_JOB_MAX_ATTEMPTS),
        settlement_retry: Duration::from_secs(
            env_parse("FSP_SETTLEMENT_RETRY_HOURS", DEFAULT_SETTLEMENT_RETRY_HOURS) * 3600,
        ),
        settlement_max_attempts: env_parse("FSP_SETTLEMENT_MAX_ATTEMPTS", DEFAULT_SETTLEMENT_MAX_ATTEMPTS),
        dispute_window: Duration::from_secs(env_parse("FSP_DISPUTE_WINDOW_HOURS", DEFAULT_DISPUTE_WINDOW_HOURS) * 3600),
    };
    if policy.dispute_window != defaults.dispute_window {
        info!("🪛️ Escrow dispute window set to {}s", policy.dispute_window.as_secs());
    }
    policy
}

fn env_parse<T: std::str::FromStr + Copy + std::fmt::Display>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|_| {
            error!("🪛️ {s} is not a valid value for {var}. Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
