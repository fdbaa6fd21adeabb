use std::{env, str::FromStr, time::Duration};

use beanpay_engine::{
    adapters::{ExternalPosConfig, SquareConfig, StripeConfig},
    traits::MerchantContext,
};
use bp_common::Secret;
use log::*;
use serde::{Deserialize, Serialize};

const DEFAULT_BP_HOST: &str = "127.0.0.1";
const DEFAULT_BP_PORT: u16 = 8250;
const DEFAULT_CAPTURE_DELAY: Duration = Duration::from_secs(90);
const SQUARE_PRODUCTION_URL: &str = "https://connect.squareup.com";
const SQUARE_SANDBOX_URL: &str = "https://connect.squareupsandbox.com";
const STRIPE_API_URL: &str = "https://api.stripe.com";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub environment: PaymentEnvironment,
    pub webhook: WebhookConfig,
    pub square: SquareConfig,
    pub stripe: StripeConfig,
    pub external_pos: ExternalPosConfig,
    /// How long an authorize-only payment waits before being captured automatically, unless the
    /// client cancels first.
    pub capture_delay: Duration,
    pub push: PushConfig,
    pub merchants: Vec<MerchantCredentials>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BP_HOST.to_string(),
            port: DEFAULT_BP_PORT,
            database_url: String::default(),
            environment: PaymentEnvironment::Sandbox,
            webhook: WebhookConfig::default(),
            square: SquareConfig::new(SQUARE_SANDBOX_URL, Secret::default()),
            stripe: StripeConfig::new(STRIPE_API_URL, Secret::default()),
            external_pos: ExternalPosConfig::new("", Secret::default()),
            capture_delay: DEFAULT_CAPTURE_DELAY,
            push: PushConfig::default(),
            merchants: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentEnvironment {
    Sandbox,
    Production,
}

impl FromStr for PaymentEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandbox" | "test" | "dev" => Ok(Self::Sandbox),
            "production" | "prod" | "live" => Ok(Self::Production),
            other => Err(format!("{other} is not a valid payment environment")),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    pub hmac_secret: Secret<String>,
    /// Signature checks can only be disabled by explicit configuration, and doing so is logged
    /// loudly at startup.
    pub hmac_checks: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PushConfig {
    pub gateway_url: String,
    pub api_key: Secret<String>,
    pub device_directory_url: String,
    pub shop_name: String,
}

/// Per-merchant routing and credential data, loaded from `BP_MERCHANT_CREDENTIALS` (a JSON
/// array). The `access_token` is merchant-scoped and never serialized back out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MerchantCredentials {
    pub merchant_id: String,
    #[serde(default)]
    pub shop_name: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    /// The client-side (publishable) application id handed to the mobile SDKs.
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("BP_HOST").ok().unwrap_or_else(|| DEFAULT_BP_HOST.into());
        let port = env::var("BP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid port for BP_PORT. {e} Using the default, {DEFAULT_BP_PORT}.");
                    DEFAULT_BP_PORT
                })
            })
            .unwrap_or(DEFAULT_BP_PORT);
        let database_url = env::var("BP_DATABASE_URL").unwrap_or_else(|_| {
            warn!("🪛️ BP_DATABASE_URL is not set. Using an empty value; the server will not start without one.");
            String::default()
        });
        let environment = env::var("BP_PAYMENT_ENVIRONMENT")
            .ok()
            .and_then(|s| {
                s.parse::<PaymentEnvironment>()
                    .map_err(|e| error!("🪛️ {e}. Defaulting to the sandbox environment."))
                    .ok()
            })
            .unwrap_or(PaymentEnvironment::Sandbox);
        let webhook = WebhookConfig {
            hmac_secret: configured_secret("BP_WEBHOOK_HMAC_SECRET", environment),
            hmac_checks: !bp_common::helpers::env_flag("BP_DISABLE_HMAC_CHECKS", false),
        };
        if !webhook.hmac_checks {
            warn!("🪛️ Webhook HMAC checks are DISABLED. Anyone can post order events to this server.");
        }
        let square_url = env::var("BP_SQUARE_API_URL").unwrap_or_else(|_| match environment {
            PaymentEnvironment::Production => SQUARE_PRODUCTION_URL.to_string(),
            PaymentEnvironment::Sandbox => SQUARE_SANDBOX_URL.to_string(),
        });
        let mut square = SquareConfig::new(square_url, configured_secret("BP_SQUARE_ACCESS_TOKEN", environment));
        if let Ok(location) = env::var("BP_SQUARE_LOCATION_ID") {
            square = square.with_location_id(location);
        }
        let stripe_url = env::var("BP_STRIPE_API_URL").unwrap_or_else(|_| STRIPE_API_URL.to_string());
        let stripe = StripeConfig::new(stripe_url, configured_secret("BP_STRIPE_SECRET_KEY", environment));
        let external_pos = ExternalPosConfig::new(
            env::var("BP_POS_BRIDGE_URL").unwrap_or_default(),
            env::var("BP_POS_API_KEY").map(Secret::new).unwrap_or_default(),
        );
        let capture_delay = env::var("BP_AUTO_CAPTURE_DELAY_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CAPTURE_DELAY);
        let push = PushConfig {
            gateway_url: env::var("BP_PUSH_GATEWAY_URL").unwrap_or_default(),
            api_key: env::var("BP_PUSH_API_KEY").map(Secret::new).unwrap_or_default(),
            device_directory_url: env::var("BP_DEVICE_DIRECTORY_URL").unwrap_or_default(),
            shop_name: env::var("BP_SHOP_NAME").unwrap_or_else(|_| "BeanPay".to_string()),
        };
        let merchants = merchants_from_env();
        Self {
            host,
            port,
            database_url,
            environment,
            webhook,
            square,
            stripe,
            external_pos,
            capture_delay,
            push,
            merchants,
        }
    }

    pub fn merchant(&self, merchant_id: &str) -> Option<&MerchantCredentials> {
        self.merchants.iter().find(|m| m.merchant_id == merchant_id)
    }

    /// The routing context handed to provider adapters for a given merchant. Unknown merchants
    /// still get a context carrying only the id; adapters fall back to their configured defaults.
    pub fn merchant_context(&self, merchant_id: &str) -> MerchantContext {
        let mut ctx = MerchantContext::new(merchant_id);
        if let Some(creds) = self.merchant(merchant_id) {
            ctx.location_id = creds.location_id.clone();
            ctx.access_token = creds.access_token.clone().map(Secret::new);
        }
        ctx
    }
}

fn merchants_from_env() -> Vec<MerchantCredentials> {
    let Ok(raw) = env::var("BP_MERCHANT_CREDENTIALS") else {
        info!("🪛️ BP_MERCHANT_CREDENTIALS is not set. No per-merchant credentials are configured.");
        return Vec::new();
    };
    match serde_json::from_str::<Vec<MerchantCredentials>>(&raw) {
        Ok(merchants) => {
            info!("🪛️ Loaded credentials for {} merchant(s)", merchants.len());
            merchants
        },
        Err(e) => {
            error!("🪛️ BP_MERCHANT_CREDENTIALS is not valid JSON ({e}). No merchant credentials loaded.");
            Vec::new()
        },
    }
}

/// A secret that the server can limp along without in sandbox, but which is loudly flagged when
/// missing. Production deployments are expected to treat these warnings as fatal.
fn configured_secret(var: &str, environment: PaymentEnvironment) -> Secret<String> {
    match env::var(var) {
        Ok(value) => Secret::new(value),
        Err(_) => {
            match environment {
                PaymentEnvironment::Production => {
                    error!("🪛️ {var} is not set. This is required in production; dependent calls WILL fail.")
                },
                PaymentEnvironment::Sandbox => warn!("🪛️ {var} is not set. Dependent calls will fail."),
            }
            Secret::default()
        },
    }
}
