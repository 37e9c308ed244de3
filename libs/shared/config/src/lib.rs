use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub public_base_url: String,
    pub cinetpay_api_key: String,
    pub cinetpay_site_id: String,
    pub cinetpay_base_url: String,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub moneyfusion_api_url: String,
    pub moneyfusion_status_base_url: String,
    pub pending_reservation_ttl_minutes: i64,
    pub queue_debounce_ms: u64,
    pub payment_poll_interval_secs: u64,
    pub payment_await_timeout_secs: u64,
    pub server_port: u16,
}

fn string_var(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", name);
        String::new()
    })
}

fn string_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using default", name);
        default.to_string()
    })
}

fn parsed_var_or<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: string_var("SUPABASE_URL"),
            supabase_anon_key: string_var("SUPABASE_ANON_PUBLIC_KEY"),
            supabase_service_role_key: string_var("SUPABASE_SERVICE_ROLE_KEY"),
            supabase_jwt_secret: string_var("SUPABASE_JWT_SECRET"),
            public_base_url: string_var_or("PUBLIC_BASE_URL", "http://localhost:3000"),
            cinetpay_api_key: string_var("CINETPAY_API_KEY"),
            cinetpay_site_id: string_var("CINETPAY_SITE_ID"),
            cinetpay_base_url: string_var_or("CINETPAY_BASE_URL", "https://api-checkout.cinetpay.com"),
            paystack_secret_key: string_var("PAYSTACK_SECRET_KEY"),
            paystack_base_url: string_var_or("PAYSTACK_BASE_URL", "https://api.paystack.co"),
            moneyfusion_api_url: string_var("MONEYFUSION_API_URL"),
            moneyfusion_status_base_url: string_var_or(
                "MONEYFUSION_STATUS_BASE_URL",
                "https://www.pay.moneyfusion.net",
            ),
            pending_reservation_ttl_minutes: parsed_var_or("PENDING_RESERVATION_TTL_MINUTES", 30),
            queue_debounce_ms: parsed_var_or("QUEUE_DEBOUNCE_MS", 250),
            payment_poll_interval_secs: parsed_var_or("PAYMENT_POLL_INTERVAL_SECS", 3),
            payment_await_timeout_secs: parsed_var_or("PAYMENT_AWAIT_TIMEOUT_SECS", 120),
            server_port: parsed_var_or("SERVER_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Supabase not fully configured - falling back to in-memory persistence");
        }

        config
    }

    /// Supabase persistence needs the project URL and the service-role key.
    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_role_key.is_empty()
    }

    pub fn is_cinetpay_configured(&self) -> bool {
        !self.cinetpay_api_key.is_empty() && !self.cinetpay_site_id.is_empty()
    }

    pub fn is_paystack_configured(&self) -> bool {
        !self.paystack_secret_key.is_empty()
    }

    pub fn is_moneyfusion_configured(&self) -> bool {
        !self.moneyfusion_api_url.is_empty()
    }

    pub fn sweeper_enabled(&self) -> bool {
        self.pending_reservation_ttl_minutes > 0
    }

    /// Callback URL a gateway posts its webhook to.
    pub fn webhook_url(&self, gateway: &str) -> String {
        format!(
            "{}/payments/webhooks/{}",
            self.public_base_url.trim_end_matches('/'),
            gateway
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            public_base_url: "http://localhost:3000".to_string(),
            cinetpay_api_key: String::new(),
            cinetpay_site_id: String::new(),
            cinetpay_base_url: "https://api-checkout.cinetpay.com".to_string(),
            paystack_secret_key: String::new(),
            paystack_base_url: "https://api.paystack.co".to_string(),
            moneyfusion_api_url: String::new(),
            moneyfusion_status_base_url: "https://www.pay.moneyfusion.net".to_string(),
            pending_reservation_ttl_minutes: 30,
            queue_debounce_ms: 250,
            payment_poll_interval_secs: 3,
            payment_await_timeout_secs: 120,
            server_port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_url_strips_trailing_slash() {
        let config = AppConfig {
            public_base_url: "https://api.example.com/".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(
            config.webhook_url("paystack"),
            "https://api.example.com/payments/webhooks/paystack"
        );
    }

    #[test]
    fn default_config_uses_memory_backend() {
        let config = AppConfig::default();
        assert!(!config.is_configured());
        assert!(config.sweeper_enabled());
        assert!(!config.is_paystack_configured());
    }
}
