use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiry_days: i64,
    /// Development shortcut: accept `sample…` product references in the cart.
    pub allow_sample_products: bool,
    pub payment_currency: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_expiry_days = env::var("JWT_EXPIRY_DAYS")
            .ok()
            .and_then(|d| d.parse::<i64>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(30);
        let allow_sample_products = env::var("ALLOW_SAMPLE_PRODUCTS")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        let payment_currency = env::var("PAYMENT_CURRENCY")
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|_| "usd".to_string());

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            jwt_expiry_days,
            allow_sample_products,
            payment_currency,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::parse_flag;

    #[test]
    fn flags_accept_common_truthy_values() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
