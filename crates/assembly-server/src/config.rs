use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub admin_emails: Vec<String>,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("ASSEMBLY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("ASSEMBLY_JWT_SECRET is unset or still a placeholder");
        }

        let db_path = get("ASSEMBLY_DB_PATH")
            .unwrap_or_else(|| "assembly.db".into())
            .into();
        let host = get("ASSEMBLY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("ASSEMBLY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("ASSEMBLY_PORT must be a port number")?;
        let addr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let admin_emails = get("ASSEMBLY_ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let token_ttl_days: i64 = get("ASSEMBLY_TOKEN_TTL_DAYS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("ASSEMBLY_TOKEN_TTL_DAYS must be a whole number of days")?;
        if token_ttl_days <= 0 {
            bail!("ASSEMBLY_TOKEN_TTL_DAYS must be positive");
        }

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            admin_emails,
            token_ttl_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("ASSEMBLY_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("assembly.db"));
        assert_eq!(config.addr.port(), 3000);
        assert!(config.admin_emails.is_empty());
        assert_eq!(config.token_ttl_days, 30);
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("ASSEMBLY_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn admin_emails_are_normalized() {
        let config = load(&[
            ("ASSEMBLY_JWT_SECRET", "s3cret"),
            ("ASSEMBLY_ADMIN_EMAILS", " Chair@Assembly.gg, ,ops@assembly.gg"),
        ])
        .unwrap();
        assert_eq!(config.admin_emails, vec!["chair@assembly.gg", "ops@assembly.gg"]);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(load(&[("ASSEMBLY_JWT_SECRET", "s"), ("ASSEMBLY_PORT", "http")]).is_err());
        assert!(load(&[("ASSEMBLY_JWT_SECRET", "s"), ("ASSEMBLY_TOKEN_TTL_DAYS", "0")]).is_err());
    }
}
