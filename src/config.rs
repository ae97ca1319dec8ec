use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub database_url: String,
    /// StarkNet JSON-RPC node used for signature verification.
    pub rpc_url: String,
    /// Public address seeded as the admin user on first run.
    pub admin_address: Option<String>,
    pub admin_name: String,
    pub cors_origins: Vec<String>,
    /// Skip chain-node signature verification. Local development only.
    pub dev_mode: bool,
}

fn parse_cors_origins(s: &str) -> Vec<String> {
    s.split(',').map(|s| s.trim().to_owned()).collect()
}

impl Config {
    pub fn load() -> Self {
        Self {
            listen: env::var("AUDITDESK_LISTEN").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://auditdesk.db".into()),
            rpc_url: env::var("AUDITDESK_RPC_URL")
                .unwrap_or_else(|_| "https://starknet-sepolia.public.blastapi.io".into()),
            admin_address: env::var("AUDITDESK_ADMIN_ADDRESS").ok(),
            admin_name: env::var("AUDITDESK_ADMIN_NAME").unwrap_or_else(|_| "admin".into()),
            cors_origins: env::var("AUDITDESK_CORS_ORIGINS")
                .ok()
                .map_or_else(Vec::new, |v| parse_cors_origins(&v)),
            dev_mode: env::var("AUDITDESK_DEV").ok().is_some_and(|v| v == "true"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cors_origins_single() {
        let result = parse_cors_origins("http://localhost:3000");
        assert_eq!(result, vec!["http://localhost:3000"]);
    }

    #[test]
    fn parse_cors_origins_multiple_with_spaces() {
        let result = parse_cors_origins("http://a.com, http://b.com , http://c.com");
        assert_eq!(result, vec!["http://a.com", "http://b.com", "http://c.com"]);
    }

    #[test]
    fn default_listen_addr() {
        let config = Config::load();
        if env::var("AUDITDESK_LISTEN").is_err() {
            assert_eq!(config.listen, "0.0.0.0:8080");
        }
    }

    #[test]
    fn default_admin_name() {
        let config = Config::load();
        if env::var("AUDITDESK_ADMIN_NAME").is_err() {
            assert_eq!(config.admin_name, "admin");
        }
    }
}
