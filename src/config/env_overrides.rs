use super::Config;

/// Non-empty value of the first set variable among `names`.
fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

impl Config {
    /// Environment always wins over the file; variable names follow the
    /// container deployment this relay replaces.
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = env_value(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]) {
            self.generation.api_key = Some(key);
        }

        if let Some(key) = env_value(&["PRISMA_AIRS_API_KEY"]) {
            self.guardrail.api_key = Some(key);
        }

        if let Some(profile) = env_value(&["PRISMA_AIRS_PROFILE"]) {
            self.guardrail.profile_name = Some(profile);
        }

        if let Some(url) = env_value(&["MCP_HTTP_URL"]) {
            self.agent.mcp_url = url;
        }

        if let Some(host) = env_value(&["AWS_DB_HOST"]) {
            self.state_store.backend.postgres_mut().host = Some(host);
        }

        if let Some(port) = env_value(&["AWS_DB_PORT"]).and_then(|p| p.parse::<u16>().ok()) {
            self.state_store.backend.postgres_mut().port = port;
        }

        if let Some(database) = env_value(&["AWS_DB_NAME"]) {
            self.state_store.backend.postgres_mut().database = database;
        }

        if let Some(user) = env_value(&["AWS_DB_USER"]) {
            self.state_store.backend.postgres_mut().user = user;
        }

        if let Some(password) = env_value(&["AWS_DB_PASSWORD"]) {
            self.state_store.backend.postgres_mut().password = Some(password);
        }

        if let Some(host) = env_value(&["GUARDED_RELAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }

        if let Some(port) =
            env_value(&["GUARDED_RELAY_PORT", "PORT"]).and_then(|p| p.parse::<u16>().ok())
        {
            self.gateway.port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateStoreBackend;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // SAFETY (for every set_var/remove_var below): tests touching the process
    // environment serialize on ENV_LOCK.
    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], body: F) {
        let _guard = env_lock();
        for (name, value) in vars {
            unsafe { std::env::set_var(name, value) };
        }
        body();
        for (name, _) in vars {
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    fn secrets_come_from_environment() {
        with_env(
            &[
                ("GEMINI_API_KEY", "gem-env"),
                ("PRISMA_AIRS_API_KEY", "pan-env"),
                ("PRISMA_AIRS_PROFILE", "profile-env"),
                ("MCP_HTTP_URL", "http://mcp.local/mcp"),
            ],
            || {
                let mut config = Config::default();
                config.apply_env_overrides();
                assert_eq!(config.generation.api_key.as_deref(), Some("gem-env"));
                assert_eq!(config.guardrail.api_key.as_deref(), Some("pan-env"));
                assert_eq!(config.guardrail.profile_name.as_deref(), Some("profile-env"));
                assert_eq!(config.agent.mcp_url, "http://mcp.local/mcp");
                assert!(config.validate().is_ok());
            },
        );
    }

    #[test]
    fn database_variables_select_postgres_backend() {
        with_env(
            &[
                ("AWS_DB_HOST", "db.example.internal"),
                ("AWS_DB_PORT", "6543"),
                ("AWS_DB_PASSWORD", "vault-issued"),
            ],
            || {
                let mut config = Config::default();
                config.state_store.backend = StateStoreBackend::Sqlite {
                    path: "local.db".into(),
                };
                config.apply_env_overrides();
                let StateStoreBackend::Postgres(pg) = &config.state_store.backend else {
                    panic!("expected postgres backend");
                };
                assert_eq!(pg.host.as_deref(), Some("db.example.internal"));
                assert_eq!(pg.port, 6543);
                assert_eq!(pg.password.as_deref(), Some("vault-issued"));
                assert_eq!(pg.database, "aiagentdb");
            },
        );
    }

    #[test]
    fn invalid_port_is_ignored() {
        with_env(&[("GUARDED_RELAY_PORT", "not-a-port")], || {
            let mut config = Config::default();
            config.apply_env_overrides();
            assert_eq!(config.gateway.port, 5001);
        });
    }
}
