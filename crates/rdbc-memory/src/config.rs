use password_hash::PasswordHash;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub name: String,
    /// Simulated round trip added to every operation.
    #[serde(default)]
    pub latency_ms: u64,
}

/// Credentials every connection of a factory logs in with.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    pub enabled: bool,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: Option<String>,
    pub password_plain: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoleConfig {
    pub name: String,
    pub can_read: bool,
    pub can_write: bool,
    pub is_admin: bool,
}

impl MemoryConfig {
    /// Unauthenticated database without latency.
    pub fn in_memory(name: &str) -> Self {
        Self {
            database: DatabaseConfig {
                name: name.to_string(),
                latency_ms: 0,
            },
            session: SessionConfig {
                username: "rdbc".to_string(),
                password: String::new(),
            },
            auth: AuthConfig::default(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.database.latency_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.name.trim().is_empty() {
            return Err(anyhow::anyhow!("database name must not be empty"));
        }
        if self.session.username.is_empty() {
            return Err(anyhow::anyhow!("session username must not be empty"));
        }
        if !self.auth.enabled {
            return Ok(());
        }
        if self.auth.users.is_empty() {
            return Err(anyhow::anyhow!("auth enabled but no users configured"));
        }
        for user in &self.auth.users {
            match (&user.password_hash, &user.password_plain) {
                (None, None) => {
                    return Err(anyhow::anyhow!(
                        "user {} has no password configured",
                        user.username
                    ))
                }
                (Some(hash), _) => {
                    PasswordHash::new(hash).map_err(|e| {
                        anyhow::anyhow!("user {} has a malformed password hash: {e}", user.username)
                    })?;
                }
                (None, Some(_)) => {}
            }
            if user.roles.is_empty() {
                return Err(anyhow::anyhow!(
                    "user {} has no roles configured",
                    user.username
                ));
            }
            if let Some(unknown) = user
                .roles
                .iter()
                .find(|role| !self.auth.roles.iter().any(|r| &r.name == *role))
            {
                return Err(anyhow::anyhow!(
                    "user {} references unknown role {unknown}",
                    user.username
                ));
            }
        }
        if !self
            .auth
            .users
            .iter()
            .any(|u| u.username == self.session.username)
        {
            return Err(anyhow::anyhow!(
                "session user {} is not a configured user",
                self.session.username
            ));
        }
        Ok(())
    }
}
