use crate::config::{AuthConfig, RoleConfig, UserConfig};
use crate::planner::{Access, Plan};
use argon2::Argon2;
use password_hash::{PasswordHash, PasswordVerifier};
use rdbc_core::{RdbcError, Result};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct AuthManager {
    users: HashMap<String, UserConfig>,
    roles: HashMap<String, RoleConfig>,
}

#[derive(Debug, Clone)]
pub struct UserContext {
    pub username: String,
    pub roles: HashSet<String>,
    pub can_read: bool,
    pub can_write: bool,
    pub is_admin: bool,
}

impl AuthManager {
    pub fn new(config: &AuthConfig) -> Self {
        let users = config
            .users
            .iter()
            .map(|user| (user.username.clone(), user.clone()))
            .collect();
        let roles = config
            .roles
            .iter()
            .map(|role| (role.name.clone(), role.clone()))
            .collect();
        Self { users, roles }
    }

    /// Fails with `Connect`; the message does not reveal whether the user exists.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<UserContext> {
        let rejected = || RdbcError::Connect(format!("authentication failed for user {username}"));
        let user = self.users.get(username).ok_or_else(rejected)?;
        if let Some(hash) = &user.password_hash {
            let parsed = PasswordHash::new(hash).map_err(|_| rejected())?;
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .map_err(|_| rejected())?;
        } else if let Some(plain) = &user.password_plain {
            if plain != password {
                return Err(rejected());
            }
        } else {
            return Err(rejected());
        }

        let roles: HashSet<String> = user.roles.iter().cloned().collect();
        let role_defs: Vec<&RoleConfig> = roles
            .iter()
            .filter_map(|name| self.roles.get(name))
            .collect();
        let can_read = role_defs.iter().any(|role| role.can_read || role.is_admin);
        let can_write = role_defs.iter().any(|role| role.can_write || role.is_admin);
        let is_admin = role_defs.iter().any(|role| role.is_admin);
        Ok(UserContext {
            username: username.to_string(),
            roles,
            can_read,
            can_write,
            is_admin,
        })
    }
}

/// `None` means auth is disabled and everything is allowed.
pub fn authorize(user: Option<&UserContext>, plan: &Plan) -> Result<()> {
    let Some(user) = user else {
        return Ok(());
    };
    match plan.access() {
        Access::Read if !user.can_read => Err(RdbcError::Unauthorized(format!(
            "read access denied for {}",
            user.username
        ))),
        Access::Write if !user.can_write => Err(RdbcError::Unauthorized(format!(
            "write access denied for {}",
            user.username
        ))),
        Access::Admin if !user.is_admin => Err(RdbcError::Unauthorized(format!(
            "admin access denied for {}",
            user.username
        ))),
        _ => Ok(()),
    }
}
