use platelog_types::{PlatelogError, Result};
use tracing::info;

use crate::{store_error, KeyValueStore, CURRENT_USER_KEY, USERS_KEY};

/// Username-only sign in. There are no credentials: knowing a registered
/// name is enough.
pub struct UserRegistry<'a, S: KeyValueStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> UserRegistry<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn users(&self) -> Result<Vec<String>> {
        match self.store.get(USERS_KEY)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|err| store_error(format!("corrupt user registry: {err}"))),
            None => Ok(Vec::new()),
        }
    }

    /// Add a new username and make it the active user.
    pub fn register(&self, username: &str) -> Result<String> {
        let username = normalize(username)?;
        let mut users = self.users()?;
        if users.iter().any(|u| u == &username) {
            return Err(PlatelogError::Account(format!(
                "username '{username}' is already taken"
            )));
        }
        users.push(username.clone());
        let raw = serde_json::to_string(&users)
            .map_err(|err| store_error(format!("failed to serialize users: {err}")))?;
        self.store.set(USERS_KEY, &raw)?;
        self.store.set(CURRENT_USER_KEY, &username)?;
        info!(user = %username, "registered");
        Ok(username)
    }

    pub fn login(&self, username: &str) -> Result<String> {
        let username = normalize(username)?;
        if !self.users()?.contains(&username) {
            return Err(PlatelogError::Account(format!(
                "no user named '{username}'"
            )));
        }
        self.store.set(CURRENT_USER_KEY, &username)?;
        info!(user = %username, "logged in");
        Ok(username)
    }

    pub fn logout(&self) -> Result<()> {
        self.store.remove(CURRENT_USER_KEY)
    }

    /// The active user, provided it is still registered.
    pub fn current_user(&self) -> Result<Option<String>> {
        let Some(current) = self.store.get(CURRENT_USER_KEY)? else {
            return Ok(None);
        };
        Ok(self.users()?.into_iter().find(|u| u == &current))
    }
}

fn normalize(username: &str) -> Result<String> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(PlatelogError::Account("username must not be empty".into()));
    }
    Ok(trimmed.to_string())
}
