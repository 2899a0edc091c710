#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::serp::SerpCredentials;

pub const VAULT_SERVICE_NAME: &str = "SerpRankTracker";
pub const LOGIN_ALIAS: &str = "serp-api-login";
pub const PASSWORD_ALIAS: &str = "serp-api-password";

/// OS keychain storage for provider credentials.
#[derive(Clone)]
pub struct SecretVault {
    service_name: String,
    backend: SecretBackend,
}

#[derive(Clone)]
enum SecretBackend {
    Keyring,
    #[cfg(test)]
    Memory(Arc<Mutex<HashMap<String, SecretString>>>),
}

impl SecretVault {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            backend: SecretBackend::Keyring,
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            service_name: "in-memory".to_string(),
            backend: SecretBackend::Memory(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    pub fn read_secret(&self, account: &str) -> AppResult<Option<SecretString>> {
        match &self.backend {
            SecretBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, account)?;
                match entry.get_password() {
                    Ok(value) => Ok(Some(SecretString::from(value))),
                    Err(keyring::Error::NoEntry) => Ok(None),
                    Err(err) => Err(AppError::from(err)),
                }
            }
            #[cfg(test)]
            SecretBackend::Memory(store) => Ok(store.lock().get(account).cloned()),
        }
    }

    pub fn write_secret(&self, account: &str, secret: &SecretString) -> AppResult<()> {
        match &self.backend {
            SecretBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, account)?;
                entry.set_password(secret.expose_secret())?;
                Ok(())
            }
            #[cfg(test)]
            SecretBackend::Memory(store) => {
                store.lock().insert(account.to_string(), secret.clone());
                Ok(())
            }
        }
    }

    pub fn store_credentials(&self, login: &str, password: &SecretString) -> AppResult<()> {
        self.write_secret(LOGIN_ALIAS, &SecretString::from(login.to_string()))?;
        self.write_secret(PASSWORD_ALIAS, password)?;
        info!(
            target: "secret_vault",
            service = %self.service_name,
            "stored SERP API credentials"
        );
        Ok(())
    }

    /// Environment first, then the keychain.
    pub fn resolve_credentials(&self, config: &AppConfig) -> AppResult<SerpCredentials> {
        let login = match config.serp_api_login.clone() {
            Some(login) => login,
            None => self
                .read_secret(LOGIN_ALIAS)?
                .map(|secret| secret.expose_secret().to_string())
                .ok_or_else(missing_credentials)?,
        };
        let password = match config.serp_api_password.clone() {
            Some(password) => password,
            None => self
                .read_secret(PASSWORD_ALIAS)?
                .ok_or_else(missing_credentials)?,
        };
        debug!(
            target: "secret_vault",
            service = %self.service_name,
            "resolved SERP API credentials"
        );
        Ok(SerpCredentials { login, password })
    }
}

fn missing_credentials() -> AppError {
    AppError::Config(
        "SERP API credentials missing; set SERP_API_LOGIN/SERP_API_PASSWORD or run `credentials`"
            .into(),
    )
}
