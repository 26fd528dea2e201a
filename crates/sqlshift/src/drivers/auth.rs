//! Connection authentication.
//!
//! SqlAuth credentials that are missing from configuration are solicited
//! interactively before any connection attempt. Azure AD modes resolve an
//! access token through the `az` CLI; tiberius then presents it as an AAD
//! token during the TDS login.

use dialoguer::{Input, Password};
use tracing::info;

use crate::config::{AuthMode, ConnectionConfig};
use crate::error::{MigrateError, Result};

/// Resource URI Azure SQL access tokens are scoped to.
const AZURE_SQL_RESOURCE: &str = "https://database.windows.net/";

/// Resolve user + password for a SqlAuth connection, prompting for whatever
/// the configuration left out.
pub fn ensure_sql_credentials(config: &ConnectionConfig, label: &str) -> Result<(String, String)> {
    let user = match &config.user {
        Some(user) if !user.is_empty() => user.clone(),
        _ => Input::new()
            .with_prompt(format!("{} user ({})", label, config.server))
            .interact_text()
            .map_err(|e| MigrateError::Auth(format!("cannot prompt for user: {}", e)))?,
    };
    let password = match &config.password {
        Some(password) if !password.is_empty() => password.clone(),
        _ => Password::new()
            .with_prompt(format!("{} password for '{}'", label, user))
            .interact()
            .map_err(|e| MigrateError::Auth(format!("cannot prompt for password: {}", e)))?,
    };
    Ok((user, password))
}

/// Obtain an Azure AD access token for Azure SQL.
///
/// `CliDelegated` reuses the operator's existing `az` session.
/// `InteractiveBrowser` runs `az login` first (which opens the browser),
/// then fetches the token the same way.
pub async fn azure_access_token(mode: AuthMode) -> Result<String> {
    if mode == AuthMode::InteractiveBrowser {
        info!("Opening browser sign-in via 'az login'");
        let status = tokio::process::Command::new("az")
            .arg("login")
            .status()
            .await
            .map_err(|e| MigrateError::Auth(format!("cannot run 'az login': {}", e)))?;
        if !status.success() {
            return Err(MigrateError::Auth("'az login' did not complete".into()));
        }
    }

    let output = tokio::process::Command::new("az")
        .args([
            "account",
            "get-access-token",
            "--resource",
            AZURE_SQL_RESOURCE,
            "--query",
            "accessToken",
            "--output",
            "tsv",
        ])
        .output()
        .await
        .map_err(|e| {
            MigrateError::Auth(format!(
                "cannot run 'az account get-access-token' (is the Azure CLI installed?): {}",
                e
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MigrateError::Auth(format!(
            "az token request failed: {}",
            stderr.trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(MigrateError::Auth("az returned an empty access token".into()));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;

    #[test]
    fn test_configured_credentials_pass_through_without_prompting() {
        let config = ConnectionConfig {
            provider: Provider::SqlServer,
            server: "localhost".into(),
            port: None,
            database: "db".into(),
            user: Some("sa".into()),
            password: Some("pw".into()),
            auth: AuthMode::SqlAuth,
        };
        let (user, password) = ensure_sql_credentials(&config, "source").unwrap();
        assert_eq!(user, "sa");
        assert_eq!(password, "pw");
    }
}
