//! SQL Server / Azure SQL driver (tiberius).
//!
//! The only driver family that serves both sides: [`MssqlReader`] for
//! SQL Server / Azure SQL sources, [`TargetWriter`] for the migration
//! target.

pub mod dialect;
pub mod reader;
pub mod writer;

pub use dialect::MssqlDialect;
pub use reader::MssqlReader;
pub use writer::TargetWriter;

use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::info;

use crate::config::{AuthMode, ConnectionConfig, Provider};
use crate::drivers::auth;
use crate::error::{MigrateError, Result};

pub(crate) type MssqlClient = Client<Compat<TcpStream>>;

/// Open a TDS connection honoring the configured auth mode.
pub(crate) async fn connect(config: &ConnectionConfig, context: &str) -> Result<MssqlClient> {
    let mut tds = Config::new();
    tds.host(&config.server);
    tds.port(config.port());
    tds.database(&config.database);

    match config.auth {
        AuthMode::SqlAuth => {
            let (user, password) = auth::ensure_sql_credentials(config, context)?;
            tds.authentication(AuthMethod::sql_server(&user, &password));
        }
        AuthMode::WindowsAuth => {
            #[cfg(windows)]
            {
                tds.authentication(AuthMethod::Integrated);
            }
            #[cfg(not(windows))]
            {
                return Err(MigrateError::Auth(
                    "WindowsAuth requires a Windows host".into(),
                ));
            }
        }
        AuthMode::InteractiveBrowser | AuthMode::CliDelegated => {
            let token = auth::azure_access_token(config.auth).await?;
            tds.authentication(AuthMethod::aad_token(token));
        }
    }

    match config.provider {
        Provider::AzureSql => {
            tds.encryption(EncryptionLevel::Required);
        }
        _ => {
            // On-prem instances commonly run self-signed certificates
            tds.trust_cert();
            tds.encryption(EncryptionLevel::Required);
        }
    }

    let tcp = TcpStream::connect(tds.get_addr())
        .await
        .map_err(|e| MigrateError::connect(e.to_string(), context))?;
    tcp.set_nodelay(true).ok();

    let client = Client::connect(tds, tcp.compat_write())
        .await
        .map_err(|e| MigrateError::connect(e.to_string(), context))?;

    info!(
        "Connected to {} {}:{}/{}",
        config.provider,
        config.server,
        config.port(),
        config.database
    );

    Ok(client)
}
