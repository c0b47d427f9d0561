//! Relational key store backed by sqlx's `Any` driver

use std::fmt;

use async_trait::async_trait;
use sqlx::any::{AnyConnectOptions, install_default_drivers};
use sqlx::{AnyConnection, Connection, Row};
use tracing::{debug, error};
use zeroize::Zeroizing;

use crate::config::DatabaseConfig;
use crate::domain::KeyMaterial;
use crate::error::{FleetError, Result};
use crate::ports::KeyStore;

/// Looks keys up in a `host -> private key text` table.
///
/// Each lookup opens its own connection and closes it before returning,
/// so concurrent host tasks never share a connection.
#[derive(Clone)]
pub struct SqlKeyStore {
    options: AnyConnectOptions,
    query: String,
}

impl SqlKeyStore {
    /// # Errors
    ///
    /// Returns an error if the database settings do not describe a
    /// reachable driver URL.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        install_default_drivers();
        Ok(Self {
            options: config.connect_options()?,
            query: config.lookup_query(),
        })
    }

    /// The lookup statement this store runs
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    async fn fetch_key_text(&self, hostname: &str) -> Result<Option<Zeroizing<String>>> {
        let mut conn = AnyConnection::connect_with(&self.options).await?;

        let row = sqlx::query(&self.query)
            .bind(hostname)
            .fetch_optional(&mut conn)
            .await;

        if let Err(e) = conn.close().await {
            debug!(host = %hostname, error = %e, "Closing key store connection failed");
        }

        match row? {
            Some(row) => Ok(Some(Zeroizing::new(row.try_get::<String, _>(0)?))),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for SqlKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlKeyStore")
            .field("driver", &self.options.database_url.scheme())
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyStore for SqlKeyStore {
    async fn fetch_key(&self, hostname: &str) -> Result<KeyMaterial> {
        let Some(text) = self.fetch_key_text(hostname).await? else {
            error!(host = %hostname, "No private key stored for host");
            return Err(FleetError::KeyNotFound {
                host: hostname.to_string(),
            });
        };

        KeyMaterial::decode(hostname, &text).inspect_err(|e| {
            error!(host = %hostname, error = %e, "Stored private key could not be parsed");
        })
    }
}
