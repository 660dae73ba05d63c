//! In-place TLS upgrade of an established stream.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use campmail_common::tracing;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};

use super::error::{ClientError, Result};

/// Turns a plaintext stream into an encrypted one after `STARTTLS`.
///
/// The stream is taken by value. Implementations that fail must drop it,
/// which closes the underlying socket.
#[async_trait]
pub trait TlsUpgrade<S: Send>: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn upgrade(&self, stream: S, server_name: &str) -> Result<Self::Stream>;
}

/// rustls with the platform's native root certificates.
///
/// The root store is loaded on the first upgrade and reused afterwards.
#[derive(Default)]
pub struct RustlsUpgrade {
    connector: OnceLock<TlsConnector>,
}

impl RustlsUpgrade {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connector: OnceLock::new(),
        }
    }

    fn connector(&self) -> Result<&TlsConnector> {
        if let Some(connector) = self.connector.get() {
            return Ok(connector);
        }

        let connector = native_connector()?;
        Ok(self.connector.get_or_init(|| connector))
    }
}

fn native_connector() -> Result<TlsConnector> {
    let certs = rustls_native_certs::load_native_certs();
    if !certs.errors.is_empty() {
        tracing::warn!(?certs.errors, "Some native certificates could not be loaded");
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs.certs);
    tracing::debug!(added, ignored, "Loaded native root certificates");

    if roots.is_empty() {
        return Err(ClientError::Tls(
            "no usable root certificates found".to_string(),
        ));
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

#[async_trait]
impl<S> TlsUpgrade<S> for RustlsUpgrade
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = TlsStream<S>;

    async fn upgrade(&self, stream: S, server_name: &str) -> Result<Self::Stream> {
        let connector = self.connector()?.clone();
        let name = ServerName::try_from(server_name.to_string()).map_err(|e| {
            ClientError::Tls(format!("Invalid server name '{server_name}': {e}"))
        })?;

        connector
            .connect(name, stream)
            .await
            .map_err(|e| ClientError::Tls(e.to_string()))
    }
}
