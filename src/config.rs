use serde::{Deserialize, Serialize};

use crate::error::Error;

/// TLS certificate and key paths for a binding that wants to serve `https`/`wss`/`coaps`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to a PEM-encoded certificate chain.
    pub cert_path: String,

    /// Path to a PEM-encoded private key.
    pub key_path: String,
}

/// Configuration for a single protocol binding: which port to listen on, and whether to
/// wrap the listener in TLS.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BindingConfig {
    /// The port to bind. `0` lets the OS pick an ephemeral port.
    pub port: u16,

    /// TLS material. `None` means the binding serves its plaintext scheme.
    pub tls: Option<TlsConfig>,
}

impl BindingConfig {
    /// A binding on the given port, no TLS.
    pub fn plain(port: u16) -> Self {
        Self { port, tls: None }
    }
}

/// The configuration used to build a [`crate::servient::Servient`].
///
/// Analogous to a host's `config.toml`: deserializable from whatever format the host prefers
/// (environment, file, CLI-provided JSON) since it derives [`Deserialize`], but this crate never
/// reads a file or environment variable itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServientConfig {
    /// The hostname used to build absolute URLs in Forms and the catalogue `base` field.
    /// Defaults to `localhost`.
    pub hostname: String,

    /// The port the TD catalogue HTTP endpoint listens on.
    pub catalogue_port: u16,

    /// HTTP protocol binding. `None` disables the binding entirely.
    pub http: Option<BindingConfig>,

    /// WebSocket protocol binding. `None` disables the binding entirely.
    pub ws: Option<BindingConfig>,

    /// CoAP protocol binding. `None` disables the binding entirely. Only meaningful when this
    /// crate is built with the `coap` feature.
    #[cfg(feature = "coap")]
    pub coap: Option<BindingConfig>,

    /// How many items a subscriber's channel buffers before the oldest is dropped.
    pub subscription_buffer: usize,
}

impl Default for ServientConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".into(),
            catalogue_port: 8080,
            http: Some(BindingConfig::plain(8080)),
            ws: Some(BindingConfig::plain(8081)),
            #[cfg(feature = "coap")]
            coap: None,
            subscription_buffer: 128,
        }
    }
}

impl ServientConfig {
    /// Deserialize a configuration from its JSON representation. Hosts that want another
    /// format (RON, TOML, environment variables) build a [`ServientConfig`] themselves and
    /// skip this entirely; it exists because JSON is the lingua franca of this crate's wire
    /// formats.
    pub fn from_json(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(Error::from)
    }

    fn check_at_least_one_binding(&self) -> Result<(), Error> {
        #[cfg(feature = "coap")]
        let has_coap = self.coap.is_some();
        #[cfg(not(feature = "coap"))]
        let has_coap = false;

        if self.http.is_none() && self.ws.is_none() && !has_coap {
            return Err(Error::Internal(
                "configuration enables no protocol binding; at least one of http/ws/coap is required"
                    .into(),
            ));
        }

        Ok(())
    }

    fn check_distinct_ports(&self) -> Result<(), Error> {
        let mut ports = Vec::new();
        if let Some(http) = &self.http {
            ports.push(("http", http.port));
        }
        if let Some(ws) = &self.ws {
            ports.push(("ws", ws.port));
        }
        #[cfg(feature = "coap")]
        if let Some(coap) = &self.coap {
            ports.push(("coap", coap.port));
        }

        for (i, (name_a, port_a)) in ports.iter().enumerate() {
            for (name_b, port_b) in &ports[i + 1..] {
                if port_a == port_b && *port_a != 0 {
                    return Err(Error::Internal(format!(
                        "bindings `{name_a}` and `{name_b}` both request port {port_a}"
                    )));
                }
            }
        }

        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.check_at_least_one_binding()?;
        self.check_distinct_ports()?;

        Ok(())
    }
}
