//! Connection configuration.

use std::sync::Arc;
use std::time::Duration;

/// SOCKS protocol version for the optional proxy hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyVersion {
    /// SOCKS4.
    V4,
    /// SOCKS5.
    #[default]
    V5,
}

/// SOCKS proxy descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy hostname or address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Optional username.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// SOCKS protocol version.
    pub version: ProxyVersion,
}

impl ProxyConfig {
    /// Creates an unauthenticated SOCKS5 proxy descriptor.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            version: ProxyVersion::V5,
        }
    }

    /// Sets the proxy credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the SOCKS protocol version.
    #[must_use]
    pub const fn version(mut self, version: ProxyVersion) -> Self {
        self.version = version;
        self
    }
}

/// IMAP connection configuration.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Plaintext port for the direct path (STARTTLS negotiates upward).
    pub port: u16,
    /// TLS port, used by the proxy path and the implicit-TLS path.
    pub tls_port: u16,
    /// Login username.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Connect with implicit TLS to `tls_port` instead of plaintext.
    pub tls: bool,
    /// Custom rustls client configuration; defaults to the webpki roots.
    pub tls_config: Option<Arc<rustls::ClientConfig>>,
    /// Issue LOGIN automatically once ready. Defaults to true.
    pub auto_login: bool,
    /// Send NOOP when the connection has been quiet for the keepalive
    /// interval.
    pub keepalive: bool,
    /// Quiet interval before a keepalive NOOP.
    pub keepalive_interval: Duration,
    /// Idle timeout on the socket; firing destroys the connection.
    pub socket_timeout: Duration,
    /// Bound on TCP + proxy + TLS establishment.
    pub connect_timeout: Duration,
    /// Bound on the LOGIN exchange.
    pub auth_timeout: Duration,
    /// Optional SOCKS proxy hop.
    pub proxy: Option<ProxyConfig>,
}

impl ImapConfig {
    /// Creates a configuration with defaults for the given host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 143,
            tls_port: 993,
            user: String::new(),
            password: String::new(),
            tls: false,
            tls_config: None,
            auto_login: true,
            keepalive: false,
            keepalive_interval: Duration::from_secs(60),
            socket_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(30),
            proxy: None,
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ImapConfigBuilder {
        ImapConfigBuilder {
            config: Self::new(host),
        }
    }
}

/// Builder for [`ImapConfig`].
#[derive(Debug, Clone)]
pub struct ImapConfigBuilder {
    config: ImapConfig,
}

impl ImapConfigBuilder {
    /// Sets the plaintext port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the TLS port.
    #[must_use]
    pub const fn tls_port(mut self, port: u16) -> Self {
        self.config.tls_port = port;
        self
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.user = user.into();
        self.config.password = password.into();
        self
    }

    /// Connects with implicit TLS instead of plaintext + STARTTLS.
    #[must_use]
    pub const fn tls(mut self, tls: bool) -> Self {
        self.config.tls = tls;
        self
    }

    /// Uses a custom rustls client configuration for TLS handshakes.
    #[must_use]
    pub fn tls_config(mut self, tls_config: Arc<rustls::ClientConfig>) -> Self {
        self.config.tls_config = Some(tls_config);
        self
    }

    /// Enables or disables automatic login (default: enabled).
    #[must_use]
    pub const fn auto_login(mut self, auto_login: bool) -> Self {
        self.config.auto_login = auto_login;
        self
    }

    /// Enables keepalive NOOPs with the given quiet interval.
    #[must_use]
    pub const fn keepalive(mut self, interval: Duration) -> Self {
        self.config.keepalive = true;
        self.config.keepalive_interval = interval;
        self
    }

    /// Sets the socket idle timeout.
    #[must_use]
    pub const fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.config.socket_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the login timeout.
    #[must_use]
    pub const fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout = timeout;
        self
    }

    /// Routes the connection through a SOCKS proxy.
    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ImapConfig {
        self.config
    }
}
