use crate::error::{DispatchError, Result};
use crate::router::normalize_base_url;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

/// What the embedded server serves and where.
///
/// `addr: None` lets the [`PortAllocator`](crate::port_allocator::PortAllocator) pick a
/// loopback port. The base URL is the path prefix a reverse proxy puts in front of the
/// dispatcher; it is stored without leading or trailing slashes.
///
/// ```yaml
/// addr: 127.0.0.1:7001
/// base_url: proxy/7001
/// use_relative_links: true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: Option<SocketAddr>,
    pub base_url: Option<String>,
    pub use_relative_links: bool,
}

impl ServerConfig {
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(yaml)?;
        config.validated()
    }

    /// Load and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DispatchError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Normalise the base URL and reject characters that do not belong in a URL path.
    pub fn validated(mut self) -> Result<Self> {
        self.base_url = match self.base_url.as_deref() {
            Some(raw) => validate_base_url(raw)?,
            None => None,
        };
        Ok(self)
    }
}

fn validate_base_url(raw: &str) -> Result<Option<String>> {
    let Some(base) = normalize_base_url(raw) else {
        return Ok(None);
    };
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '/');
    if !base.chars().all(allowed) || base.contains("//") {
        return Err(DispatchError::Config(format!("invalid base_url: {raw:?}")));
    }
    Ok(Some(base))
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    addr: Option<SocketAddr>,
    base_url: Option<String>,
    use_relative_links: bool,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    #[must_use]
    pub fn ip_port(mut self, ip: IpAddr, port: u16) -> Self {
        self.addr = Some(SocketAddr::new(ip, port));
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn use_relative_links(mut self, enabled: bool) -> Self {
        self.use_relative_links = enabled;
        self
    }

    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] for an invalid base URL.
    pub fn build(self) -> Result<ServerConfig> {
        ServerConfig {
            addr: self.addr,
            base_url: self.base_url,
            use_relative_links: self.use_relative_links,
        }
        .validated()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::builder().build().unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(config.addr.is_none());
    }

    #[test]
    fn test_base_url_normalised() {
        let config = ServerConfig::builder().base_url("/proxy/7001/").build().unwrap();
        assert_eq!(config.base_url.as_deref(), Some("proxy/7001"));

        let config = ServerConfig::builder().base_url("/").build().unwrap();
        assert_eq!(config.base_url, None);
    }

    #[test]
    fn test_base_url_rejects_markup() {
        let err = ServerConfig::builder().base_url("a\"><script>").build().unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
        assert!(ServerConfig::builder().base_url("a//b").build().is_err());
    }

    #[test]
    fn test_yaml() {
        let config = ServerConfig::from_yaml_str(
            "addr: 127.0.0.1:7001\nbase_url: /dash/\nuse_relative_links: true\n",
        )
        .unwrap();
        assert_eq!(config.addr, Some("127.0.0.1:7001".parse().unwrap()));
        assert_eq!(config.base_url.as_deref(), Some("dash"));
        assert!(config.use_relative_links);
    }

    #[test]
    fn test_yaml_partial_uses_defaults() {
        let config = ServerConfig::from_yaml_str("use_relative_links: true\n").unwrap();
        assert!(config.addr.is_none());
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url: reports").unwrap();
        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("reports"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }
}
