use std::fmt;
use std::str::FromStr;

use http::Uri;

use crate::Error;

/// Scheme of a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Port used when the target does not name one.
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Scheme::Https)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the one request goes.
///
/// Only parts that were explicitly given are rendered by [`Target::uri()`] and
/// [`Target::header_host()`]. In particular an explicit port is always rendered,
/// also when it equals the scheme default.
///
/// The path is held without its leading `/`.
///
/// ```
/// # use oneshot_http::Target;
/// let target = Target::https("api.example.com")
///     .with_path("search/items")
///     .with_query("q=x&sort=y");
///
/// assert_eq!(target.uri(), "https://api.example.com/search/items?q=x&sort=y");
/// assert_eq!(target.effective_port(), 443);
/// assert_eq!(target.header_host(), "api.example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: Option<String>,
    query: Option<String>,
}

impl Target {
    pub fn new(
        scheme: Scheme,
        host: impl Into<String>,
        port: Option<u16>,
        path: Option<String>,
        query: Option<String>,
    ) -> Self {
        Target {
            scheme,
            host: host.into(),
            port,
            path,
            query,
        }
    }

    pub fn http(host: impl Into<String>) -> Self {
        Target::new(Scheme::Http, host, None, None, None)
    }

    pub fn https(host: impl Into<String>) -> Self {
        Target::new(Scheme::Https, host, None, None, None)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The explicit port, or the scheme default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Value for the `Host` header.
    pub fn header_host(&self) -> String {
        match self.port {
            Some(p) => format!("{}:{}", self.host, p),
            None => self.host.clone(),
        }
    }

    /// Absolute form: `scheme://host[:port][/path][?query]`.
    pub fn uri(&self) -> String {
        format!("{}://{}{}", self.scheme, self.header_host(), self.path_and_query())
    }

    /// Origin form: `/path[?query]`, never empty.
    pub fn origin(&self) -> String {
        let rest = self.path_and_query();
        if rest.starts_with('/') {
            rest
        } else {
            format!("/{}", rest)
        }
    }

    fn path_and_query(&self) -> String {
        let mut s = String::new();
        if let Some(p) = &self.path {
            s.push('/');
            s.push_str(p);
        }
        if let Some(q) = &self.query {
            s.push('?');
            s.push_str(q);
        }
        s
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri: Uri = s
            .parse()
            .map_err(|e: http::uri::InvalidUri| Error::InvalidTarget(e.to_string()))?;

        let scheme = match uri.scheme_str() {
            Some(v) if v.eq_ignore_ascii_case("https") => Scheme::Https,
            Some(v) if v.eq_ignore_ascii_case("http") => Scheme::Http,
            Some(v) => return Err(Error::InvalidTarget(format!("unsupported scheme: {}", v))),
            None => return Err(Error::InvalidTarget(format!("missing scheme: {}", s))),
        };

        let host = match uri.host() {
            Some(v) if !v.is_empty() => v,
            _ => return Err(Error::InvalidTarget(format!("missing host: {}", s))),
        };

        let path = uri.path().trim_start_matches('/');
        let path = (!path.is_empty()).then(|| path.to_string());

        Ok(Target {
            scheme,
            host: host.to_string(),
            port: uri.port_u16(),
            path,
            query: uri.query().map(|q| q.to_string()),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}
