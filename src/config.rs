use std::fmt;
use std::sync::Arc;

use http::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_LENGTH, HOST, USER_AGENT};
use http::{HeaderName, HeaderValue, Method, Uri};
use rustls::{ClientConfig, RootCertStore};

use crate::codec::OutboundRequest;
use crate::{Error, Target};

const DEFAULT_USER_AGENT: &str = concat!("oneshot-http/", env!("CARGO_PKG_VERSION"));
const DEFAULT_READ_BUFFER: usize = 16 * 1024;

/// Form of the request-target on the request line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestForm {
    /// `GET https://host/path?query HTTP/1.1`
    #[default]
    Absolute,
    /// `GET /path?query HTTP/1.1`
    Origin,
}

/// Everything the [`crate::Driver`] needs for one exchange.
///
/// ```
/// # use oneshot_http::{Config, Target};
/// let config = Config::new(Target::https("api.example.com").with_path("search"))
///     .user_agent("client/1.0")
///     .header("x-trace", "abc").unwrap();
///
/// let req = config.request().unwrap();
/// assert_eq!(req.uri(), "https://api.example.com/search");
/// ```
#[derive(Clone)]
pub struct Config {
    target: Target,
    method: Method,
    user_agent: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<Vec<u8>>,
    request_form: RequestForm,
    tls: Option<Arc<ClientConfig>>,
    read_buffer_size: usize,
}

impl Config {
    pub fn new(target: Target) -> Self {
        Config {
            target,
            method: Method::GET,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: Vec::new(),
            body: None,
            request_form: RequestForm::default(),
            tls: None,
            read_buffer_size: DEFAULT_READ_BUFFER,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add an extra request header. A header with the same name as one of
    /// the defaults replaces that default.
    pub fn header<K, V>(mut self, key: K, value: V) -> Result<Self, Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(key).map_err(|e| -> http::Error { e.into() })?;
        let value = HeaderValue::try_from(value).map_err(|e| -> http::Error { e.into() })?;
        self.headers.push((name, value));
        Ok(self)
    }

    /// Send a body, framed by content-length.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn request_form(mut self, form: RequestForm) -> Self {
        self.request_form = form;
        self
    }

    /// Use a specific TLS config instead of the webpki root store.
    pub fn tls(mut self, tls: Arc<ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn get_method(&self) -> &Method {
        &self.method
    }

    pub fn get_body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn get_read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    /// The TLS config for https targets.
    pub fn tls_config(&self) -> Result<Arc<ClientConfig>, Error> {
        match &self.tls {
            Some(v) => Ok(v.clone()),
            None => default_tls_config(),
        }
    }

    /// Build the one request of the exchange.
    pub fn request(&self) -> Result<OutboundRequest, Error> {
        let uri = match self.request_form {
            RequestForm::Absolute => self.target.uri(),
            RequestForm::Origin => self.target.origin(),
        };

        // Path and query from the builders are not checked until here.
        uri.parse::<Uri>()
            .map_err(|e| Error::InvalidTarget(format!("{:?}: {}", uri, e)))?;

        let defaults = [
            (HOST, self.target.header_host()),
            (USER_AGENT, self.user_agent.clone()),
            (ACCEPT_ENCODING, "identity".to_string()),
            (ACCEPT, "application/json".to_string()),
        ];

        let mut req = OutboundRequest::new(self.method.clone(), uri);

        for (name, value) in defaults {
            if self.headers.iter().any(|(n, _)| *n == name) {
                continue;
            }
            req = req.header(name, value)?;
        }

        for (name, value) in &self.headers {
            req = req.header(name.clone(), value.clone())?;
        }

        if let Some(body) = &self.body {
            req = req.header(CONTENT_LENGTH, body.len().to_string())?;
        }

        Ok(req)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("target", &self.target)
            .field("method", &self.method)
            .field("user_agent", &self.user_agent)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|b| b.len()))
            .field("request_form", &self.request_form)
            .field("tls", &self.tls.is_some())
            .field("read_buffer_size", &self.read_buffer_size)
            .finish()
    }
}

fn default_tls_config() -> Result<Arc<ClientConfig>, Error> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}
