use std::fmt;
use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cancel::CancelSignal;
use crate::error::FetchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Reads an HTML form `method` attribute. Anything but `post` is GET.
    pub fn from_form_attr(attr: Option<&str>) -> Self {
        match attr {
            Some(m) if m.trim().eq_ignore_ascii_case("post") => Method::Post,
            _ => Method::Get,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    /// Form-encoded body pairs, only sent for POST.
    pub form: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            form: Vec::new(),
        }
    }
}

/// Anything able to turn a request into a response body.
pub trait Fetch {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError>;
}

/// Fetches `request`, giving up as soon as `cancel` fires.
pub async fn fetch_or_cancel<F: Fetch>(
    fetcher: &F,
    request: &FetchRequest,
    cancel: &CancelSignal,
) -> Result<String, FetchError> {
    match cancel.guard(fetcher.fetch(request)).await {
        Some(result) => result,
        None => Err(FetchError::Cancelled {
            url: request.url.to_string(),
        }),
    }
}

/// reqwest-backed transport. Certificate validation is off on purpose, the
/// targets of a scan rarely carry trusted certificates.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(true)
            .cookie_store(true)
            .timeout(timeout)
            .user_agent(concat!("idxss/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        debug!("{} {}", request.method, request.url);

        let builder = match request.method {
            Method::Get => self.client.get(request.url.clone()),
            Method::Post => self.client.post(request.url.clone()).form(&request.form),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(request.url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(request.url.as_str(), e))
    }
}
