use crate::error::{ProbeError, ProbeOutcome};
use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER};
use reqwest::{Client, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const LOGIN_PATH: &str = "/mics/j_spring_security_check";
const LOGIN_PAGE: &str = "/mics/login.jsp";
const LANDING_PAGE: &str = "/mics/mics.html";
const LOGIN_FAILED_MARKER: &str = "Login Failed";
const LOGIN_FAILED: &str = "LOGIN: Login Failed. Invalid username or password. \
                            Multiple invalid attempts may result in account lockout.";
const LOGGED_IN_COOKIE: &str = "_mi_isLoggedIn=1";

/// Where and as whom to log into the management console.
#[derive(Debug, Clone)]
pub struct ConsoleTarget {
    /// Scheme, host and port, e.g. `https://core.example.net:8443`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// The single request issued after a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleRequest {
    Get {
        path: String,
    },
    Post {
        path: String,
        form: Vec<(String, String)>,
    },
}

impl ConsoleRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::Get { path: path.into() }
    }

    pub fn post(path: impl Into<String>, form: &[(&str, &str)]) -> Self {
        Self::Post {
            path: path.into(),
            form: form
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn path(&self) -> &str {
        match self {
            Self::Get { path } | Self::Post { path, .. } => path,
        }
    }
}

/// CSRF header pair scraped from the post-login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    pub name: String,
    pub value: String,
}

/// Logs in, then performs `request` within the same cookie session and returns its body.
///
/// The session lives for exactly this call.
pub async fn fetch(target: &ConsoleTarget, request: &ConsoleRequest) -> ProbeOutcome<String> {
    let base = target.base_url.trim_end_matches('/');
    let jar = Arc::new(Jar::default());
    let client = Client::builder()
        .cookie_provider(Arc::clone(&jar))
        .danger_accept_invalid_certs(true)
        .timeout(target.timeout)
        .build()
        .map_err(|err| ProbeError::transport(err.to_string()))?;

    let token = login(&client, base, target).await?;

    let base_url = Url::parse(base)
        .map_err(|err| ProbeError::config(format!("invalid console url {base}: {err}")))?;
    jar.add_cookie_str(LOGGED_IN_COOKIE, &base_url);

    let headers = follow_up_headers(base, &target.username, &token)?;
    let url = format!("{base}{}", request.path());
    let builder = match request {
        ConsoleRequest::Get { .. } => client.get(&url),
        ConsoleRequest::Post { form, .. } => client.post(&url).form(form),
    };
    let resp = builder.headers(headers).send().await.map_err(|err| {
        warn!(url = %url, error = %err, "console request failed");
        ProbeError::transport(format!("REQUEST: {err}"))
    })?;

    let status = resp.status();
    if status != StatusCode::OK {
        warn!(url = %url, status = status.as_u16(), "console request rejected");
        return Err(ProbeError::protocol(format!("REQUEST: HTTP {}", status.as_u16())));
    }
    debug!(url = %url, "console request done");
    resp.text()
        .await
        .map_err(|err| ProbeError::transport(format!("REQUEST: {err}")))
}

async fn login(client: &Client, base: &str, target: &ConsoleTarget) -> ProbeOutcome<CsrfToken> {
    let url = format!("{base}{LOGIN_PATH}");
    let resp = client
        .post(&url)
        .header(REFERER, format!("{base}{LOGIN_PAGE}"))
        .form(&[
            ("j_username", target.username.as_str()),
            ("j_password", target.password.as_str()),
        ])
        .send()
        .await
        .map_err(|err| {
            warn!(url = %url, error = %err, "console login failed");
            ProbeError::transport(format!("LOGIN: {err}"))
        })?;

    let status = resp.status();
    if status != StatusCode::OK {
        warn!(url = %url, status = status.as_u16(), "console login rejected");
        return Err(ProbeError::protocol(format!("LOGIN: HTTP {}", status.as_u16())));
    }
    let body = resp
        .text()
        .await
        .map_err(|err| ProbeError::transport(format!("LOGIN: {err}")))?;

    if body.contains(LOGIN_FAILED_MARKER) {
        warn!(user = %target.username, "console refused credentials");
        return Err(ProbeError::protocol(LOGIN_FAILED));
    }
    let token = extract_csrf(&body)?;
    debug!(header = %token.name, "console login succeeded");
    Ok(token)
}

/// Finds the `csrfKey`/`csrfNonce` assignments embedded in the console page.
pub fn extract_csrf(body: &str) -> ProbeOutcome<CsrfToken> {
    let capture = |pattern: &str, what: &str| {
        let re = Regex::new(pattern).map_err(|err| ProbeError::protocol(err.to_string()))?;
        re.captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ProbeError::protocol(format!("LOGIN: {what} not found in console page")))
    };
    Ok(CsrfToken {
        name: capture(r#"csrfKey = "(\w+)";"#, "csrfKey")?,
        value: capture(r#"csrfNonce = "(\w+)";"#, "csrfNonce")?,
    })
}

fn follow_up_headers(base: &str, username: &str, token: &CsrfToken) -> ProbeOutcome<HeaderMap> {
    let value = |v: &str| {
        HeaderValue::from_str(v)
            .map_err(|_| ProbeError::protocol(format!("REQUEST: invalid header value {v:?}")))
    };
    let csrf_name = HeaderName::from_bytes(token.name.as_bytes())
        .map_err(|_| ProbeError::protocol(format!("REQUEST: invalid CSRF header {:?}", token.name)))?;

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("authuserid"), value(username)?);
    headers.insert(ORIGIN, value(base)?);
    headers.insert(REFERER, value(&format!("{base}{LANDING_PAGE}"))?);
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    headers.insert(csrf_name, value(&token.value)?);
    Ok(headers)
}
