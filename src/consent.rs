//! Interactive OAuth consent: sends the user to Google and captures the
//! authorization code, either from a loopback redirect or from a paste.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{DriveError, Result};
use crate::models::ClientSecrets;

/// Redirect target for the paste-the-code flow.
pub const MANUAL_REDIRECT_URI: &str = "http://localhost";

/// How the authorization code is obtained from the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConsentMode {
    /// Listen on a loopback port and let the browser redirect to it.
    #[default]
    LocalServer,
    /// Print the consent URL and read the code from stdin.
    Manual,
    /// Use a code that was obtained out of band.
    Provided(AuthorizationCode),
}

/// An authorization code together with the redirect URI it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub redirect_uri: String,
}

impl AuthorizationCode {
    /// A code issued for the paste-the-code redirect.
    pub fn pasted(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            redirect_uri: MANUAL_REDIRECT_URI.to_string(),
        }
    }
}

/// Build the consent URL for an installed application.
///
/// Returns the URL together with the CSRF token it carries as `state`.
pub fn authorization_url(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    scope: &str,
) -> Result<(Url, CsrfToken)> {
    let auth_url = AuthUrl::new(secrets.auth_uri.clone())
        .map_err(|e| DriveError::AuthenticationError(format!("Invalid auth URI: {}", e)))?;
    let redirect_url = RedirectUrl::new(redirect_uri.to_string())
        .map_err(|e| DriveError::AuthenticationError(format!("Invalid redirect URI: {}", e)))?;

    let client = BasicClient::new(ClientId::new(secrets.client_id.clone()))
        .set_auth_uri(auth_url)
        .set_redirect_uri(redirect_url);

    Ok(client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(scope.to_string()))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .url())
}

/// Run the consent flow and return the code Google hands back.
pub async fn obtain_code(
    mode: &ConsentMode,
    secrets: &ClientSecrets,
    scope: &str,
) -> Result<AuthorizationCode> {
    match mode {
        ConsentMode::LocalServer => {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            let port = listener.local_addr()?.port();
            let redirect_uri = format!("http://127.0.0.1:{}/", port);

            let (url, state) = authorization_url(secrets, &redirect_uri, scope)?;
            show_consent_url(&url, true);

            let code = wait_for_redirect(listener, state.secret()).await?;
            Ok(AuthorizationCode { code, redirect_uri })
        }
        ConsentMode::Manual => {
            let (url, state) = authorization_url(secrets, MANUAL_REDIRECT_URI, scope)?;
            show_consent_url(&url, false);
            eprint!("Paste the authorization code (or the full redirected URL): ");

            let mut line = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await?;

            let code = parse_pasted_code(&line, state.secret())?;
            Ok(AuthorizationCode::pasted(code))
        }
        ConsentMode::Provided(code) => {
            debug!(redirect_uri = %code.redirect_uri, "using provided authorization code");
            Ok(code.clone())
        }
    }
}

fn show_consent_url(url: &Url, try_browser: bool) {
    eprintln!("Authorize access to Google Drive by visiting:\n\n  {}\n", url);
    if try_browser {
        if let Err(e) = open::that(url.as_str()) {
            warn!(error = %e, "could not open a browser, open the link manually");
        }
    }
}

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl RedirectParams {
    fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// Whether this request is the consent redirect rather than a stray
    /// browser request such as a favicon lookup.
    pub fn is_redirect(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }

    /// Validate the redirect and return its code.
    ///
    /// `state` is checked when the redirect carries one.
    pub fn into_code(self, expected_state: &str) -> Result<String> {
        if let Some(error) = self.error {
            return Err(DriveError::AuthenticationError(format!(
                "Consent was not granted: {}",
                error
            )));
        }
        if self.state.is_some_and(|s| s != expected_state) {
            return Err(DriveError::AuthenticationError(
                "State mismatch in consent redirect".to_string(),
            ));
        }

        self.code.filter(|c| !c.is_empty()).ok_or_else(|| {
            DriveError::AuthenticationError("No authorization code in redirect".to_string())
        })
    }
}

#[derive(Clone)]
struct RedirectState {
    received: mpsc::Sender<RedirectParams>,
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    Query(params): Query<RedirectParams>,
) -> (StatusCode, &'static str) {
    if !params.is_redirect() {
        return (StatusCode::NOT_FOUND, "Not found.");
    }

    let body = if params.error.is_none() {
        "Authorization complete. You can close this window."
    } else {
        "Authorization failed. Check the terminal for details."
    };
    if state.received.try_send(params).is_err() {
        debug!("consent redirect already received");
    }
    (StatusCode::OK, body)
}

/// Serve the loopback redirect until Google sends the browser back.
async fn wait_for_redirect(listener: TcpListener, expected_state: &str) -> Result<String> {
    let (received, mut redirects) = mpsc::channel(1);
    let (shutdown, shutdown_signal) = oneshot::channel::<()>();

    let app = Router::new()
        .route("/", get(handle_redirect))
        .with_state(RedirectState { received });

    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_signal.await;
        });
        if let Err(e) = server.await {
            debug!(error = %e, "consent server stopped");
        }
    });

    let params = redirects.recv().await;
    let _ = shutdown.send(());

    params
        .ok_or_else(|| {
            DriveError::AuthenticationError(
                "Consent server stopped before the redirect arrived".to_string(),
            )
        })?
        .into_code(expected_state)
}

/// Pull the authorization code out of a redirect URL.
pub fn parse_redirect(url: &str, expected_state: &str) -> Result<String> {
    let url = Url::parse(url)
        .map_err(|e| DriveError::AuthenticationError(format!("Invalid redirect URL: {}", e)))?;
    RedirectParams::from_url(&url).into_code(expected_state)
}

/// Accept either a bare code or the whole URL the browser was sent to.
pub fn parse_pasted_code(input: &str, expected_state: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return parse_redirect(trimmed, expected_state);
    }
    if trimmed.is_empty() {
        return Err(DriveError::AuthenticationError(
            "No authorization code entered".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
