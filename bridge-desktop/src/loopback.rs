//! Loopback consent prompt
//!
//! Opens the system browser on the provider's consent page and serves the
//! redirect URI's path on its loopback address until the provider redirects
//! back with `?code=..&state=..`.

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use bridge_traits::{
    error::{BridgeError, Result},
    prompt::{AuthorizationPrompt, AuthorizationRequest, AuthorizationResponse},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

const SUCCESS_PAGE: &str =
    "<html><body><h2>Signed in.</h2><p>You can close this tab and return to the app.</p></body></html>";
const FAILURE_PAGE: &str =
    "<html><body><h2>Sign-in failed.</h2><p>No authorization code was received.</p></body></html>";

type CallbackParams = HashMap<String, String>;

/// Hands the first callback's query parameters back to `authorize`.
struct CallbackState {
    params_tx: Mutex<Option<oneshot::Sender<CallbackParams>>>,
}

async fn callback_handler(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let page = if params.contains_key("code") {
        SUCCESS_PAGE
    } else {
        FAILURE_PAGE
    };

    let sender = match state.params_tx.lock() {
        Ok(mut guard) => guard.take(),
        Err(_) => None,
    };
    match sender {
        Some(tx) => {
            let _ = tx.send(params);
        }
        None => debug!("Ignoring repeated authorization callback"),
    }

    Html(page)
}

/// Desktop [`AuthorizationPrompt`] backed by a short-lived `axum` server on the
/// loopback interface.
pub struct LoopbackAuthorizationPrompt {
    open_browser: bool,
}

impl LoopbackAuthorizationPrompt {
    pub fn new() -> Self {
        Self { open_browser: true }
    }

    /// Only listen; the caller takes care of showing the URL.
    pub fn without_browser() -> Self {
        Self {
            open_browser: false,
        }
    }

    async fn bind(redirect_uri: &str) -> Result<(TcpListener, String)> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid redirect URI: {}", e)))?;
        let host = url.host_str().unwrap_or("127.0.0.1");
        let port = url.port_or_known_default().unwrap_or(80);

        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            BridgeError::OperationFailed(format!(
                "Failed to bind callback listener on {}:{}: {}",
                host, port, e
            ))
        })?;

        Ok((listener, url.path().to_string()))
    }
}

impl Default for LoopbackAuthorizationPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationPrompt for LoopbackAuthorizationPrompt {
    async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthorizationResponse> {
        let (listener, path) = Self::bind(&request.redirect_uri).await?;

        let (params_tx, params_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let app = Router::new()
            .route(&path, get(callback_handler))
            .with_state(Arc::new(CallbackState {
                params_tx: Mutex::new(Some(params_tx)),
            }));

        // Graceful shutdown lets the callback page finish before the server stops.
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = stop_rx.await;
            });
            if let Err(e) = server.await {
                warn!(error = %e, "Callback server stopped with an error");
            }
        });
        info!(redirect_uri = %request.redirect_uri, "Waiting for authorization callback");

        if self.open_browser {
            if let Err(e) = webbrowser::open(&request.url) {
                warn!(error = %e, "Could not open a browser; visit this URL manually: {}", request.url);
            }
        }

        let params = params_rx.await;
        let _ = stop_tx.send(());
        let params = params.map_err(|_| {
            BridgeError::OperationFailed("Callback server closed before redirect".to_string())
        })?;

        match (params.get("code"), params.get("state")) {
            (Some(code), Some(state)) => Ok(AuthorizationResponse {
                code: code.clone(),
                state: state.clone(),
            }),
            _ => match params.get("error").map(String::as_str) {
                Some("access_denied") => Err(BridgeError::Cancelled),
                Some(error) => Err(BridgeError::OperationFailed(format!(
                    "Authorization error: {}",
                    error
                ))),
                None => Err(BridgeError::OperationFailed(
                    "Callback carried no authorization code".to_string(),
                )),
            },
        }
    }
}
