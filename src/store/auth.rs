//! Bearer tokens for the GCS JSON API.

use crate::{MirrorError, Result};
use gcp_auth::TokenProvider;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

const SCOPES: &[&str] = &["https://www.googleapis.com/auth/devstorage.read_write"];

/// Where request credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// A pre-minted OAuth2 access token (`GOOGLE_OAUTH_ACCESS_TOKEN`)
    Token(String),
    /// Application Default Credentials: `GOOGLE_APPLICATION_CREDENTIALS`,
    /// the gcloud user config, or the metadata server
    Default,
    /// No credentials, for storage emulators
    Anonymous,
}

impl AuthMode {
    /// An explicit token always wins; an emulator needs none; otherwise ADC.
    pub fn select(token: Option<String>, emulator: bool) -> Self {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => AuthMode::Token(token),
            None if emulator => AuthMode::Anonymous,
            None => AuthMode::Default,
        }
    }
}

/// Produces the bearer token for each request. ADC tokens are cached and
/// refreshed by the provider, so long runs outlive a single token.
pub enum Authorizer {
    Anonymous,
    Static(String),
    Default {
        provider: Arc<dyn TokenProvider>,
        runtime: Runtime,
    },
}

impl Authorizer {
    /// Resolve credentials up front so a misconfigured host fails before any transfer.
    pub fn new(mode: &AuthMode) -> Result<Self> {
        match mode {
            AuthMode::Anonymous => Ok(Authorizer::Anonymous),
            AuthMode::Token(token) => Ok(Authorizer::Static(token.clone())),
            AuthMode::Default => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| MirrorError::Authentication(format!("Cannot start token runtime: {}", e)))?;
                let provider = runtime
                    .block_on(gcp_auth::provider())
                    .map_err(|e| MirrorError::Authentication(format!("No Application Default Credentials: {}", e)))?;
                debug!("Using Application Default Credentials");
                let authorizer = Authorizer::Default { provider, runtime };
                authorizer.token()?;
                Ok(authorizer)
            }
        }
    }

    pub fn token(&self) -> Result<Option<String>> {
        match self {
            Authorizer::Anonymous => Ok(None),
            Authorizer::Static(token) => Ok(Some(token.clone())),
            Authorizer::Default { provider, runtime } => {
                let token = runtime
                    .block_on(provider.token(SCOPES))
                    .map_err(|e| MirrorError::Authentication(format!("Fetching access token failed: {}", e)))?;
                Ok(Some(token.as_str().to_string()))
            }
        }
    }
}
