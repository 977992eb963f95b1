//! Backend plugins.
//!
//! A [`Plugin`] adapts the client to a backend's authentication scheme: it
//! decorates outgoing HTTP requests and picks the [`MessageCodec`] used on
//! the subscription socket (which in turn decides the handshake URL).

use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, HeaderValue};
use url::Url;

use crate::codec::{AppSyncCodec, DefaultCodec, MessageCodec};
use crate::error::Result;

/// Backend-specific request decoration and codec selection.
pub trait Plugin: Send + Sync + fmt::Debug {
    /// Add headers to an HTTP query/mutation request or to the websocket
    /// upgrade request.
    fn decorate(&self, headers: &mut HeaderMap, for_websocket: bool) -> Result<()>;

    /// The codec to use for subscriptions against `endpoint`.
    fn codec(&self, endpoint: &Url) -> Result<Arc<dyn MessageCodec>> {
        let _ = endpoint;
        Ok(Arc::new(DefaultCodec))
    }
}

/// API-key authentication for AWS AppSync.
///
/// HTTP requests get an `x-api-key` header. Subscriptions use
/// [`AppSyncCodec`], which carries the key in the handshake URL and in every
/// `start` frame instead of in headers.
#[derive(Clone)]
pub struct AppSyncPlugin {
    api_key: String,
}

impl AppSyncPlugin {
    /// Create a plugin for the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for AppSyncPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppSyncPlugin")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Plugin for AppSyncPlugin {
    fn decorate(&self, headers: &mut HeaderMap, for_websocket: bool) -> Result<()> {
        if !for_websocket {
            headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        }
        Ok(())
    }

    fn codec(&self, endpoint: &Url) -> Result<Arc<dyn MessageCodec>> {
        Ok(Arc::new(AppSyncCodec::new(endpoint, self.api_key.clone())?))
    }
}
