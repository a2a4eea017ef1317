//! The backend seam behind the HTTP routes.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use zeroize::Zeroizing;

use hidproxy_core::keymap::ascii::keystroke_for;

use crate::domain::{StatusReport, UnsealResult, WebError, WebRequest, WebResponse};

/// Everything the routes need from the device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MacroBackend: Send + Sync {
    async fn get_macros(&self) -> Result<String, WebError>;

    /// Returns the number of macros stored.
    async fn put_macros(&self, text: String) -> Result<usize, WebError>;

    async fn status(&self) -> Result<StatusReport, WebError>;

    async fn unseal(&self, password: &str) -> Result<UnsealResult, WebError>;
}

/// A request in flight to executor D together with its reply slot.
#[derive(Debug)]
pub struct WebCommand {
    pub request: WebRequest,
    pub reply: oneshot::Sender<Result<WebResponse, WebError>>,
}

impl WebCommand {
    /// Answers the request.  A client that hung up is not an error.
    pub fn respond(self, result: Result<WebResponse, WebError>) {
        if self.reply.send(result).is_err() {
            warn!("web client went away before the reply");
        }
    }
}

/// Converts a typed password to the keycodes physical typing would produce.
///
/// Only the keycode is kept; Shift is dropped just as the keyboard password
/// buffer drops it, so `Secret` and `secret` unseal alike from either path.
pub fn password_keycodes(password: &str) -> Result<Zeroizing<Vec<u8>>, WebError> {
    let mut codes = Zeroizing::new(Vec::with_capacity(password.len()));
    for ch in password.chars() {
        let stroke = keystroke_for(ch)
            .ok_or_else(|| WebError::BadRequest("password has a character with no key".into()))?;
        codes.push(stroke.keycode);
    }
    Ok(codes)
}

/// Production backend: posts each call to executor D and awaits the reply.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    tx: mpsc::Sender<WebCommand>,
}

impl DeviceHandle {
    /// Creates a handle and the receiver executor D drains.
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<WebCommand>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx }, rx)
    }

    async fn request(&self, request: WebRequest) -> Result<WebResponse, WebError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(WebCommand { request, reply })
            .await
            .map_err(|_| WebError::Unavailable)?;
        answer.await.map_err(|_| WebError::Unavailable)?
    }
}

fn unexpected(resp: WebResponse) -> WebError {
    WebError::Storage(format!("unexpected reply: {resp:?}"))
}

#[async_trait]
impl MacroBackend for DeviceHandle {
    async fn get_macros(&self) -> Result<String, WebError> {
        match self.request(WebRequest::GetMacros).await? {
            WebResponse::Macros(text) => Ok(text),
            other => Err(unexpected(other)),
        }
    }

    async fn put_macros(&self, text: String) -> Result<usize, WebError> {
        match self.request(WebRequest::PutMacros(text)).await? {
            WebResponse::Stored(n) => Ok(n),
            other => Err(unexpected(other)),
        }
    }

    async fn status(&self) -> Result<StatusReport, WebError> {
        match self.request(WebRequest::Status).await? {
            WebResponse::Status(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    async fn unseal(&self, password: &str) -> Result<UnsealResult, WebError> {
        let password = password_keycodes(password)?;
        match self.request(WebRequest::Unseal { password }).await? {
            WebResponse::Unseal(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
