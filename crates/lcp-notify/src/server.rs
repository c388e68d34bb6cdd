use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use subtle::ConstantTimeEq;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use lcp_types::rpc::{Command, Envelope, ReplyError};

use crate::NotifyError;
use crate::protocol::{read_command, read_frame, write_frame};

/// Per-read idle deadline on inbound connections.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Message sent back for every request rejected before reaching a handler.
const GENERIC_ERROR: &str = "invalid request";

/// Typed handler for one command.
pub trait Handler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send;
    type Error: Display + Send;

    fn call(&self, req: Self::Request) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send;
}

trait ErasedHandler: Send + Sync {
    fn call(&self, payload: Value) -> BoxFuture<'_, Result<Vec<u8>, Rejection>>;
}

enum Rejection {
    /// Payload did not decode: answered generically.
    Decode(String),
    /// The handler ran and failed: its message is forwarded.
    Handler(String),
}

struct Typed<H>(H);

impl<H: Handler> ErasedHandler for Typed<H> {
    fn call(&self, payload: Value) -> BoxFuture<'_, Result<Vec<u8>, Rejection>> {
        Box::pin(async move {
            let req: H::Request = serde_json::from_value(payload).map_err(|e| Rejection::Decode(e.to_string()))?;
            let resp = self.0.call(req).await.map_err(|e| Rejection::Handler(e.to_string()))?;
            serde_json::to_vec(&resp).map_err(|e| Rejection::Handler(e.to_string()))
        })
    }
}

/// Command-dispatching RPC listener guarded by one shared credential.
pub struct Endpoint {
    handlers: HashMap<&'static str, Arc<dyn ErasedHandler>>,
    user: String,
    password: String,
}

impl Endpoint {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            handlers: HashMap::new(),
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn register<H: Handler>(mut self, command: Command, handler: H) -> Self {
        self.handlers.insert(command.as_str(), Arc::new(Typed(handler)));
        self
    }

    /// False when either half of the credential is empty; such an endpoint
    /// refuses every command.
    pub fn is_configured(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }

    pub fn commands(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Accept connections until the task is cancelled.
    pub async fn run(self, listener: TcpListener) {
        let endpoint = Arc::new(self);
        if let Ok(addr) = listener.local_addr() {
            info!("RPC endpoint listening on {} ({} commands)", addr, endpoint.handlers.len());
        }
        if !endpoint.is_configured() {
            warn!("RPC credentials not configured, every command will be refused");
        }

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("RPC: connection from {}", addr);
                    let endpoint = endpoint.clone();
                    tokio::spawn(async move {
                        if let Err(e) = endpoint.handle_connection(stream).await {
                            warn!("RPC connection from {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("RPC accept error: {}", e);
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), NotifyError> {
        socket2::SockRef::from(&stream).set_nodelay(true)?;

        let command = read_timed(read_command(&mut stream)).await?;
        let body = read_timed(read_frame(&mut stream)).await?;

        let reply = match self.dispatch(&command, &body).await {
            Ok(reply) => reply,
            Err(message) => serde_json::to_vec(&ReplyError { error: message })?,
        };

        write_frame(&mut stream, &reply).await
    }

    async fn dispatch(&self, command: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        let Some(handler) = self.handlers.get(command) else {
            warn!(command, "RPC: unknown command");
            return Err(GENERIC_ERROR.into());
        };

        let envelope: Envelope<Value> = serde_json::from_slice(body).map_err(|e| {
            warn!(command, "RPC: undecodable envelope: {}", e);
            GENERIC_ERROR.to_string()
        })?;

        if !self.authorized(&envelope.user, &envelope.password) {
            warn!(command, user = %envelope.user, "RPC: bad credentials");
            return Err(GENERIC_ERROR.into());
        }

        match handler.call(envelope.payload).await {
            Ok(reply) => {
                debug!(command, "RPC: handled");
                Ok(reply)
            }
            Err(Rejection::Decode(e)) => {
                warn!(command, "RPC: undecodable payload: {}", e);
                Err(GENERIC_ERROR.into())
            }
            Err(Rejection::Handler(e)) => {
                warn!(command, "RPC: handler failed: {}", e);
                Err(e)
            }
        }
    }

    fn authorized(&self, user: &str, password: &str) -> bool {
        if !self.is_configured() {
            return false;
        }
        let user_ok = user.as_bytes().ct_eq(self.user.as_bytes());
        let password_ok = password.as_bytes().ct_eq(self.password.as_bytes());
        bool::from(user_ok & password_ok)
    }
}

async fn read_timed<T>(fut: impl Future<Output = Result<T, NotifyError>>) -> Result<T, NotifyError> {
    tokio::time::timeout(READ_TIMEOUT, fut)
        .await
        .map_err(|_| NotifyError::Timeout)?
}
