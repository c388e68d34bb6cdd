use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::debug;

use lcp_types::rpc::{Command, Envelope};

use crate::NotifyError;
use crate::protocol::{read_frame, write_request};

/// Deadline of one outbound call: dial, write and read together.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Caller side of a peer's notification endpoint.
#[derive(Debug, Clone)]
pub struct NotifyClient {
    addr: String,
    user: String,
    password: String,
    timeout: Duration,
}

impl NotifyClient {
    pub fn new(addr: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            user: user.into(),
            password: password.into(),
            timeout: CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn call<Req, Resp>(&self, command: Command, payload: &Req) -> Result<Resp, NotifyError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let envelope = Envelope {
            user: self.user.clone(),
            password: self.password.clone(),
            payload,
        };
        let body = serde_json::to_vec(&envelope)?;

        let reply = tokio::time::timeout(self.timeout, self.round_trip(command, &body))
            .await
            .map_err(|_| NotifyError::Timeout)??;

        let value: Value = serde_json::from_slice(&reply)?;
        if let Some(message) = value.get("error") {
            let message = message.as_str().map(str::to_string).unwrap_or_else(|| message.to_string());
            return Err(NotifyError::Remote(message));
        }

        debug!(command = %command, addr = %self.addr, "RPC call succeeded");
        Ok(serde_json::from_value(value)?)
    }

    async fn round_trip(&self, command: Command, body: &[u8]) -> Result<Vec<u8>, NotifyError> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        socket2::SockRef::from(&stream).set_nodelay(true)?;

        write_request(&mut stream, command.as_str(), body).await?;
        read_frame(&mut stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcp_types::rpc::LicenseIdPayload;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            // accept and hold the socket without answering
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = NotifyClient::new(addr, "u", "p").with_timeout(Duration::from_millis(200));
        let err = client
            .call::<_, Value>(Command::LicenseStatus, &LicenseIdPayload { license_id: "L1".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Timeout));
    }

    #[tokio::test]
    async fn unreachable_peer_is_an_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = NotifyClient::new(addr, "u", "p");
        let err = client
            .call::<_, Value>(Command::Licenses, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Io(_)));
    }
}
