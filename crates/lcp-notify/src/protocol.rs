//! Wire format.
//!
//! ```text
//! request:  COMMAND '\n' [len: u32 BE][JSON envelope {user, password, payload}]
//! reply:    [len: u32 BE][JSON value | {"error": "<message>"}]
//! ```
//!
//! The command is plain ASCII from a fixed vocabulary. A reply carrying an
//! `error` member is the only failure signal; there is no status line.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::NotifyError;

/// Maximum JSON body size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Longest accepted command line, newline excluded.
pub const MAX_COMMAND_LEN: usize = 32;

/// Write a command line followed by one frame, flushed as a unit.
pub async fn write_request<W>(w: &mut W, command: &str, body: &[u8]) -> Result<(), NotifyError>
where
    W: AsyncWrite + Unpin,
{
    check_len(body.len())?;
    let mut buf = Vec::with_capacity(command.len() + 1 + 4 + body.len());
    buf.extend_from_slice(command.as_bytes());
    buf.push(b'\n');
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);

    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}

/// Read the command line. Bytes are consumed one at a time so nothing past
/// the newline is taken from the stream.
pub async fn read_command<R>(r: &mut R) -> Result<String, NotifyError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(MAX_COMMAND_LEN);
    loop {
        let b = r.read_u8().await?;
        if b == b'\n' {
            break;
        }
        if line.len() == MAX_COMMAND_LEN {
            return Err(NotifyError::Frame("command line too long".into()));
        }
        line.push(b);
    }

    String::from_utf8(line).map_err(|_| NotifyError::Frame("command is not ASCII".into()))
}

pub async fn write_frame<W>(w: &mut W, body: &[u8]) -> Result<(), NotifyError>
where
    W: AsyncWrite + Unpin,
{
    check_len(body.len())?;
    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);

    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(r: &mut R) -> Result<Vec<u8>, NotifyError>
where
    R: AsyncRead + Unpin,
{
    let len = r.read_u32().await? as usize;
    check_len(len)?;

    let mut body = vec![0u8; len];
    r.read_exact(&mut body).await?;
    Ok(body)
}

fn check_len(len: usize) -> Result<(), NotifyError> {
    if len == 0 || len > MAX_FRAME_SIZE {
        return Err(NotifyError::Frame(format!("invalid frame length {}", len)));
    }
    Ok(())
}
