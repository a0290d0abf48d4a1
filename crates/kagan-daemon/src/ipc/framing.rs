//! Newline-delimited JSON framing over an arbitrary duplex stream (§4.F).
//!
//! Grounded on `original_source/src/kagan/core/ipc/constants.py`'s
//! `MAX_LINE_BYTES`/`STREAM_LIMIT_BYTES` pair: one frame is one line, and a
//! line exceeding the cap closes the connection rather than being silently
//! truncated.

use kagan_api_types::ipc::MAX_FRAME_BYTES;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame exceeded {MAX_FRAME_BYTES} bytes")]
    FrameTooLarge,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed json frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read one newline-delimited JSON frame, returning `None` on clean EOF.
pub async fn read_frame<R, T>(reader: &mut BufReader<R>) -> Result<Option<T>, FramingError>
where
    R: tokio::io::AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    if line.len() > MAX_FRAME_BYTES {
        return Err(FramingError::FrameTooLarge);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}

/// Serialize and write one frame, newline-terminated, erroring before the
/// write if the encoded frame would exceed the cap.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FramingError>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut encoded = serde_json::to_vec(value)?;
    if encoded.len() + 1 > MAX_FRAME_BYTES {
        return Err(FramingError::FrameTooLarge);
    }
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kagan_api_types::ipc::IpcRequest;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let mut buf = Vec::new();
        let request = IpcRequest {
            request_id: "r1".to_string(),
            session_id: "s1".to_string(),
            capability: "task".to_string(),
            method: "list".to_string(),
            params: serde_json::json!({}),
            token: "tok".to_string(),
        };
        write_frame(&mut buf, &request).await.unwrap();
        assert!(buf.ends_with(b"\n"));

        let mut reader = BufReader::new(buf.as_slice());
        let parsed: IpcRequest = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(parsed.request_id, "r1");
        assert_eq!(parsed.method, "list");
    }

    #[tokio::test]
    async fn empty_stream_yields_none() {
        let mut reader = BufReader::new(&b""[..]);
        let frame: Option<IpcRequest> = read_frame(&mut reader).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_write() {
        let mut buf = Vec::new();
        let huge = serde_json::json!({ "data": "x".repeat(MAX_FRAME_BYTES) });
        let err = write_frame(&mut buf, &huge).await.unwrap_err();
        assert!(matches!(err, FramingError::FrameTooLarge));
    }
}
