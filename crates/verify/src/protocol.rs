//! Wire protocol for the verify coordinator's single-task RPC to a remote
//! peer (§4.10): length-prefixed JSON framing, narrowed to the one
//! request/response pair this engine actually needs.

use serde::{Deserialize, Serialize};
use sykli_core::ir::{Task, TaskResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A single task spec plus artifacts is never anywhere near this large in
/// practice.
const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// One task shipped to a remote peer, plus the `input_from` artifacts it
/// needs materialized before it can run (§4.10 "ships the task spec
/// plus its `input_from` artifacts").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub task: Task,
    pub artifacts: Vec<VerifyArtifact>,
    pub pipeline_name: String,
    pub local_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyArtifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub result: TaskResult,
}

/// Reads and writes a single JSON payload framed as a 4-byte big-endian
/// length prefix followed by the payload.
pub async fn write_frame<W: AsyncWrite + Unpin, T: Serialize>(writer: &mut W, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_vec(value).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(json.len()).map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "message too large"))?;
    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "message too large"));
    }
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await
}

pub async fn read_frame<R: AsyncRead + Unpin, T: for<'de> Deserialize<'de>>(reader: &mut R) -> std::io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "message too large"));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    serde_json::from_slice(&buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sykli_core::ir::TaskStatus;
    use std::io::Cursor;

    #[tokio::test]
    async fn request_round_trips_over_the_wire() {
        let req = VerifyRequest {
            task: crate::coordinator::tests_support::bare_task("t"),
            artifacts: vec![VerifyArtifact { name: "bin".into(), bytes: vec![1, 2, 3] }],
            pipeline_name: "p".into(),
            local_labels: vec!["darwin".into()],
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &req).await.unwrap();
        let mut reader = Cursor::new(buf);
        let read: VerifyRequest = read_frame(&mut reader).await.unwrap();
        assert_eq!(read.task.name, "t");
        assert_eq!(read.artifacts[0].bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn response_round_trips_over_the_wire() {
        let resp = VerifyResponse {
            result: TaskResult {
                name: "t".into(),
                target: "local".into(),
                status: TaskStatus::Success,
                cached: false,
                duration_ms: 5,
                exit_status: Some(0),
                fingerprint: None,
                verify_field: None,
                reason: None,
                attempts: 1,
            },
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, &resp).await.unwrap();
        let mut reader = Cursor::new(buf);
        let read: VerifyResponse = read_frame(&mut reader).await.unwrap();
        assert_eq!(read.result.name, "t");
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        let bogus_len: u32 = MAX_MESSAGE_SIZE + 1;
        buf.extend_from_slice(&bogus_len.to_be_bytes());
        let mut reader = Cursor::new(buf);
        let result: std::io::Result<VerifyResponse> = read_frame(&mut reader).await;
        assert!(result.is_err());
    }
}
