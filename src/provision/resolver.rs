//! Decision boundary for an already existing schema.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::debug;

/// What to do with a schema that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Keep the schema and its data, skip provisioning.
    Retain,
    /// Drop the schema with all its data and provision a fresh one.
    Replace,
}

/// Error type for obtaining a decision.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("decision input closed before a valid answer was given")]
    InputClosed,
    #[error("decision prompt I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Supplies the retain/replace decision for an existing schema.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn resolve(&self, schema: &str) -> Result<Resolution, DecisionError>;
}

/// Headless resolver returning the same decision every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedResolver(pub Resolution);

#[async_trait]
impl ConflictResolver for FixedResolver {
    async fn resolve(&self, schema: &str) -> Result<Resolution, DecisionError> {
        debug!("Resolving existing schema {} as {:?}", schema, self.0);
        Ok(self.0)
    }
}

/// Parse an answer to the delete prompt. `y` replaces, `n` retains.
pub fn parse_answer(input: &str) -> Option<Resolution> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" => Some(Resolution::Replace),
        "n" => Some(Resolution::Retain),
        _ => None,
    }
}

/// Interactive resolver asking the operator until it gets `y` or `n`.
pub struct PromptResolver<R, W> {
    io: Mutex<(R, W)>,
}

impl<R, W> PromptResolver<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

impl PromptResolver<BufReader<Stdin>, Stdout> {
    /// Prompt on the process terminal.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> ConflictResolver for PromptResolver<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn resolve(&self, schema: &str) -> Result<Resolution, DecisionError> {
        let mut guard = self.io.lock().await;
        let (reader, writer) = &mut *guard;

        writer
            .write_all(format!("Schema {} already exists.\n", schema).as_bytes())
            .await?;

        loop {
            writer.write_all(b"Do you want to delete it? (y/n): ").await?;
            writer.flush().await?;

            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Err(DecisionError::InputClosed);
            }

            match parse_answer(&line) {
                Some(resolution) => return Ok(resolution),
                None => {
                    debug!("Rejected answer {:?}", line.trim());
                    writer.write_all(b"invalid input..\n").await?;
                }
            }
        }
    }
}
