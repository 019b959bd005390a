//! Prompt/answer conversations over a byte stream
//!
//! A [`SerialHandshake`] runs [`HandshakeStep`]s one at a time against a
//! device that prints prompts and reads newline-terminated answers. Each step
//! waits for one of its prompts, writes its answer and settles; a step with a
//! deadline either fails with [`SerialError::Timeout`] or, when marked
//! always-resolve, settles with no result so the caller can carry on.
//!
//! Input is buffered across steps. A match consumes the buffer up to the end
//! of the matched prompt; anything after it is kept for the next step unless
//! an answer is written first. Writing an answer discards everything read so
//! far, so a later prompt only matches output that followed the answer.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SerialError};

/// Oldest input is dropped beyond this many unmatched bytes
const MAX_PENDING: usize = 4096;

const READ_CHUNK: usize = 256;

/// One prompt/answer exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeStep {
    prompts: Vec<String>,
    answer: Option<Vec<u8>>,
    timeout: Option<Duration>,
    always_resolve: bool,
    secret: bool,
}

impl HandshakeStep {
    /// Wait for `prompt` to appear in the device output
    pub fn expect(prompt: impl Into<String>) -> Self {
        Self {
            prompts: vec![prompt.into()],
            ..Default::default()
        }
    }

    /// Wait for whichever of `prompts` appears first
    pub fn expect_any<I, P>(prompts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            prompts: prompts.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Write `answer` straight away without waiting for a prompt
    pub fn send(answer: impl Into<Vec<u8>>) -> Self {
        Self {
            answer: Some(answer.into()),
            ..Default::default()
        }
    }

    /// Answer to write once the prompt has been seen
    pub fn answer(mut self, answer: impl Into<Vec<u8>>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Settle with no result instead of failing when the deadline passes
    pub fn always_resolve(mut self) -> Self {
        self.always_resolve = true;
        self
    }

    /// Keep the answer out of the logs
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    fn describe(&self) -> String {
        match self.prompts.as_slice() {
            [] => "write".to_string(),
            [prompt] => format!("{:?}", prompt),
            prompts => format!("one of {:?}", prompts),
        }
    }
}

/// Runs handshake steps over one open connection
pub struct SerialHandshake<S> {
    stream: S,
    pending: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SerialHandshake<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    /// Run one step to completion
    ///
    /// Returns the device output up to and including the matched prompt (empty
    /// for a write-only step), or `None` when an always-resolve step timed out.
    /// The deadline covers only the wait for the prompt; once it is seen the
    /// answer is always written in full.
    pub async fn run_step(&mut self, step: &HandshakeStep) -> Result<Option<String>> {
        log::debug!("Handshake step: {}", step.describe());

        let seen = if step.prompts.is_empty() {
            String::new()
        } else if let Some(limit) = step.timeout {
            match tokio::time::timeout(limit, self.wait_for_prompt(&step.prompts)).await {
                Ok(result) => result?,
                Err(_) if step.always_resolve => {
                    log::debug!(
                        "No response to {} after {:?}, continuing",
                        step.describe(),
                        limit
                    );
                    return Ok(None);
                }
                Err(_) => {
                    return Err(SerialError::Timeout {
                        prompt: step.prompts.first().cloned(),
                        after: limit,
                    })
                }
            }
        } else {
            self.wait_for_prompt(&step.prompts).await?
        };

        if let Some(answer) = &step.answer {
            self.write_answer(answer, step.secret).await?;
        }
        Ok(Some(seen))
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn wait_for_prompt(&mut self, prompts: &[String]) -> Result<String> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(end) = find_prompt(&self.pending, prompts) {
                let seen: Vec<u8> = self.pending.drain(..end).collect();
                let seen = String::from_utf8_lossy(&seen).into_owned();
                log::trace!("Matched {:?}", seen);
                return Ok(seen);
            }

            // Cancel safe: a dropped read loses no data
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(SerialError::Closed);
            }
            self.pending.extend_from_slice(&chunk[..n]);
            if self.pending.len() > MAX_PENDING {
                let excess = self.pending.len() - MAX_PENDING;
                self.pending.drain(..excess);
            }
        }
    }

    /// Anything read before an answer is stale: replies to it must arrive after it
    async fn write_answer(&mut self, answer: &[u8], secret: bool) -> Result<()> {
        if !self.pending.is_empty() {
            log::trace!("Discarding {} unmatched bytes", self.pending.len());
            self.pending.clear();
        }
        if secret {
            log::debug!("Sending {} byte answer", answer.len());
        } else {
            log::debug!("Sending {:?}", String::from_utf8_lossy(answer));
        }
        self.stream.flush().await?;
        self.stream.write_all(answer).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// End offset of the earliest prompt occurrence in `data`
fn find_prompt(data: &[u8], prompts: &[String]) -> Option<usize> {
    prompts
        .iter()
        .filter_map(|p| {
            let p = p.as_bytes();
            if p.is_empty() || p.len() > data.len() {
                return None;
            }
            data.windows(p.len())
                .position(|w| w == p)
                .map(|start| start + p.len())
        })
        .min()
}
