//! Raw response head capture.
//!
//! hyper hands back headers grouped by name and lowercased. The lines a
//! caller sees must be the ones the server sent, so the connection is wrapped
//! in a [`HeadRecorder`] that keeps the bytes of every response head as they
//! are read, interim `1xx` heads included.

use std::{
    io,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Upper bound for the bytes buffered while looking for the end of a head.
const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_HEADERS: usize = 128;

/// Splits a raw head block into its lines plus the terminating empty line.
///
/// Line terminators are trimmed; bare `\n` endings are accepted.
pub(crate) fn head_lines(head: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text
        .trim_end_matches(['\r', '\n'])
        .split('\n')
        .map(|line| line.trim_end_matches('\r').to_owned())
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines
}

#[derive(Debug, Default)]
struct HeadState {
    pending: Vec<u8>,
    lines: Vec<String>,
    done: bool,
}

impl HeadState {
    fn record(&mut self, bytes: &[u8]) {
        if self.done || bytes.is_empty() {
            return;
        }
        self.pending.extend_from_slice(bytes);

        loop {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut response = httparse::Response::new(&mut headers);
            match response.parse(&self.pending) {
                Ok(httparse::Status::Complete(len)) => {
                    let code = response.code.unwrap_or_default();
                    self.lines.extend(head_lines(&self.pending[..len]));
                    self.pending.drain(..len);
                    // hyper skips interim heads, except a protocol switch.
                    if !(100..200).contains(&code) || code == 101 {
                        self.finish();
                        return;
                    }
                }
                Ok(httparse::Status::Partial) => {
                    if self.pending.len() > MAX_HEAD_SIZE {
                        self.abandon("response head is too large");
                    }
                    return;
                }
                Err(err) => {
                    self.abandon(err);
                    return;
                }
            }
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.pending = Vec::new();
    }

    fn abandon<E: std::fmt::Display>(&mut self, reason: E) {
        #[cfg(feature = "log")]
        log::debug!("Not capturing raw header lines: {}", reason);
        #[cfg(not(feature = "log"))]
        let _ = reason;
        self.lines.clear();
        self.finish();
    }
}

/// Shared view of the heads recorded on one connection.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordedHeads(Arc<Mutex<HeadState>>);

impl RecordedHeads {
    fn record(&self, bytes: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(bytes);
    }

    /// Returns the captured lines once the final head has been read.
    ///
    /// `None` when the head could not be recorded, in which case the caller
    /// falls back to hyper's parsed view.
    pub(crate) fn take(&self) -> Option<Vec<String>> {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.done || state.lines.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut state.lines))
    }
}

/// Passes reads and writes through to `inner`, recording response heads.
#[derive(Debug)]
pub(crate) struct HeadRecorder<S> {
    inner: S,
    heads: RecordedHeads,
}

impl<S> HeadRecorder<S> {
    pub(crate) fn new(inner: S, heads: RecordedHeads) -> Self {
        Self { inner, heads }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for HeadRecorder<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.heads.record(&buf.filled()[before..]);
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for HeadRecorder<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
