//! On-demand transcoding for clients that can't play a track's format.
//!
//! [`TranscodeProxy::serve`] either hands back the stored file as-is or
//! starts the configured encoder and returns a [`TranscodeStream`] over its
//! stdout. The stream is pulled chunk by chunk; the encoder is killed when
//! the stream is closed or dropped, so an abandoned request never leaves a
//! process behind.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures::Stream;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::{EncoderConfig, INPUT_PLACEHOLDER};
use crate::db::CatalogRepository;
use crate::error::Error;
use crate::model::Track;

/// Source formats the encoder is trusted to decode.
pub const TRANSCODABLE_FORMATS: &[&str] = &["mp3", "ogg", "flac", "m4a", "wav"];

/// The only format transcodes produce.
pub const TARGET_FORMAT: &str = "ogg";

/// Content type of a transcoded stream.
pub const CONTENT_TYPE: &str = "audio/ogg";

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// No acceptable representation exists for the request
    #[error("Not found: {filename}")]
    NotFound { filename: String },

    #[error("Failed to start encoder '{program}': {source}")]
    EncoderSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Catalog(#[from] Error),
}

/// Formats a client accepts, lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptableFormats(Vec<String>);

impl AcceptableFormats {
    /// Parse a comma-separated list such as `"mp3, OGG"`.
    pub fn parse(list: &str) -> Self {
        Self(
            list.split(',')
                .map(|f| f.trim().to_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, format: &str) -> bool {
        self.0.iter().any(|f| f == format)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// How a request will be answered.
#[derive(Debug)]
pub enum StreamDecision {
    /// Serve the stored file; path relative to the music directory
    PassThrough(String),
    /// Serve encoder output as [`CONTENT_TYPE`]
    Transcode(TranscodeStream),
}

/// Chooses between pass-through and transcoding, and runs the encoder.
#[derive(Debug, Clone)]
pub struct TranscodeProxy {
    music_dir: PathBuf,
    encoder: EncoderConfig,
}

impl TranscodeProxy {
    pub fn new(music_dir: impl Into<PathBuf>, encoder: EncoderConfig) -> Self {
        Self {
            music_dir: music_dir.into(),
            encoder,
        }
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    /// Answer a request for `track` from a client accepting `acceptable`.
    ///
    /// A transcode spawns the encoder on the current tokio runtime.
    pub async fn serve(
        &self,
        track: &Track,
        acceptable: &AcceptableFormats,
    ) -> Result<StreamDecision, StreamError> {
        let actual = track.format().unwrap_or_default();

        if acceptable.contains(&actual) {
            debug!(target: "stream", file = %track.filename, format = %actual, "Passing through");
            return Ok(StreamDecision::PassThrough(track.filename.clone()));
        }

        if !TRANSCODABLE_FORMATS.contains(&actual.as_str()) || !acceptable.contains(TARGET_FORMAT) {
            debug!(
                target: "stream",
                file = %track.filename,
                format = %actual,
                acceptable = ?acceptable.as_slice(),
                "No acceptable format"
            );
            return Err(StreamError::NotFound {
                filename: track.filename.clone(),
            });
        }

        let stream = self.spawn_encoder(&track.filename)?;
        Ok(StreamDecision::Transcode(stream))
    }

    /// Look up track `id` in `repo` and serve it.
    pub async fn serve_by_id(
        &self,
        repo: &dyn CatalogRepository,
        id: i64,
        acceptable: &AcceptableFormats,
    ) -> Result<StreamDecision, StreamError> {
        let track = repo
            .track_by_id(id)
            .await?
            .ok_or_else(|| StreamError::NotFound {
                filename: format!("track #{}", id),
            })?;
        self.serve(&track, acceptable).await
    }

    fn spawn_encoder(&self, filename: &str) -> Result<TranscodeStream, StreamError> {
        let input = self.music_dir.join(filename);
        let args: Vec<OsString> = self
            .encoder
            .args
            .iter()
            .map(|arg| {
                if arg == INPUT_PLACEHOLDER {
                    input.clone().into_os_string()
                } else {
                    OsString::from(arg)
                }
            })
            .collect();

        let mut child = Command::new(&self.encoder.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StreamError::EncoderSpawn {
                program: self.encoder.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("encoder stdout was not captured"))?;

        info!(
            target: "stream",
            file = %filename,
            program = %self.encoder.program,
            pid = ?child.id(),
            "Started transcode"
        );

        Ok(TranscodeStream {
            child,
            stdout: Some(stdout),
            chunk_size: self.encoder.chunk_size.max(1),
            idle_timeout: self.encoder.idle_timeout(),
            filename: filename.to_string(),
        })
    }
}

/// Encoder output, read on demand.
///
/// Finite and not restartable: once [`next_chunk`](Self::next_chunk)
/// returns `Ok(None)` or an error, the stream is over.
#[derive(Debug)]
pub struct TranscodeStream {
    child: Child,
    stdout: Option<ChildStdout>,
    chunk_size: usize,
    idle_timeout: Option<Duration>,
    filename: String,
}

impl TranscodeStream {
    /// OS process id of the encoder, while it hasn't been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    /// Next block of encoded bytes, at most the configured chunk size.
    ///
    /// Returns `Ok(None)` at end of output. With an idle timeout set, a read
    /// that waits longer kills the encoder and fails with `TimedOut`.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.chunk_size];
        let outcome = match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, stdout.read(&mut buf)).await.ok(),
            None => Some(stdout.read(&mut buf).await),
        };

        let read = match outcome {
            Some(Ok(read)) => read,
            Some(Err(e)) => return Err(self.abort(e).await),
            None => {
                warn!(target: "stream", file = %self.filename, "Encoder stalled, killing it");
                let timed_out =
                    io::Error::new(io::ErrorKind::TimedOut, "encoder produced no output in time");
                return Err(self.abort(timed_out).await);
            }
        };

        if read == 0 {
            self.stdout = None;
            let status = self.child.wait().await?;
            if status.success() {
                debug!(target: "stream", file = %self.filename, "Transcode finished");
            } else {
                warn!(target: "stream", file = %self.filename, %status, "Encoder exited with failure");
            }
            return Ok(None);
        }

        buf.truncate(read);
        Ok(Some(buf))
    }

    /// Stop the encoder after a failed read and hand back the read error.
    async fn abort(&mut self, err: io::Error) -> io::Error {
        if let Err(close_err) = self.close().await {
            warn!(
                target: "stream",
                file = %self.filename,
                error = %close_err,
                "Failed to stop encoder"
            );
        }
        err
    }

    /// Stop the encoder and reap it. Idempotent.
    pub async fn close(&mut self) -> io::Result<()> {
        self.stdout = None;
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        debug!(target: "stream", file = %self.filename, pid = ?self.child.id(), "Killing encoder");
        self.child.kill().await
    }

    /// Adapt into a [`Stream`] of chunks that ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Vec<u8>>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(stream))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
