//! Serving a single track through the transcoding proxy.

use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::open_catalog;
use crate::stream::{AcceptableFormats, StreamDecision, StreamError, TranscodeProxy};

/// Serve track `id` in one of `formats`.
///
/// A pass-through prints the file's path; a transcode writes the encoded
/// bytes to `output`, or stdout when no output file is given.
pub fn cmd_stream(
    rt: &Runtime,
    config: &Config,
    db_path: &Path,
    root: &Path,
    id: i64,
    formats: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = open_catalog(db_path).await?;
        let proxy = TranscodeProxy::new(root, config.encoder.clone());
        let acceptable = AcceptableFormats::parse(formats);

        let mut stream = match proxy.serve_by_id(&catalog, id, &acceptable).await {
            Ok(StreamDecision::PassThrough(filename)) => {
                println!("{}", proxy.music_dir().join(filename).display());
                return Ok(());
            }
            Ok(StreamDecision::Transcode(stream)) => stream,
            Err(StreamError::NotFound { filename }) => {
                anyhow::bail!("No acceptable format for {} (accepts: {})", filename, formats)
            }
            Err(e) => return Err(e.into()),
        };

        let mut sink: Box<dyn AsyncWrite + Unpin> = match output {
            Some(path) => Box::new(tokio::fs::File::create(path).await?),
            None => Box::new(tokio::io::stdout()),
        };

        let mut written = 0usize;
        let copied = async {
            while let Some(chunk) = stream.next_chunk().await? {
                sink.write_all(&chunk).await?;
                written += chunk.len();
            }
            sink.flush().await
        }
        .await;

        if let Err(e) = copied {
            if let Err(close_err) = stream.close().await {
                warn!(target: "stream", id, error = %close_err, "Failed to stop encoder");
            }
            return Err(e.into());
        }

        info!(
            target: "stream",
            id,
            bytes = written,
            content_type = stream.content_type(),
            "Transcode written"
        );
        Ok::<(), anyhow::Error>(())
    })
}
