//! Streams a single artifact to a temporary file sitting in the same
//! directory as its eventual final name, so the publish step is a same-
//! filesystem rename. Grounded on the teacher's archive-cache download
//! (fetch into a `NamedTempFile`, `persist` on success) with one addition:
//! the response body is re-chunked into fixed 16 KiB writes rather than
//! passed through at whatever boundaries the transport happens to deliver.

use std::path::Path;

use futures::TryStreamExt;
use reqwest_middleware::ClientWithMiddleware;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use url::Url;

const CHUNK_SIZE: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),

    #[error("upstream returned an error status: {0}")]
    Status(#[from] reqwest::Error),

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to persist downloaded file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Downloads `url`'s body into a fresh temp file created inside `dir`.
/// Returns the open temp file handle (not yet persisted) and the number of
/// bytes written, which the caller compares against the observed
/// `Content-Length` only for logging — the byte count actually written is
/// what is trusted for cache accounting.
pub(crate) async fn download_to_tempfile(
    client: &ClientWithMiddleware,
    url: &Url,
    dir: &Path,
) -> Result<(NamedTempFile, u64), DownloadError> {
    let response = client.get(url.clone()).send().await?;
    let response = response.error_for_status()?;

    let temp_file = NamedTempFile::new_in(dir)?;
    let (std_file, temp_path) = temp_file.into_parts();
    let mut file = fs_err::tokio::File::from_std(fs_err::File::from_parts(std_file, &temp_path));

    let stream = response
        .bytes_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let mut reader = StreamReader::new(stream);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        written += n as u64;
    }
    file.flush().await?;

    let std_file = file.into_parts().0.into_std().await;
    let temp_file = NamedTempFile::from_parts(std_file, temp_path);
    Ok((temp_file, written))
}
