// src/range_engine_generic.rs
//
// Stream-based range engine for concurrent downloads
// Works with any backend that implements async get_range(offset, length)

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::constants::{
    DEFAULT_RANGE_ENGINE_CHUNK_SIZE,
    DEFAULT_RANGE_ENGINE_MAX_CONCURRENT,
    DEFAULT_RANGE_ENGINE_THRESHOLD,
};
use crate::error::FetchError;

/// Configuration for range-based concurrent downloads
#[derive(Debug, Clone)]
pub struct RangeEngineConfig {
    /// Size of each range chunk in bytes (default: 5 MiB)
    pub chunk_size: usize,

    /// Maximum concurrent range requests (default: 5)
    pub max_concurrent_ranges: usize,

    /// Minimum object size to trigger range splitting (default: one chunk)
    /// Objects smaller than this use a single request
    pub min_split_size: u64,
}

impl Default for RangeEngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_RANGE_ENGINE_CHUNK_SIZE,
            max_concurrent_ranges: DEFAULT_RANGE_ENGINE_MAX_CONCURRENT,
            min_split_size: DEFAULT_RANGE_ENGINE_THRESHOLD,
        }
    }
}

/// Statistics collected during range download
#[derive(Debug, Clone)]
pub struct RangeDownloadStats {
    /// Total bytes written
    pub bytes_downloaded: u64,

    /// Number of range requests made
    pub ranges_processed: usize,

    /// Total elapsed time
    pub elapsed_time: Duration,

    /// Average throughput in bytes per second
    pub throughput_bps: u64,
}

impl RangeDownloadStats {
    /// Throughput in megabytes per second
    pub fn throughput_mbps(&self) -> f64 {
        (self.throughput_bps as f64) / (1024.0 * 1024.0)
    }
}

/// Range-based download engine
///
/// Fetches up to `max_concurrent_ranges` ranges at once with
/// `stream::iter().buffered()`, which yields chunks in request order, so
/// each chunk is written to the sink as soon as all earlier ones are. At
/// most `max_concurrent_ranges` chunks are held in memory.
///
/// # Example
///
/// ```no_run
/// use apt_s3::range_engine_generic::{RangeEngine, RangeEngineConfig};
/// use bytes::Bytes;
///
/// # async fn example() -> Result<(), apt_s3::FetchError> {
/// let engine = RangeEngine::new(RangeEngineConfig::default());
/// let data = Bytes::from_static(b"hello world");
///
/// let get_range = move |offset: u64, length: u64| {
///     let data = data.clone();
///     async move { Ok(data.slice(offset as usize..(offset + length) as usize)) }
/// };
///
/// let mut out = Vec::new();
/// let stats = engine.download_to(11, get_range, &mut out).await?;
/// assert_eq!(stats.bytes_downloaded, 11);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RangeEngine {
    config: RangeEngineConfig,
}

impl RangeEngine {
    /// Create a new range engine with the given configuration
    pub fn new(config: RangeEngineConfig) -> Self {
        Self { config }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RangeEngineConfig::default())
    }

    /// Download `object_size` bytes into `sink`, splitting into ranges when
    /// the object is at least `min_split_size`. The sink is flushed before
    /// returning. A zero-sized object issues no requests.
    pub async fn download_to<F, Fut, W>(
        &self,
        object_size: u64,
        get_range: F,
        sink: &mut W,
    ) -> Result<RangeDownloadStats, FetchError>
    where
        F: Fn(u64, u64) -> Fut + Clone,
        Fut: std::future::Future<Output = Result<Bytes, FetchError>>,
        W: AsyncWrite + Unpin,
    {
        let start_time = Instant::now();

        let ranges = if object_size < self.config.min_split_size {
            tracing::debug!(
                "Object size {} < threshold {}, using single request",
                object_size, self.config.min_split_size
            );
            Self::single_range(object_size)
        } else {
            self.calculate_ranges(object_size)
        };
        let n_ranges = ranges.len();

        tracing::debug!(
            "Fetching {} bytes in {} ranges of ~{} bytes each",
            object_size, n_ranges, self.config.chunk_size
        );

        let mut chunks = std::pin::pin!(stream::iter(ranges)
            .enumerate()
            .map(|(idx, (offset, length))| {
                let get_range = get_range.clone();
                async move {
                    tracing::trace!("Fetching range {}: offset={}, length={}", idx, offset, length);
                    let bytes = get_range(offset, length).await?;

                    if bytes.len() as u64 != length {
                        return Err(FetchError::Transport(format!(
                            "range {} returned {} bytes, expected {} (offset={})",
                            idx, bytes.len(), length, offset
                        )));
                    }
                    Ok::<_, FetchError>(bytes)
                }
            })
            .buffered(self.config.max_concurrent_ranges.max(1)));

        let mut bytes_downloaded = 0u64;
        while let Some(bytes) = chunks.try_next().await? {
            sink.write_all(&bytes).await.map_err(io_to_transfer)?;
            bytes_downloaded += bytes.len() as u64;
        }
        sink.flush().await.map_err(io_to_transfer)?;

        let elapsed = start_time.elapsed();
        let stats = RangeDownloadStats {
            bytes_downloaded,
            ranges_processed: n_ranges,
            elapsed_time: elapsed,
            throughput_bps: Self::calculate_throughput(bytes_downloaded, elapsed),
        };

        tracing::debug!(
            "Downloaded {} bytes in {} ranges: {:.2} MB/s",
            stats.bytes_downloaded,
            stats.ranges_processed,
            stats.throughput_mbps()
        );

        Ok(stats)
    }

    fn single_range(object_size: u64) -> Vec<(u64, u64)> {
        if object_size == 0 { Vec::new() } else { vec![(0, object_size)] }
    }

    /// Split the object into chunks of chunk_size, the last one possibly smaller.
    fn calculate_ranges(&self, object_size: u64) -> Vec<(u64, u64)> {
        let mut ranges = Vec::new();
        let mut offset = 0u64;
        let chunk_size = self.config.chunk_size.max(1) as u64;

        while offset < object_size {
            let remaining = object_size - offset;
            let length = remaining.min(chunk_size);
            ranges.push((offset, length));
            offset += length;
        }

        ranges
    }

    /// Calculate throughput in bytes per second
    fn calculate_throughput(bytes: u64, elapsed: Duration) -> u64 {
        let elapsed_secs = elapsed.as_secs_f64();
        if elapsed_secs > 0.0 {
            (bytes as f64 / elapsed_secs) as u64
        } else {
            0
        }
    }
}

fn io_to_transfer(e: std::io::Error) -> FetchError {
    FetchError::Transport(format!("write failed: {e}"))
}
