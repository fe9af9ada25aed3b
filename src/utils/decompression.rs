use std::io::{BufRead, BufReader, Read};

use flate2::bufread::MultiGzDecoder;
use tracing::debug;

use crate::errors::{AppError, AppResult};

/// Read buffer used in front of the decoder and the XML reader
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Supported compression formats detected by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Uncompressed,
}

/// Magic byte detection and streaming decompression
pub struct DecompressionService;

impl DecompressionService {
    /// Detect compression format using magic bytes
    pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
        match infer::get(data).map(|kind| kind.mime_type()) {
            Some("application/gzip") => CompressionFormat::Gzip,
            _ => CompressionFormat::Uncompressed,
        }
    }

    /// Wrap a raw feed stream in a decoder chosen from its leading bytes.
    ///
    /// Only the peek buffer is held in memory; the payload is decoded as the
    /// returned reader is consumed. Concatenated gzip members are decoded as
    /// one stream.
    pub fn decompressing_reader<R>(reader: R) -> AppResult<(CompressionFormat, Box<dyn BufRead + Send>)>
    where
        R: Read + Send + 'static,
    {
        let mut buffered = BufReader::with_capacity(STREAM_BUFFER_SIZE, reader);
        let head = buffered
            .fill_buf()
            .map_err(|e| AppError::malformed(Some(0), format!("Failed to read feed header: {e}")))?;

        let format = Self::detect_compression_format(head);
        debug!("Detected compression format: {:?}", format);

        let stream: Box<dyn BufRead + Send> = match format {
            CompressionFormat::Gzip => Box::new(BufReader::with_capacity(
                STREAM_BUFFER_SIZE,
                MultiGzDecoder::new(buffered),
            )),
            CompressionFormat::Uncompressed => Box::new(buffered),
        };

        Ok((format, stream))
    }
}
