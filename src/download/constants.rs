//! Constants for the download module (chunking, buffering).

/// Largest slice written (and reported to observers) in one step.
pub const MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Capacity of the buffered writer wrapping each local file.
pub const WRITE_BUFFER_BYTES: usize = 256 * 1024;

/// HTTP status returned when a range starts beyond the end of the resource.
pub const RANGE_NOT_SATISFIABLE: u16 = 416;
