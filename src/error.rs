use std::fmt;

/// Record-level fatal conditions.
///
/// Almost every failure in this crate is absorbed and logged (GPU errors
/// fall back to CPU, bad parameters are clamped, out-of-range channels are
/// skipped). The variants here are the exceptions: conditions under which
/// a render cannot produce a meaningful buffer at all.
#[derive(Debug)]
pub enum RenderError {
    /// The output buffer has odd length and cannot hold interleaved stereo.
    UnalignedBuffer { len: usize },
}

/// A typed failure from a GPU compute dispatch.
///
/// Every GPU entry point returns one of these instead of panicking; the
/// orchestrating call substitutes the CPU equivalent and logs a warning.
#[derive(Debug)]
pub enum ComputeError {
    /// No device is available for dispatch.
    DeviceUnavailable,
    /// The requested work size exceeds what the device supports.
    UnsupportedSize { requested: usize, max: usize },
    /// The backend reported an error.
    Backend(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::UnalignedBuffer { len } => {
                write!(f, "Output buffer length {len} is not a whole number of stereo frames")
            }
        }
    }
}

impl std::error::Error for RenderError {}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeError::DeviceUnavailable => write!(f, "No compute device available"),
            ComputeError::UnsupportedSize { requested, max } => {
                write!(f, "Work size {requested} exceeds device limit {max}")
            }
            ComputeError::Backend(msg) => write!(f, "Compute backend error: {msg}"),
        }
    }
}

impl std::error::Error for ComputeError {}
