//! Error types for sampling and monitor lifecycle

use thiserror::Error;

/// Transient failures reading a process's resource usage.
///
/// These never stop the sampling loop; the tenant is skipped for the
/// current pass and its binding is kept.
#[derive(Debug, Error)]
pub enum StatsError {
    /// The process has exited or never existed.
    #[error("process {process} not found")]
    ProcessNotFound {
        /// Human-readable process description.
        process: String,
    },

    /// The process's stats are not readable by this user.
    #[error("permission denied reading stats for {process}")]
    PermissionDenied {
        /// Human-readable process description.
        process: String,
    },

    /// A stats file had an unexpected layout.
    #[error("failed to parse {field} for {process}")]
    Parse {
        /// Process description.
        process: String,
        /// Field that could not be parsed.
        field: String,
    },

    /// First reading of a cumulative counter; there is no earlier reading
    /// to take a rate against yet.
    #[error("{process} is warming up")]
    WarmingUp {
        /// Process description.
        process: String,
    },

    /// Any other I/O failure.
    #[error("i/o error reading {path}: {source}")]
    Io {
        /// File being read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl StatsError {
    /// True for the warm-up reading, which is not a failure
    pub fn is_warming_up(&self) -> bool {
        matches!(self, StatsError::WarmingUp { .. })
    }

    /// Map an I/O error on a process file to the matching variant
    pub fn from_io(process: &str, path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StatsError::ProcessNotFound {
                process: process.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => StatsError::PermissionDenied {
                process: process.to_string(),
            },
            _ => StatsError::Io {
                path: path.to_string(),
                source: err,
            },
        }
    }
}

/// Fatal monitor lifecycle failures
#[derive(Debug, Error)]
pub enum MonitorError {
    /// `start()` was called outside a tokio runtime, so no sampling task can exist.
    #[error("cannot start sampling loop: no tokio runtime available")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_kinds() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            StatsError::from_io("pid 7", "/proc/7/stat", not_found),
            StatsError::ProcessNotFound { .. }
        ));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert!(matches!(
            StatsError::from_io("pid 7", "/proc/7/stat", denied),
            StatsError::PermissionDenied { .. }
        ));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err = StatsError::from_io("pid 7", "/proc/7/stat", other);
        assert!(err.to_string().contains("/proc/7/stat"));
        assert!(!err.is_warming_up());

        let warm = StatsError::WarmingUp {
            process: "pid 7".to_string(),
        };
        assert!(warm.is_warming_up());
    }
}
