//! Error classification for GCP API calls
//!
//! - **Transient**: network/timeout errors, 5xx, 408 and 429
//! - **Permanent**: every other 4xx (bad request, auth, permission)
//!
//! Adapter errors are folded into the runtime's retryable/terminal taxonomy
//! at the crate boundary.

use crate::Error;
use reqwest::StatusCode;

/// Whether an HTTP status indicates a transient failure
pub fn is_transient_status(status: u16) -> bool {
    match StatusCode::from_u16(status) {
        Ok(status) => {
            status.is_server_error()
                || status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::REQUEST_TIMEOUT
        }
        Err(_) => false,
    }
}

/// Helper to check if error is network-related
pub fn is_network_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Map a Cloud Storage failure onto the runtime error taxonomy
pub fn storage_error(error: Error) -> strata_runtime::Error {
    if error.is_not_found() {
        return strata_runtime::Error::NotFound(error.to_string());
    }
    if error.is_transient() {
        strata_runtime::Error::object_storage(error.to_string())
    } else {
        strata_runtime::Error::object_storage_permanent(error.to_string())
    }
}

/// Map a Cloud KMS failure onto the runtime error taxonomy
pub fn encryption_error(error: Error) -> strata_runtime::Error {
    if error.is_transient() {
        strata_runtime::Error::encryption(error.to_string())
    } else {
        strata_runtime::Error::encryption_permanent(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(500));
        assert!(is_transient_status(503));
        assert!(is_transient_status(429));
        assert!(is_transient_status(408));

        assert!(!is_transient_status(400));
        assert!(!is_transient_status(401));
        assert!(!is_transient_status(403));
        assert!(!is_transient_status(404));
        assert!(!is_transient_status(200));
    }

    #[test]
    fn test_storage_error_mapping() {
        let missing = storage_error(Error::Api {
            status: 404,
            message: "gone".into(),
        });
        assert!(missing.is_not_found());

        let throttled = storage_error(Error::Api {
            status: 429,
            message: "slow down".into(),
        });
        assert!(throttled.is_retryable());

        let forbidden = storage_error(Error::Api {
            status: 403,
            message: "denied".into(),
        });
        assert!(!forbidden.is_retryable());
    }

    #[test]
    fn test_encryption_error_mapping() {
        let denied = encryption_error(Error::Api {
            status: 403,
            message: "permission denied on key".into(),
        });
        assert!(!denied.is_retryable());
        assert!(encryption_error(Error::Api {
            status: 503,
            message: "unavailable".into(),
        })
        .is_retryable());
    }
}
