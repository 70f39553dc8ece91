//! Transport-error classification and remediation hints.
//!
//! Request failures that never produced an HTTP status (refused
//! connections, DNS failures, socket timeouts) are classified by walking
//! the error source chain for an [`std::io::Error`] kind, falling back to
//! message inspection.

use std::error::Error as StdError;
use std::io;

/// Stable code plus message for one transport failure.
pub struct ClassifiedError {
    pub code: &'static str,
    pub message: String,
}

pub fn classify_transport_error(error: &reqwest::Error) -> ClassifiedError {
    if error.is_timeout() {
        return ClassifiedError {
            code: "TIMEOUT",
            message: "The request to the provider timed out.".to_string(),
        };
    }
    classify_error_chain(error)
}

/// Walks the source chain; split from the reqwest entry point so tests can
/// feed synthetic chains.
pub(crate) fn classify_error_chain(error: &(dyn StdError + 'static)) -> ClassifiedError {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            match io_error.kind() {
                io::ErrorKind::ConnectionRefused => {
                    return ClassifiedError {
                        code: "ECONNREFUSED",
                        message: "The provider refused the connection.".to_string(),
                    }
                }
                io::ErrorKind::TimedOut => {
                    return ClassifiedError {
                        code: "TIMEOUT",
                        message: "The connection to the provider timed out.".to_string(),
                    }
                }
                io::ErrorKind::ConnectionReset => {
                    return ClassifiedError {
                        code: "ECONNRESET",
                        message: "The provider reset the connection.".to_string(),
                    }
                }
                _ => {}
            }
        }
        let text = err.to_string().to_lowercase();
        if text.contains("dns") || text.contains("lookup") {
            return ClassifiedError {
                code: "ENOTFOUND",
                message: "The provider hostname could not be resolved.".to_string(),
            };
        }
        current = err.source();
    }
    ClassifiedError {
        code: "NETWORK_ERROR",
        message: format!("Network error contacting the provider: {error}"),
    }
}

/// Operator-facing next step for a failure code. Always returns something.
pub fn remediation_hint(code: &str) -> &'static str {
    match code {
        "ECONNREFUSED" => "Check that the server is running and the endpoint URL and port are correct.",
        "TIMEOUT" => "The server did not respond in time. Check that it is reachable, or raise the timeout.",
        "ENOTFOUND" => "Check the hostname in the endpoint URL and your network connection.",
        "ECONNRESET" => "The connection was dropped mid-request. Retry, and check server logs if it persists.",
        "DeploymentNotFound" => "Check the Azure deployment name in the endpoint URL.",
        "401" | "Unauthorized" => "Check that the API key is valid and matches this endpoint.",
        "429" => "The provider is rate limiting requests. Wait a moment and retry.",
        _ => "Check your configuration and try again.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapper {
        source: io::Error,
    }

    impl std::fmt::Display for Wrapper {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "request failed")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.source)
        }
    }

    #[derive(Debug)]
    struct Plain(&'static str);

    impl std::fmt::Display for Plain {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for Plain {}

    #[test]
    fn io_kinds_map_to_codes_through_the_chain() {
        let cases = [
            (io::ErrorKind::ConnectionRefused, "ECONNREFUSED"),
            (io::ErrorKind::TimedOut, "TIMEOUT"),
            (io::ErrorKind::ConnectionReset, "ECONNRESET"),
        ];
        for (kind, expected) in cases {
            let wrapped = Wrapper {
                source: io::Error::new(kind, "socket failure"),
            };
            assert_eq!(classify_error_chain(&wrapped).code, expected);
        }
    }

    #[test]
    fn dns_failures_match_by_message() {
        let error = Plain("dns error: failed to lookup address information");
        assert_eq!(classify_error_chain(&error).code, "ENOTFOUND");
    }

    #[test]
    fn unknown_failures_fall_back_to_network_error() {
        let error = Plain("something odd happened");
        let classified = classify_error_chain(&error);
        assert_eq!(classified.code, "NETWORK_ERROR");
        assert!(classified.message.contains("something odd happened"));
    }

    #[test]
    fn every_code_has_a_remediation_hint() {
        for code in [
            "ECONNREFUSED",
            "TIMEOUT",
            "ENOTFOUND",
            "ECONNRESET",
            "DeploymentNotFound",
            "401",
            "429",
            "server_error",
        ] {
            assert!(!remediation_hint(code).is_empty());
        }
    }
}
