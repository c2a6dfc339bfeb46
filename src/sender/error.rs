use super::serialization::SerializationError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Code reported by the internal-error path when a response body is not the
/// expected JSON error structure.
pub const MALFORMED_BODY_CODE: &str = "00500";

#[derive(Error, Debug)]
pub enum ClsError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Request cancelled")]
    Cancelled,
    #[error("{method} {url}: {status} {raw_code} {message}")]
    Api {
        method: String,
        url: String,
        status: u16,
        code: ErrorCode,
        /// Code exactly as the service sent it, kept when `code` is unknown.
        raw_code: String,
        message: String,
    },
    #[error("{method} {url}: {status} 00500 resp data not json format, data: {body}")]
    Internal {
        method: String,
        url: String,
        status: u16,
        body: String,
    },
    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Error body returned by the service on non-2xx responses.
///
/// Missing fields decode as empty strings.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "errorcode", default)]
    pub error_code: String,
    #[serde(rename = "errormessage", default)]
    pub error_message: String,
}

/// Broad class of a service error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Conflict,
    NotFound,
    QuotaExceeded,
    MalformedRequest,
    Auth,
    Internal,
    Other,
}

macro_rules! error_codes {
    ($($variant:ident => $class:ident),+ $(,)?) => {
        /// Error codes of the CLS API.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorCode {
            $($variant,)+
        }

        impl ErrorCode {
            pub const ALL: &'static [ErrorCode] = &[$(ErrorCode::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => stringify!($variant),)+
                }
            }

            pub fn class(&self) -> ErrorClass {
                match self {
                    $(ErrorCode::$variant => ErrorClass::$class,)+
                }
            }

            /// Unknown codes collapse into `InternalError`.
            pub fn parse(code: &str) -> Self {
                match code {
                    $(stringify!($variant) => ErrorCode::$variant,)+
                    _ => ErrorCode::InternalError,
                }
            }
        }
    };
}

error_codes! {
    InternalError => Internal,
    TopicConflict => Conflict,
    TopicNotExist => NotFound,
    InvalidContentType => MalformedRequest,
    InvalidAuthorization => Auth,
    InvalidContent => MalformedRequest,
    InvalidParam => MalformedRequest,
    MissingAgentIp => MalformedRequest,
    MissingAgentVersion => MalformedRequest,
    MissingAuthorization => Auth,
    MissingContent => MalformedRequest,
    MissingContentType => MalformedRequest,
    TopicClosed => Other,
    IndexRuleEmpty => Other,
    LogsetNotEmpty => Other,
    SyntaxError => MalformedRequest,
    LogsetEmpty => Other,
    Unauthorized => Auth,
    LogsetExceed => QuotaExceeded,
    LogSizeExceed => QuotaExceeded,
    MachineGroupExceed => QuotaExceeded,
    NotAllowed => Auth,
    TopicExceed => QuotaExceeded,
    ShipperExceed => QuotaExceeded,
    TaskReadOnly => Other,
    CursorNotExist => NotFound,
    TaskNotExist => NotFound,
    IndexNotExist => NotFound,
    LogsetNotExist => NotFound,
    MachineGroupNotExist => NotFound,
    ShipperNotExist => NotFound,
    ConsumerNotExist => NotFound,
    NotSupported => Other,
    IndexConflict => Conflict,
    LogsetConflict => Conflict,
    MachineGroupConflict => Conflict,
    ShipperConflict => Conflict,
    ConsumerConflict => Conflict,
    SpeedQuotaExceed => QuotaExceeded,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClsError {
    /// Service error code carried by this error.
    ///
    /// Anything that is not a structured API error reports `InternalError`.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClsError::Api { code, .. } => *code,
            _ => ErrorCode::InternalError,
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.code().class()
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClsError::Api { status, .. } | ClsError::Internal { status, .. } => Some(*status),
            ClsError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Network failures, timeouts and cancellations.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClsError::Transport(_) | ClsError::Timeout(_) | ClsError::Cancelled
        )
    }

    pub fn is_internal(&self) -> bool {
        self.code() == ErrorCode::InternalError
    }

    pub fn is_topic_conflict(&self) -> bool {
        matches!(self, ClsError::Api { code: ErrorCode::TopicConflict, .. })
    }

    pub fn is_topic_not_exist(&self) -> bool {
        matches!(self, ClsError::Api { code: ErrorCode::TopicNotExist, .. })
    }
}

/// Classifies a finished response. 2xx is success; anything else becomes
/// [`ClsError::Api`] when the body is a JSON error object, or
/// [`ClsError::Internal`] otherwise.
pub fn check_response(method: &str, url: &str, status: u16, body: &[u8]) -> Result<(), ClsError> {
    if (200..=299).contains(&status) {
        return Ok(());
    }

    let parsed = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value @ serde_json::Value::Object(_)) => {
            serde_json::from_value::<ErrorResponse>(value).ok()
        }
        _ => None,
    };

    match parsed {
        Some(response) => Err(ClsError::Api {
            method: method.to_string(),
            url: url.to_string(),
            status,
            code: ErrorCode::parse(&response.error_code),
            raw_code: response.error_code,
            message: response.error_message,
        }),
        None => Err(ClsError::Internal {
            method: method.to_string(),
            url: url.to_string(),
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://ap-guangzhou.cls.tencentyun.com/structuredlog?topic_id=t";

    #[test]
    fn test_success_statuses() {
        for status in [200, 201, 204, 299] {
            assert!(check_response("POST", URL, status, b"").is_ok());
        }
    }

    #[test]
    fn test_structured_error_body() {
        let body = br#"{"errorcode":"TopicNotExist","errormessage":"no such topic"}"#;
        let err = check_response("POST", URL, 404, body).unwrap_err();

        match &err {
            ClsError::Api {
                method,
                url,
                status,
                code,
                raw_code,
                message,
            } => {
                assert_eq!(raw_code, "TopicNotExist");
                assert_eq!(method, "POST");
                assert_eq!(url, URL);
                assert_eq!(*status, 404);
                assert_eq!(*code, ErrorCode::TopicNotExist);
                assert_eq!(message, "no such topic");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
        assert!(err.is_topic_not_exist());
        assert!(!err.is_internal());
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn test_malformed_body_is_internal() {
        let err = check_response("POST", URL, 502, b"<html>bad gateway</html>").unwrap_err();

        match &err {
            ClsError::Internal { status, body, .. } => {
                assert_eq!(*status, 502);
                assert_eq!(body, "<html>bad gateway</html>");
            }
            other => panic!("Expected Internal error, got {other:?}"),
        }
        assert!(err.is_internal());
        assert!(err.to_string().contains(MALFORMED_BODY_CODE));
    }

    #[test]
    fn test_unknown_code_maps_to_internal_error() {
        let body = br#"{"errorcode":"SomethingNew","errormessage":"?"}"#;
        let err = check_response("POST", URL, 400, body).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert!(matches!(err, ClsError::Api { .. }));
    }

    #[test]
    fn test_code_round_trip_through_names() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::parse(code.as_str()), *code);
        }
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(ErrorCode::TopicConflict.class(), ErrorClass::Conflict);
        assert_eq!(ErrorCode::SpeedQuotaExceed.class(), ErrorClass::QuotaExceeded);
        assert_eq!(ErrorCode::InvalidContent.class(), ErrorClass::MalformedRequest);
        assert_eq!(ErrorCode::Unauthorized.class(), ErrorClass::Auth);
    }

    #[test]
    fn test_cancellation_is_transport_class() {
        assert!(ClsError::Cancelled.is_transport());
        assert!(ClsError::Timeout(Duration::from_secs(1)).is_transport());
        assert!(ClsError::Cancelled.is_internal());
        assert!(!ClsError::Cancelled.is_topic_conflict());
    }

    #[test]
    fn test_unknown_code_keeps_raw_value() {
        let body = br#"{"errorcode":"BrandNewCode","errormessage":"x"}"#;
        let err = check_response("POST", URL, 400, body).unwrap_err();

        assert_eq!(err.code(), ErrorCode::InternalError);
        match &err {
            ClsError::Api { raw_code, .. } => assert_eq!(raw_code, "BrandNewCode"),
            other => panic!("Expected Api error, got {other:?}"),
        }
        assert!(err.to_string().contains("BrandNewCode"));
    }

    #[test]
    fn test_partial_error_object_is_api_error() {
        let body = br#"{"errorcode":"TopicNotExist"}"#;
        let err = check_response("POST", URL, 404, body).unwrap_err();

        match &err {
            ClsError::Api { code, message, .. } => {
                assert_eq!(*code, ErrorCode::TopicNotExist);
                assert!(message.is_empty());
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
        assert!(err.is_topic_not_exist());
    }

    #[test]
    fn test_non_object_json_is_internal() {
        for body in [&b"[]"[..], b"\"oops\"", b"42"] {
            let err = check_response("GET", URL, 500, body).unwrap_err();
            assert!(matches!(err, ClsError::Internal { .. }), "body {body:?}");
        }
    }
}
