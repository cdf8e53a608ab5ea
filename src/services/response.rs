//! HTTP response construction
//!
//! Small helpers shared by every handler, so the JSON shapes and the
//! error-to-status mapping stay in one place.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;

use crate::error::CapsuleError;

/// Serialize `body` as JSON under the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// `{"error": message}` under the given status code
fn message_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

/// 200 OK with a JSON body
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// 201 Created with a JSON body
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// 204 No Content, empty body
pub fn no_content() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// 404 with an error message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    message_response(StatusCode::NOT_FOUND, message)
}

/// 400 with an error message
pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    message_response(StatusCode::BAD_REQUEST, message)
}

/// Raw bytes under a caller-supplied content type
pub fn binary_response(content_type: &str, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, body.len())
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Map a [`CapsuleError`] onto a status code and error body
///
/// Collaborator failures surface as 502: the request was fine, the system
/// behind us was not.
pub fn error_response(error: CapsuleError) -> Response<Full<Bytes>> {
    let status = match &error {
        CapsuleError::NotFound(_) => StatusCode::NOT_FOUND,
        CapsuleError::Unauthorized(_) => StatusCode::FORBIDDEN,
        CapsuleError::Precondition(_) => StatusCode::CONFLICT,
        CapsuleError::InvalidInput(_) | CapsuleError::Json(_) => StatusCode::BAD_REQUEST,
        CapsuleError::ContentStore(_) | CapsuleError::Ledger(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    message_response(status, &error.to_string())
}

/// Service result to 200/error
pub fn from_result<T: Serialize>(result: Result<T, CapsuleError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Optional service result to 200/404/error
pub fn from_option<T: Serialize>(
    result: Result<Option<T>, CapsuleError>,
    not_found_msg: &str,
) -> Response<Full<Bytes>> {
    match result {
        Ok(Some(value)) => ok(&value),
        Ok(None) => not_found(not_found_msg),
        Err(e) => error_response(e),
    }
}

/// Creation result to 201/error
pub fn from_create_result<T: Serialize>(result: Result<T, CapsuleError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

/// Deletion result to 204 when deleted, 404 when the row was not there
pub fn from_delete_result(
    result: Result<bool, CapsuleError>,
    not_found_msg: &str,
) -> Response<Full<Bytes>> {
    match result {
        Ok(true) => no_content(),
        Ok(false) => not_found(not_found_msg),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_per_error_variant() {
        let cases = [
            (CapsuleError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CapsuleError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (CapsuleError::Precondition("x".into()), StatusCode::CONFLICT),
            (CapsuleError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (CapsuleError::Ledger("x".into()), StatusCode::BAD_GATEWAY),
            (CapsuleError::ContentStore("x".into()), StatusCode::BAD_GATEWAY),
            (
                CapsuleError::Persistence("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error_response(error).status(), expected);
        }
    }

    #[test]
    fn test_from_option_distinguishes_missing() {
        let present: Result<Option<u32>, CapsuleError> = Ok(Some(1));
        assert_eq!(from_option(present, "gone").status(), StatusCode::OK);

        let absent: Result<Option<u32>, CapsuleError> = Ok(None);
        assert_eq!(from_option(absent, "gone").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_binary_response_sets_content_type() {
        let resp = binary_response("application/octet-stream", vec![1, 2, 3]);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );
    }
}
