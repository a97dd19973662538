//! JSON envelopes shared by every route, and the mapping from errors and
//! rejections onto them.

use crate::error::Error;
use log::error;
use serde::Serialize;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{reject, Rejection, Reply};

#[derive(Debug)]
pub struct RateLimited;
impl reject::Reject for RateLimited {}

#[derive(Debug)]
pub struct BodyTooLarge;
impl reject::Reject for BodyTooLarge {}

#[derive(Debug)]
pub struct MalformedBody(pub String);
impl reject::Reject for MalformedBody {}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [String]>,
}

pub fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

pub fn failure(status: StatusCode, message: &str, errors: Option<&[String]>) -> Response {
    json_reply(
        &ErrorBody {
            success: false,
            message,
            errors,
        },
        status,
    )
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::EmptySource | Error::ValidationFailed(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_reply(err: &Error) -> Response {
    failure(status_for(err), &err.to_string(), err.validation_errors())
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Route not found".to_string())
    } else if err.find::<RateLimited>().is_some() {
        (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests, please try again later.".to_string(),
        )
    } else if err.find::<BodyTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if let Some(MalformedBody(reason)) = err.find::<MalformedBody>() {
        (StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", reason))
    } else if err.find::<reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query parameters".to_string())
    } else if err.find::<reject::InvalidHeader>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request header".to_string())
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(failure(status, &message, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::EmptySource), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::ValidationFailed(vec![])), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&Error::UpstreamUnavailable("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&Error::StoreFailure("pool closed".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_omits_empty_errors() {
        let body = serde_json::to_value(ErrorBody {
            success: false,
            message: "Current collection is empty",
            errors: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"success": false, "message": "Current collection is empty"})
        );
    }
}
