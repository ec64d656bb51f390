//! Request dispatch and failure classification shared by every component
//! that talks to a backend.

use std::error::Error as StdError;

use agent_bridge_model::Error;
use mime::Mime;
use reqwest::header::{self, HeaderMap};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

/// Sends a request, only classifying transport failures.
///
/// The response is returned whatever its status is.
pub async fn send_raw(req: RequestBuilder) -> Result<Response, Error> {
    req.send()
        .await
        .map_err(|err| Error::connection(describe(&err)))
}

/// Sends a request and classifies both transport failures and
/// non-success statuses.
pub async fn send(req: RequestBuilder) -> Result<Response, Error> {
    let resp = send_raw(req).await?;
    check_status(resp).await
}

/// Turns a non-success response into a `BackendError`, using the `detail`
/// or `message` field of a JSON body when there is one.
pub async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(backend_error(status, &body))
}

/// Rejects success responses that carry no body.
pub fn ensure_body(resp: &Response) -> Result<(), Error> {
    if resp.status() == StatusCode::NO_CONTENT
        || resp.content_length() == Some(0)
    {
        return Err(Error::protocol(format!(
            "backend returned {} without a response body",
            resp.status()
        )));
    }
    Ok(())
}

/// Returns whether the response declares an event-stream or NDJSON body.
pub fn is_streaming_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .map(|m: Mime| {
            let subtype = m.subtype().as_str();
            subtype == "event-stream" || subtype.ends_with("ndjson")
        })
        .unwrap_or(false)
}

pub(crate) fn backend_error(status: StatusCode, body: &str) -> Error {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["detail", "message"]
            .iter()
            .find_map(|key| detail_text(v.get(*key)?))
    });
    match detail {
        Some(detail) => Error::backend(format!("{status}: {detail}")),
        None => Error::backend(format!("{status}")),
    }
}

fn detail_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
