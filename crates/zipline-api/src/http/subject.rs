//! Caller identity taken from headers set by a trusted front end.

use axum::http::HeaderMap;
use zipline_core::Subject;

use crate::http::constants::{HEADER_GIDS, HEADER_UID, HEADER_USER};
use crate::http::errors::ApiError;

/// Build the request subject; `Subject::nobody()` when no uid is supplied.
pub(crate) fn subject_from_headers(headers: &HeaderMap) -> Result<Subject, ApiError> {
    let Some(uid) = header(headers, HEADER_UID)? else {
        return Ok(Subject::nobody());
    };
    let uid = uid
        .trim()
        .parse::<u32>()
        .map_err(|_| ApiError::bad_request(format!("{HEADER_UID} must be a numeric uid")))?;

    let gids = match header(headers, HEADER_GIDS)? {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|gid| !gid.is_empty())
            .map(str::parse::<u32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                ApiError::bad_request(format!("{HEADER_GIDS} must be comma-separated gids"))
            })?,
        None => Vec::new(),
    };

    let subject = Subject::new(uid, gids);
    Ok(match header(headers, HEADER_USER)? {
        Some(name) => subject.with_name(name.trim()),
        None => subject,
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::bad_request(format!("{name} must be visible ASCII")))
        })
        .transpose()
}
