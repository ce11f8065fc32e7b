//! RFC9457-style API error wrapper.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use zipline_pipeline::ArchiveError;

use crate::http::constants::{
    PROBLEM_BAD_REQUEST, PROBLEM_FORBIDDEN, PROBLEM_INTERNAL, PROBLEM_NOT_A_DIRECTORY,
    PROBLEM_NOT_FOUND,
};
use crate::models::ProblemDetails;

/// Structured API error rendered as a problem document.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    title: &'static str,
    detail: Option<String>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PROBLEM_INTERNAL,
            "internal server error",
        )
        .with_detail(message)
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, PROBLEM_BAD_REQUEST, "bad request").with_detail(detail)
    }

    pub(crate) fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, PROBLEM_FORBIDDEN, "forbidden").with_detail(detail)
    }

    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            PROBLEM_NOT_FOUND,
            "resource not found",
        )
        .with_detail(detail)
    }

    pub(crate) fn not_a_directory(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            PROBLEM_NOT_A_DIRECTORY,
            "not a directory",
        )
        .with_detail(detail)
    }
}

impl From<ArchiveError> for ApiError {
    fn from(error: ArchiveError) -> Self {
        match error {
            ArchiveError::NotFound { path } => Self::not_found(format!("{path} does not exist")),
            ArchiveError::NotADirectory { path } => {
                Self::not_a_directory(format!("{path} is not a directory"))
            }
            ArchiveError::PermissionDenied { path } => {
                Self::forbidden(format!("{path} may not be listed"))
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipline_core::FsPath;

    #[test]
    fn archive_errors_map_to_statuses() -> Result<(), zipline_core::PathError> {
        let path = FsPath::parse("/a")?;
        let cases = [
            (ArchiveError::NotFound { path: path.clone() }, StatusCode::NOT_FOUND),
            (
                ArchiveError::NotADirectory { path: path.clone() },
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (
                ArchiveError::PermissionDenied { path },
                StatusCode::FORBIDDEN,
            ),
            (ArchiveError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
        Ok(())
    }
}
