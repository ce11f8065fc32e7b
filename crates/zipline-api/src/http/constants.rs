//! Shared HTTP constants (headers, problem URIs, content types).

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const HEADER_UID: &str = "x-zipline-uid";
pub(crate) const HEADER_GIDS: &str = "x-zipline-gids";
pub(crate) const HEADER_USER: &str = "x-zipline-user";
pub(crate) const HEADER_ARCHIVE_ID: &str = "x-zipline-archive-id";

pub(crate) const CONTENT_TYPE_ZIP: &str = "application/zip";
pub(crate) const CONTENT_TYPE_METRICS: &str = "text/plain; version=0.0.4";
pub(crate) const DEFAULT_ARCHIVE_NAME: &str = "archive";

pub(crate) const PROBLEM_INTERNAL: &str = "https://zipline.dev/problems/internal";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://zipline.dev/problems/bad-request";
pub(crate) const PROBLEM_FORBIDDEN: &str = "https://zipline.dev/problems/forbidden";
pub(crate) const PROBLEM_NOT_FOUND: &str = "https://zipline.dev/problems/not-found";
pub(crate) const PROBLEM_NOT_A_DIRECTORY: &str = "https://zipline.dev/problems/not-a-directory";
