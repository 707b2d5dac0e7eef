use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouteFsError {
    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("entry already exists: {0}")]
    Exists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("invalid consistency discipline: {0}")]
    BadDiscipline(i32),

    #[error("no such route handle: {0}")]
    RouteNotFound(usize),

    #[error("bad file handle: {0}")]
    BadHandle(u64),

    #[error("handler failed: {0}")]
    Handler(i32),
}

impl RouteFsError {
    /// Negative errno equivalent, for hosts speaking POSIX return codes.
    pub fn errno(&self) -> i32 {
        match self {
            RouteFsError::NotFound(_) => -libc::ENOENT,
            RouteFsError::Exists(_) => -libc::EEXIST,
            RouteFsError::NotADirectory(_) => -libc::ENOTDIR,
            RouteFsError::IsADirectory(_) => -libc::EISDIR,
            RouteFsError::NotEmpty(_) => -libc::ENOTEMPTY,
            RouteFsError::InvalidPath(_) => -libc::EINVAL,
            RouteFsError::BadPattern { .. } => -libc::EINVAL,
            RouteFsError::BadDiscipline(_) => -libc::EINVAL,
            RouteFsError::RouteNotFound(_) => -libc::ENOENT,
            RouteFsError::BadHandle(_) => -libc::EBADF,
            RouteFsError::Handler(rc) => *rc,
        }
    }
}

pub type Result<T> = std::result::Result<T, RouteFsError>;
