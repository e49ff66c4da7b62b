#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PolicyError {
    UnsupportedFilesystemPath { path: String },
    PathContainsNullByte { path: String },
    PathNotInCanonicalForm { path: String },
}

impl core::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedFilesystemPath { path } => {
                write!(f, "path \"{path}\" is not absolute")
            }
            Self::PathContainsNullByte { path } => {
                write!(f, "path {path:?} contains a null byte")
            }
            Self::PathNotInCanonicalForm { path } => {
                write!(f, "path \"{path}\" contains \".\", \"..\" or empty components")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

impl From<std::ffi::NulError> for PolicyError {
    fn from(e: std::ffi::NulError) -> Self {
        Self::PathContainsNullByte {
            path: String::from_utf8_lossy(&e.into_vec()).into_owned(),
        }
    }
}
