//! Error kinds raised while loading ground truth.
//!
//! These are carried inside [anyhow::Error]. Use
//! `err.downcast_ref::<DatasetError>()` to inspect the kind.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("path does not exist: '{}'", path.display())]
    NotFound { path: PathBuf },

    #[error("malformed annotation '{}': {reason}", path.display())]
    MalformedAnnotation { path: PathBuf, reason: String },

    #[error("unknown class '{name}' in annotation '{}'", path.display())]
    UnknownClass { path: PathBuf, name: String },
}

impl DatasetError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MalformedAnnotation {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Fails with [DatasetError::NotFound] unless `path` exists.
pub fn ensure_exists(path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DatasetError::not_found(path).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_error_display() {
        let err = DatasetError::not_found("/data/VOC2007");
        assert_eq!(err.to_string(), "path does not exist: '/data/VOC2007'");

        let err = DatasetError::UnknownClass {
            path: "a.xml".into(),
            name: "person".into(),
        };
        assert_eq!(
            err.to_string(),
            "unknown class 'person' in annotation 'a.xml'"
        );
    }

    #[test]
    fn dataset_error_downcast() {
        let err: anyhow::Error = ensure_exists("/definitely/not/here").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::NotFound { .. })
        ));
    }
}
