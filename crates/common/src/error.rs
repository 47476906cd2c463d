//! Error types for floot

use thiserror::Error;

/// Result type alias using the floot Error
pub type Result<T> = std::result::Result<T, Error>;

/// floot error types
#[derive(Error, Debug)]
pub enum Error {
    /// The spec document is malformed or references something that does not exist
    #[error("Spec error: {0}")]
    Spec(String),

    /// A run could not proceed (undefined parameter, bad request id, ...)
    #[error("Run error: {0}")]
    Run(String),

    #[error("{kind} {id} does not exist")]
    NotFound { kind: String, id: String },

    #[error("{kind} {id} exists already")]
    AlreadyExists { kind: String, id: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Breadcrumb naming the testset/endpoint/request an error surfaced in
    #[error("{context}: {source}")]
    Context { context: String, source: Box<Error> },
}

impl Error {
    /// Attach a breadcrumb. Only the first (innermost) breadcrumb is kept,
    /// enriching an already enriched error returns it unchanged.
    pub fn enrich(self, context: impl Into<String>) -> Self {
        match self {
            enriched @ Error::Context { .. } => enriched,
            other => Error::Context {
                context: context.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn is_enriched(&self) -> bool {
        matches!(self, Error::Context { .. })
    }

    /// The error without its breadcrumb
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Domain errors (bad spec, missing run, ...) are expected and exit with 2,
    /// everything else is unexpected and exits with 3.
    pub fn is_domain(&self) -> bool {
        matches!(
            self.root(),
            Error::Spec(_) | Error::Run(_) | Error::NotFound { .. } | Error::AlreadyExists { .. }
        )
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_domain() {
            2
        } else {
            3
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Breadcrumb helper for results
pub trait ResultExt<T> {
    fn breadcrumb<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn breadcrumb<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.enrich(context()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrich_is_idempotent() {
        let err = Error::Run("undefined parameter".into())
            .enrich("smoke > /health > abc")
            .enrich("smoke > /health")
            .enrich("smoke");

        assert_eq!(
            err.to_string(),
            "smoke > /health > abc: Run error: undefined parameter"
        );
        assert!(err.is_enriched());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Spec("bad".into()).exit_code(), 2);
        assert_eq!(Error::not_found("run", "x").exit_code(), 2);
        assert_eq!(Error::Http("refused".into()).exit_code(), 3);
        assert_eq!(Error::Internal("boom".into()).enrich("smoke").exit_code(), 3);
        assert_eq!(Error::Run("boom".into()).enrich("smoke").exit_code(), 2);
    }

    #[test]
    fn test_breadcrumb_on_result() {
        let res: Result<()> = Err(Error::Spec("unknown strategy".into()));
        let err = res.breadcrumb(|| "smoke > /items").unwrap_err();
        assert!(err.to_string().starts_with("smoke > /items: "));
    }
}
