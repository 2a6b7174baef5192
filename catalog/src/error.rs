use common::err::CasError;
use thiserror::Error;

/// Failures specific to the class representation engine (§4.1–§4.4).
/// These are folded into [`CasError::Dbms`] at the CAS boundary (§7:
/// "DBMS errors are surfaced with the engine's own code and message
/// string") rather than exposed as a CAS-side taxonomy entry.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown representation id {0}")]
    UnknownRepr(i32),

    #[error("corrupted record: {0}")]
    Corrupted(String),

    #[error("incompatible collations: {0} vs {1}")]
    IncompatibleCollations(i32, i32),

    #[error("cannot coerce value of type {from:?} to domain {to:?}")]
    CannotCoerce { from: common::value::DomainType, to: common::value::DomainType },

    #[error("fixed region length mismatch: expected {expected}, got {actual}")]
    FixedLengthMismatch { expected: usize, actual: usize },

    #[error("attribute {0} not found in current representation")]
    UnknownAttribute(i32),

    #[error("class {0} not found in db_class")]
    UnknownClass(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    fn wire_code(&self) -> i32 {
        match self {
            CatalogError::UnknownRepr(_) => -2001,
            CatalogError::Corrupted(_) => -2002,
            CatalogError::IncompatibleCollations(_, _) => -2003,
            CatalogError::CannotCoerce { .. } => -2004,
            CatalogError::FixedLengthMismatch { .. } => -2005,
            CatalogError::UnknownAttribute(_) => -2006,
            CatalogError::UnknownClass(_) => -2007,
            CatalogError::Io(_) => -2008,
        }
    }
}

impl From<CatalogError> for CasError {
    fn from(err: CatalogError) -> Self {
        let code = err.wire_code();
        CasError::Dbms { code, message: err.to_string() }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
