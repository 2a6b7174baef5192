pub mod cas_error;

pub use cas_error::{CasError, ErrorIndicator};

pub type CResult<T> = Result<T, CasError>;
