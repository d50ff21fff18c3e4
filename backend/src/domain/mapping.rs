//! Port error to domain error mapping shared by the reactors.

use super::Error;
use super::ports::DocumentStoreError;

pub(crate) fn map_store_error(error: DocumentStoreError) -> Error {
    match error {
        DocumentStoreError::Unavailable { message } => Error::service_unavailable(message),
        DocumentStoreError::NotFound { path } => {
            Error::not_found(format!("document {path} does not exist"))
        }
        DocumentStoreError::Conflict { path } => {
            Error::conflict(format!("document {path} changed concurrently"))
        }
        DocumentStoreError::InvalidWrite { message } => Error::invalid_request(message),
        DocumentStoreError::BatchRejected { message } => {
            Error::service_unavailable(format!("batch commit failed: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(DocumentStoreError::unavailable("down"), ErrorCode::ServiceUnavailable)]
    #[case(DocumentStoreError::not_found("tasks/t1"), ErrorCode::NotFound)]
    #[case(DocumentStoreError::conflict("counters/c"), ErrorCode::Conflict)]
    #[case(DocumentStoreError::invalid_write("bad"), ErrorCode::InvalidRequest)]
    #[case(DocumentStoreError::batch_rejected("boom"), ErrorCode::ServiceUnavailable)]
    fn store_errors_map_to_stable_codes(
        #[case] error: DocumentStoreError,
        #[case] expected: ErrorCode,
    ) {
        assert_eq!(map_store_error(error).code(), expected);
    }
}
