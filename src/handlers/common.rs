use validator::Validate;

use crate::errors::ApiError;

/// Validates a request payload, mapping failures to a 400 response.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(e.to_string()))
}
