use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use easybook_core::CoreError;
use serde::Serialize;
use std::borrow::Cow;
use validator::{ValidationErrors, ValidationErrorsKind};

/// One rejected input field, reported as `{field, message}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String, Vec<FieldError>),
    NotFoundError(String),
    Anyhow(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::ValidationError(message.into(), Vec::new())
    }

    pub fn invalid_fields(errors: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        flatten(&errors, "", &mut fields);
        AppError::ValidationError("Invalid input".to_string(), fields)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg, Vec::new()),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg, Vec::new()),
            AppError::ValidationError(msg, errors) => (StatusCode::BAD_REQUEST, msg, errors),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg, Vec::new()),
            AppError::Anyhow(err) => {
                if let Some(core) = err.downcast_ref::<CoreError>() {
                    let (status, msg) = core_response(core);
                    (status, msg, Vec::new())
                } else if let Some(invalid) = err.downcast_ref::<ValidationErrors>() {
                    return AppError::invalid_fields(invalid.clone()).into_response();
                } else {
                    tracing::error!("Internal Server Error: {:#}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), Vec::new())
                }
            }
        };

        let body = Json(ErrorBody { success: false, message, errors });
        (status, body).into_response()
    }
}

fn core_response(err: &CoreError) -> (StatusCode, String) {
    match err {
        CoreError::Validation(msg) | CoreError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        CoreError::SlotUnavailable(_)
        | CoreError::DuplicateBooking(_)
        | CoreError::CancellationNotAllowed(_)
        | CoreError::SignatureInvalid(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        CoreError::ServiceInactive(_) => (StatusCode::FORBIDDEN, err.to_string()),
        CoreError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        CoreError::Storage(_) | CoreError::Internal(_) => {
            tracing::error!("Internal Server Error: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
        }
    }
}

/// `customer_info.email` becomes `customerInfo.email`.
fn flatten(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in entries {
        let path = if prefix.is_empty() {
            camel_case(field)
        } else {
            format!("{}.{}", prefix, camel_case(field))
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    let message = error
                        .message
                        .clone()
                        .unwrap_or_else(|| Cow::Owned(format!("{} is invalid", path)));
                    out.push(FieldError { field: path.clone(), message: message.into_owned() });
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    flatten(nested, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Contact {
        #[validate(email(message = "Email is invalid"))]
        email: String,
    }

    #[derive(Validate)]
    struct Form {
        #[validate(range(min = 0, message = "Amount must not be negative"))]
        total_amount: i64,
        #[validate(nested)]
        customer_info: Contact,
    }

    #[test]
    fn test_field_paths_are_camel_case_and_nested() {
        let form = Form { total_amount: -1, customer_info: Contact { email: "nope".to_string() } };
        let AppError::ValidationError(message, fields) = AppError::invalid_fields(form.validate().unwrap_err()) else {
            panic!("expected validation error");
        };
        assert_eq!(message, "Invalid input");
        assert_eq!(
            fields,
            vec![
                FieldError { field: "customerInfo.email".to_string(), message: "Email is invalid".to_string() },
                FieldError { field: "totalAmount".to_string(), message: "Amount must not be negative".to_string() },
            ]
        );
    }

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (CoreError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::CancellationNotAllowed(2), StatusCode::BAD_REQUEST),
            (CoreError::NotFound("Booking".into()), StatusCode::NOT_FOUND),
            (CoreError::ServiceInactive(uuid::Uuid::nil()), StatusCode::FORBIDDEN),
            (CoreError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (CoreError::Storage("pool timed out".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
