//! Conversions from external infrastructure errors into domain errors.

use cashlink_domain::CashlinkError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CashlinkError);

impl From<InfraError> for CashlinkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CashlinkError> for InfraError {
    fn from(value: CashlinkError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoCashlinkError {
    fn into_cashlink(self) -> CashlinkError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CashlinkError */
/* -------------------------------------------------------------------------- */

impl IntoCashlinkError for SqlError {
    fn into_cashlink(self) -> CashlinkError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        CashlinkError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CashlinkError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 1555 | 2067) => {
                        CashlinkError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        CashlinkError::Database("foreign key constraint violation".into())
                    }
                    _ => CashlinkError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => {
                CashlinkError::NotFound("no rows returned by query".into())
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                CashlinkError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                CashlinkError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                CashlinkError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidParameterName(parameter_name) => {
                CashlinkError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => CashlinkError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => CashlinkError::Database("invalid SQL query".into()),
            other => CashlinkError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_cashlink())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CashlinkError */
/* -------------------------------------------------------------------------- */

impl IntoCashlinkError for HttpError {
    fn into_cashlink(self) -> CashlinkError {
        if self.is_timeout() {
            return CashlinkError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return CashlinkError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message = format!(
                "HTTP {} {}",
                code,
                status.canonical_reason().unwrap_or("unknown status")
            );

            return match code {
                401 | 403 => CashlinkError::Auth(message),
                404 => CashlinkError::NotFound(message),
                400..=499 => CashlinkError::InvalidInput(message),
                _ => CashlinkError::Network(message),
            };
        }

        CashlinkError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_cashlink())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → CashlinkError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(CashlinkError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
