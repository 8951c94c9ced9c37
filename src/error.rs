use crate::database::DatabaseError;
use crate::models::{AuctionEvent, AuctionStatus};
use sqlx::Error as SqlxError;
use thiserror::Error;
use uuid::Uuid;

/// Domain errors raised by the auction core (FSM, lot ordering, selection, timer).
///
/// All of these are local validation failures: the session is left untouched
/// and the caller is expected to surface them to the operator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuctionError {
    /// The event is not permitted from the current status
    #[error("Event '{event}' is not allowed in status '{from}'")]
    InvalidTransition {
        from: AuctionStatus,
        event: AuctionEvent,
    },

    /// Lots can only be added, removed or reordered while idle or configured
    #[error("Lot list cannot be changed while auction is '{status}'")]
    StructuralEditRejected { status: AuctionStatus },

    /// Selection was invoked with no non-eliminated lots
    #[error("No eligible lots to select from")]
    NoEligibleLots,

    /// Auction duration outside 10..=600 seconds
    #[error("Duration {0}s is out of range (10-600)")]
    DurationOutOfRange(u32),

    /// Roulette spin length outside 1..=30 seconds
    #[error("Spin duration {0}s is out of range (1-30)")]
    SpinDurationOutOfRange(u32),

    /// Donation or sum value rejected
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Reorder referenced a lot that is not part of the session
    #[error("Lot {0} is not part of this auction")]
    UnknownLot(Uuid),

    /// Reorder would leave two lots sharing the same position
    #[error("Order value {0} is used more than once")]
    DuplicateOrder(i32),

    /// Appending would push a lot's order past `i32::MAX`
    #[error("No order value left after {0} to append lots")]
    OrderOverflow(i32),

    /// Rounds are only played while running and before a winner is decided
    #[error("Selection is unavailable while auction is '{status}'")]
    SelectionUnavailable { status: AuctionStatus },

    /// Only idle or archived auctions may be deleted
    #[error("Auction in status '{status}' cannot be deleted")]
    DeletionRejected { status: AuctionStatus },
}

/// Result type for the auction core
pub type AuctionResult<T> = Result<T, AuctionError>;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Auction rule violations
    #[error("Auction error: {0}")]
    Auction(#[from] AuctionError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database errors
    #[error("SQL error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Concurrent modification detected by a conditional write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Business logic errors
    #[error("Business logic error: {0}")]
    BusinessLogic(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// UUID parsing errors
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a database connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(DatabaseError::PoolCreation(_))
                | AppError::Database(DatabaseError::ConnectionTimeout)
        )
    }

    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Domain error carried by this error, if any
    pub fn auction_error(&self) -> Option<&AuctionError> {
        match self {
            AppError::Auction(e) => Some(e),
            _ => None,
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Auction(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Validation(_) => 400,
            AppError::Conflict(_) => 409,
            AppError::BusinessLogic(_) => 400,
            AppError::Config(_) => 500,
            AppError::Database(_) | AppError::Sqlx(_) => 500,
            _ => 500,
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Stored row could not be mapped back into a domain value
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Conditional write lost against a concurrent change
    #[error("Stale write: {0}")]
    Conflict(String),

    /// Snapshot or storage I/O failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Query(e) => AppError::Sqlx(e),
            RepositoryError::Duplicate(msg) => AppError::BusinessLogic(format!("Duplicate: {}", msg)),
            RepositoryError::ConstraintViolation(msg) => AppError::Validation(msg),
            RepositoryError::Corrupt(msg) => AppError::Message(format!("Corrupt record: {}", msg)),
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
            RepositoryError::Storage(msg) => AppError::Message(format!("Storage error: {}", msg)),
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                if code.as_deref() == Some("23505") {
                    // Unique violation
                    RepositoryError::Duplicate(db_err.message().to_string())
                } else if code.as_deref() == Some("23503") || code.as_deref() == Some("23514") {
                    // Foreign key / check constraint violation
                    RepositoryError::ConstraintViolation(db_err.message().to_string())
                } else {
                    RepositoryError::Query(err)
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}

/// Convenience function to convert Option<T> to Result<T, AppError>
pub fn option_to_result<T>(opt: Option<T>, error_msg: &str) -> AppResult<T> {
    opt.ok_or_else(|| AppError::NotFound(error_msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_bad_request() {
        let err: AppError = AuctionError::NoEligibleLots.into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.auction_error(), Some(&AuctionError::NoEligibleLots));
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err: AppError = RepositoryError::Conflict("status changed".into()).into();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = AuctionError::InvalidTransition {
            from: AuctionStatus::Archived,
            event: AuctionEvent::Reset,
        };
        assert_eq!(err.to_string(), "Event 'reset' is not allowed in status 'archived'");
    }
}
