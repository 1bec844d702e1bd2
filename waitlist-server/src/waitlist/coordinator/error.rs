use shared::error::{AppError, ErrorCode};
use shared::models::WaitingStatus;
use thiserror::Error;

use super::super::ledger::LedgerError;
use crate::directory::DirectoryError;

/// What a missing resource was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Waiting,
    Member,
    Restaurant,
}

impl Resource {
    fn name(self) -> &'static str {
        match self {
            Resource::Waiting => "Waiting entry",
            Resource::Member => "Member",
            Resource::Restaurant => "Restaurant",
        }
    }

    fn code(self) -> ErrorCode {
        match self {
            Resource::Waiting => ErrorCode::WaitingNotFound,
            Resource::Member => ErrorCode::MemberNotFound,
            Resource::Restaurant => ErrorCode::RestaurantNotFound,
        }
    }
}

/// Coordinator errors
#[derive(Debug, Error)]
pub enum WaitlistError {
    #[error("{} not found: {id}", .resource.name())]
    NotFound { resource: Resource, id: i64 },

    #[error("{0}")]
    Forbidden(String),

    #[error("Member {member_id} does not own restaurant {restaurant_id}")]
    OwnerRequired { restaurant_id: i64, member_id: i64 },

    #[error("Cannot {action} waiting entry {id} in status {from}")]
    InvalidTransition {
        id: i64,
        from: WaitingStatus,
        action: &'static str,
    },

    #[error("{0}")]
    Validation(String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

pub type WaitlistResult<T> = Result<T, WaitlistError>;

impl WaitlistError {
    pub fn waiting_not_found(id: i64) -> Self {
        Self::NotFound {
            resource: Resource::Waiting,
            id,
        }
    }
}

impl From<LedgerError> for WaitlistError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::EntryNotFound(id) => Self::waiting_not_found(id),
            LedgerError::InvalidTransition { id, from, to } => Self::InvalidTransition {
                id,
                from,
                action: action_name(to),
            },
            other => Self::Ledger(other),
        }
    }
}

/// Verb used in messages for the transition into `to`
pub(crate) fn action_name(to: WaitingStatus) -> &'static str {
    match to {
        WaitingStatus::Waiting => "admit",
        WaitingStatus::Called => "call",
        WaitingStatus::Seated => "seat",
        WaitingStatus::Cancelled => "cancel",
        WaitingStatus::NoShow => "mark no-show for",
    }
}

impl From<WaitlistError> for AppError {
    fn from(err: WaitlistError) -> Self {
        match err {
            WaitlistError::NotFound { resource, id } => {
                AppError::with_message(resource.code(), format!("{} not found", resource.name()))
                    .with_detail("id", id)
            }
            WaitlistError::Forbidden(msg) => AppError::permission_denied(msg),
            WaitlistError::OwnerRequired { restaurant_id, .. } => AppError::with_message(
                ErrorCode::OwnerRequired,
                "Only the restaurant owner can manage its queue",
            )
            .with_detail("restaurantId", restaurant_id),
            WaitlistError::InvalidTransition { id, from, action } => AppError::with_message(
                ErrorCode::InvalidWaitingTransition,
                format!("Cannot {action} a waiting entry in status {from}"),
            )
            .with_detail("id", id)
            .with_detail("status", from.as_str()),
            WaitlistError::Validation(msg) => AppError::validation(msg),
            WaitlistError::Ledger(e) => {
                tracing::error!(error = %e, "Ledger error");
                AppError::database(e.to_string())
            }
            WaitlistError::Directory(e) => {
                tracing::error!(error = %e, "Directory error");
                AppError::internal(e.to_string())
            }
        }
    }
}
