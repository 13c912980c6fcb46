//! Result codes returned by index operations.
//!
//! Every operation resolves to one code of a closed taxonomy. Codes fall in
//! two classes that callers must keep apart:
//!
//! - **Logical** (`NotFound`, `AlreadyInserted`, `NotInserted`, `NotDeleted`):
//!   the state of the data. The transaction's read set is still valid.
//! - **Conflict** (`BadInsert`, `BadScan`): a page version mismatch was
//!   detected. The transaction must abort or retry, whatever else the call
//!   returned.

use std::fmt as StdFmt;

// ============================================================================
//  ResultCode
// ============================================================================

/// Closed result taxonomy shared by every index operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultCode {
    /// Operation succeeded.
    Ok = 0,

    /// Key absent.
    NotFound,

    /// Page version conflict on a write path, or a structural insert failure.
    BadInsert,

    /// Insert refused for a reason unrelated to concurrency.
    NotInserted,

    /// Key already present.
    AlreadyInserted,

    /// Validated delete found nothing to delete.
    NotDeleted,

    /// Page version conflict on a read or scan path.
    BadScan,
}

impl ResultCode {
    /// True for the concurrency-conflict codes.
    #[inline]
    #[must_use]
    pub const fn is_conflict(self) -> bool {
        matches!(self, Self::BadInsert | Self::BadScan)
    }

    /// True for codes that only describe the data.
    #[inline]
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::NotInserted | Self::AlreadyInserted | Self::NotDeleted
        )
    }

    /// Fold an operation result into its code.
    #[must_use]
    pub fn of<T, E: Into<IndexError>>(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(err) => err.into().code(),
        }
    }
}

impl StdFmt::Display for ResultCode {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::BadInsert => "BAD_INSERT",
            Self::NotInserted => "NOT_INSERTED",
            Self::AlreadyInserted => "ALREADY_INSERTED",
            Self::NotDeleted => "NOT_DELETED",
            Self::BadScan => "BAD_SCAN",
        };
        f.write_str(name)
    }
}

// ============================================================================
//  IndexError
// ============================================================================

/// Every non-OK outcome of an index operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexError {
    /// Key absent.
    NotFound,

    /// Write-path conflict or structural insert failure.
    BadInsert,

    /// Insert refused by the collaborator.
    NotInserted,

    /// Key already present.
    AlreadyInserted,

    /// Nothing to delete.
    NotDeleted,

    /// Read-path conflict.
    BadScan,
}

impl IndexError {
    /// The taxonomy code for this error.
    #[must_use]
    pub const fn code(self) -> ResultCode {
        match self {
            Self::NotFound => ResultCode::NotFound,
            Self::BadInsert => ResultCode::BadInsert,
            Self::NotInserted => ResultCode::NotInserted,
            Self::AlreadyInserted => ResultCode::AlreadyInserted,
            Self::NotDeleted => ResultCode::NotDeleted,
            Self::BadScan => ResultCode::BadScan,
        }
    }

    /// True if the transaction's accumulated view is no longer trustworthy.
    #[inline]
    #[must_use]
    pub const fn is_conflict(self) -> bool {
        self.code().is_conflict()
    }
}

impl StdFmt::Display for IndexError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),

            Self::BadInsert => write!(f, "insert conflicted with a concurrent page change"),

            Self::NotInserted => write!(f, "insert refused"),

            Self::AlreadyInserted => write!(f, "key already inserted"),

            Self::NotDeleted => write!(f, "key not deleted"),

            Self::BadScan => write!(f, "read conflicted with a concurrent page change"),
        }
    }
}

impl std::error::Error for IndexError {}

// ============================================================================
//  InsertError
// ============================================================================

/// Failure of an insert.
///
/// A duplicate key reports the value already stored, so callers that want to
/// compare against it don't need a second lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertError<V> {
    /// Key already present; `existing` is the stored value, left unchanged.
    AlreadyInserted {
        /// Value stored under the key.
        existing: V,
    },

    /// Write-path conflict or structural insert failure.
    BadInsert,

    /// Insert refused by the collaborator.
    NotInserted,
}

impl<V> InsertError<V> {
    /// The taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> ResultCode {
        match self {
            Self::AlreadyInserted { .. } => ResultCode::AlreadyInserted,
            Self::BadInsert => ResultCode::BadInsert,
            Self::NotInserted => ResultCode::NotInserted,
        }
    }

    /// True if the transaction must abort or retry.
    #[inline]
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::BadInsert)
    }

    /// The stored value, for a duplicate key.
    #[must_use]
    pub fn into_existing(self) -> Option<V> {
        match self {
            Self::AlreadyInserted { existing } => Some(existing),
            Self::BadInsert | Self::NotInserted => None,
        }
    }
}

impl<V> From<InsertError<V>> for IndexError {
    fn from(err: InsertError<V>) -> Self {
        match err {
            InsertError::AlreadyInserted { .. } => Self::AlreadyInserted,
            InsertError::BadInsert => Self::BadInsert,
            InsertError::NotInserted => Self::NotInserted,
        }
    }
}

impl<V> StdFmt::Display for InsertError<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::AlreadyInserted { .. } => write!(f, "key already inserted"),
            Self::BadInsert => write!(f, "insert conflicted with a concurrent page change"),
            Self::NotInserted => write!(f, "insert refused"),
        }
    }
}

impl<V: StdFmt::Debug> std::error::Error for InsertError<V> {}
