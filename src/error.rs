/*
 * Copyright 2026 The Simdisk Authors
 *
 * This file is part of Simdisk.
 *
 * Simdisk is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Simdisk is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Simdisk. If not, see <https://www.gnu.org/licenses/>.
 */

//! Error types shared across the filesystem engine and the dispatcher.

use std::fmt;
use std::io;

/// The wire-level error code attached to every `Response`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    Failure,
    Exists,
    Exceeded,
    WaitRequest,
    FileNotFound,
    FileNotMatch,
    PermissionDenied,
    Locked,
}

/// An error returned by a filesystem operation.
#[derive(Debug)]
pub enum Error {
    /// The target already exists.
    Exists,
    /// A name exceeded [`crate::layout::MAX_NAME`].
    Exceeded,
    /// A destructive operation needs client confirmation before proceeding.
    WaitRequest,
    /// No such file or directory.
    FileNotFound,
    /// The target is a file where a directory was expected, or vice versa.
    FileNotMatch,
    /// The caller lacks the permission bit required for the operation.
    PermissionDenied,
    /// The inode is advisory-locked by another session.
    Locked,
    /// A host I/O error, or any other unrecoverable condition.
    Io(io::Error),
}

impl Error {
    /// Maps the error onto the wire-level [`ErrorCode`].
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Exists => ErrorCode::Exists,
            Error::Exceeded => ErrorCode::Exceeded,
            Error::WaitRequest => ErrorCode::WaitRequest,
            Error::FileNotFound => ErrorCode::FileNotFound,
            Error::FileNotMatch => ErrorCode::FileNotMatch,
            Error::PermissionDenied => ErrorCode::PermissionDenied,
            Error::Locked => ErrorCode::Locked,
            Error::Io(_) => ErrorCode::Failure,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Exists => write!(f, "File exists"),
            Error::Exceeded => {
                write!(f, "Exceeded the maximum name length (24 characters)")
            }
            Error::WaitRequest => write!(f, "confirmation required"),
            Error::FileNotFound => write!(f, "No such file or directory"),
            Error::FileNotMatch => write!(f, "Is a directory"),
            Error::PermissionDenied => write!(f, "Permission denied"),
            Error::Locked => write!(f, "resource is locked"),
            Error::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// The result type returned by every filesystem operation.
pub type Result<T> = std::result::Result<T, Error>;
