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

//! The request/response records exchanged between a shell client and the
//! server, and the option enumeration that selects non-default behavior for
//! a subset of commands.

use crate::error::ErrorCode;

/// A client-selected mode that changes how a command is handled: two-phase
/// confirmation for destructive operations, and the `cat` family's
/// scratch-file subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Opt {
    /// Default request: no special handling.
    #[default]
    None,
    /// Create a session for this client.
    New,
    /// `cat -w`: open a scratch copy of a file for an external editor.
    Get,
    /// `cat -r`: open a scratch copy of a file read-only.
    Read,
    /// Import scratch file contents back into the file.
    Write,
    /// Discard a scratch file without importing it.
    Exit,
    /// Deliver file contents in-band.
    Cat,
    /// Fetch the next 1024-byte slice of a paginated response.
    Patch,
    /// First phase of a two-phase destructive operation.
    Request,
    /// Second phase: the client confirmed, proceed.
    Response,
    /// `su` that also mutates the session's active username.
    Switch,
    /// Tab-completion query.
    Tab,
}

/// A request sent by a shell client to the server.
#[derive(Debug, Clone)]
pub struct Request {
    /// Opaque identifier of the client session (stands in for the reference's
    /// OS process id).
    pub client_id: u32,
    /// The command line, unparsed beyond whitespace splitting.
    pub data: String,
    /// Monotonic request id, echoed back in the matching response.
    pub id: u32,
    /// Whether the server has already consumed this request.
    pub consumed: bool,
    /// The requested mode.
    pub option: Opt,
}

impl Request {
    /// Builds a new request for `client_id`.
    pub fn new(client_id: u32, id: u32, data: impl Into<String>, option: Opt) -> Self {
        Request {
            client_id,
            data: data.into(),
            id,
            consumed: false,
            option,
        }
    }
}

/// A response sent by the server back to a shell client.
#[derive(Debug, Clone)]
pub struct Response {
    /// Human-readable payload: command output, or an error message.
    pub data: String,
    /// Echoes the request's id.
    pub id: u32,
    /// The outcome of the operation.
    pub code: ErrorCode,
    /// Whether the client has already consumed this response.
    pub consumed: bool,
    /// The mode the server answered under (may differ from the request's,
    /// e.g. `Request` flips to `Response` to ask for confirmation).
    pub option: Opt,
}

impl Response {
    /// Builds a successful response carrying `data`.
    pub fn ok(id: u32, data: impl Into<String>) -> Self {
        Response {
            data: data.into(),
            id,
            code: ErrorCode::Success,
            consumed: false,
            option: Opt::None,
        }
    }

    /// Builds a failing response carrying a human-readable `message`.
    pub fn err(id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Response {
            data: message.into(),
            id,
            code,
            consumed: false,
            option: Opt::None,
        }
    }

    /// Sets the response's option, returning `self` for chaining.
    pub fn with_option(mut self, option: Opt) -> Self {
        self.option = option;
        self
    }
}
