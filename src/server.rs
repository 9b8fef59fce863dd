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

//! The request dispatcher: a single worker thread owns the [`Filesystem`]
//! and the session table, and serializes every client's requests through
//! one `mpsc` queue.
//!
//! This stands in for the reference's shared-memory-plus-semaphores
//! transport (see REDESIGN FLAGS in the design notes): a channel already
//! gives the "one writer at a time, requests executed in arrival order"
//! guarantee the reference builds by hand out of a mutex and a counting
//! semaphore.

use crate::command;
use crate::error::ErrorCode;
use crate::fs::Filesystem;
use crate::session::Sessions;
use crate::wire::{Opt, Request, Response};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::thread;

/// One request in flight, paired with the channel its response goes back
/// out on.
struct Envelope {
    request: Request,
    reply: mpsc::Sender<Response>,
}

/// Owns the filesystem and the session table on a dedicated worker thread,
/// and exposes [`Server::connect`] to mint new clients.
pub struct Server {
    sender: mpsc::Sender<Envelope>,
    worker: Option<thread::JoinHandle<()>>,
    next_client_id: AtomicU32,
}

impl Server {
    /// Starts the worker thread, taking ownership of `fs`.
    pub fn start(fs: Filesystem) -> Self {
        let (sender, receiver) = mpsc::channel::<Envelope>();
        let worker = thread::spawn(move || run_worker(fs, receiver));
        Server {
            sender,
            worker: Some(worker),
            next_client_id: AtomicU32::new(1),
        }
    }

    /// Opens a new session and returns a handle for issuing requests
    /// against it.
    pub fn connect(&self) -> Client {
        let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let mut client = Client {
            client_id,
            sender: self.sender.clone(),
            next_request_id: 0,
        };
        let _ = client.send_with_option("", Opt::New);
        client
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Dropping `sender` (there is no other clone held by `Server`
        // itself) lets the worker's receive loop end once every connected
        // `Client` has also dropped its sender, then we join it.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(mut fs: Filesystem, receiver: mpsc::Receiver<Envelope>) {
    let mut sessions = Sessions::new();
    for envelope in receiver {
        let Envelope { request, reply } = envelope;
        log::debug!(
            "client {} request #{} option={:?} data={:?}",
            request.client_id,
            request.id,
            request.option,
            request.data
        );
        let response = if request.option == Opt::New {
            sessions.open(request.client_id, fs.root_entry());
            Response::ok(request.id, "")
        } else {
            match sessions.get_mut(request.client_id) {
                Some(session) => command::dispatch(&mut fs, session, &request),
                None => Response::err(
                    request.id,
                    ErrorCode::Failure,
                    "no session open for this client",
                ),
            }
        };
        match response.code {
            ErrorCode::Success => log::info!(
                "client {} request #{} succeeded",
                request.client_id,
                request.id
            ),
            code => log::warn!(
                "client {} request #{} failed: {:?}",
                request.client_id,
                request.id,
                code
            ),
        }
        let _ = reply.send(response);
    }
}

/// A handle a shell client uses to talk to the [`Server`].
///
/// `send` blocks until the matching response arrives, which preserves "at
/// most one shell writes a request at a time" per client: the exclusive
/// `&mut self` receiver required to call it rules out two threads racing
/// on the same client's requests, while distinct clients may still have
/// requests in flight concurrently on the shared worker queue.
pub struct Client {
    client_id: u32,
    sender: mpsc::Sender<Envelope>,
    next_request_id: u32,
}

impl Client {
    /// The opaque client identifier this handle was issued under.
    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Sends `data` as a default (`Opt::None`) request and waits for the
    /// response.
    pub fn send(&mut self, data: impl Into<String>) -> Response {
        self.send_with_option(data, Opt::None)
    }

    /// Sends `data` under `option` and waits for the response.
    pub fn send_with_option(&mut self, data: impl Into<String>, option: Opt) -> Response {
        let id = self.next_request_id;
        self.next_request_id += 1;
        let request = Request::new(self.client_id, id, data, option);
        let (reply_tx, reply_rx) = mpsc::channel();
        if self
            .sender
            .send(Envelope {
                request,
                reply: reply_tx,
            })
            .is_err()
        {
            return Response::err(id, ErrorCode::Failure, "server is no longer running");
        }
        reply_rx
            .recv()
            .unwrap_or_else(|_| Response::err(id, ErrorCode::Failure, "server dropped the response"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::NamedTempFile;

    fn server() -> Server {
        let tmp = NamedTempFile::new().unwrap();
        let fs = Filesystem::format(tmp.path()).unwrap();
        Server::start(fs)
    }

    #[test]
    fn a_connected_client_can_list_the_bootstrap_tree() {
        let server = server();
        let mut client = server.connect();
        let resp = client.send("ls /");
        assert_eq!(resp.code, ErrorCode::Success);
        assert_eq!(resp.data, "home  lost+found  proc  root  usr");
    }

    #[test]
    fn two_clients_get_independent_sessions() {
        let server = server();
        let mut alice = server.connect();
        let mut bob = server.connect();
        assert_ne!(alice.client_id(), bob.client_id());

        alice.send("cd /usr");
        let alice_listing = alice.send("ls");
        assert_eq!(alice_listing.data, "lock  user.log");

        let bob_listing = bob.send("ls");
        assert_eq!(bob_listing.data, "home  lost+found  proc  root  usr");
    }

    #[test]
    fn requests_on_the_same_client_are_answered_in_order() {
        let server = server();
        let mut client = server.connect();
        let a = client.send("md /x");
        let b = client.send("newfile /x/y");
        assert_eq!(a.code, ErrorCode::Success);
        assert_eq!(b.code, ErrorCode::Success);
        assert!(a.id < b.id);
    }

    #[test]
    fn permission_denied_surfaces_through_the_dispatcher() {
        let server = server();
        let mut client = server.connect();
        client.send("sudo useradd bob bob");
        let su = client.send_with_option("su bob bob", Opt::Switch);
        assert_eq!(su.code, ErrorCode::Success);
        let resp = client.send("cd /root");
        assert_eq!(resp.code, ErrorCode::PermissionDenied);
        assert_eq!(resp.data, "cd: Permission denied");
    }
}
