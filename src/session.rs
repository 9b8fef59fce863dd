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

//! Per-client session state, and the table of sessions keyed by client id.

use crate::dirent::Entry;
use std::collections::HashMap;

/// State a shell client accumulates across requests: its identity, its
/// position in the namespace, and a scratch buffer for paginated reads.
pub struct Session {
    pub username: String,
    pub root_entry: Entry,
    pub current_entry: Entry,
    pub last_entry: Option<Entry>,
    pub scratch: Vec<u8>,
    /// Entry held open by an in-flight `cat -r`/`cat -w` (entry, is_write),
    /// released on the matching `Write`/`Exit` option.
    pub locked_entry: Option<(Entry, bool)>,
}

impl Session {
    /// A fresh session logged in as `root`, rooted and positioned at `root`.
    pub fn new(root: Entry) -> Self {
        Session {
            username: "root".to_string(),
            current_entry: root.clone(),
            root_entry: root,
            last_entry: None,
            scratch: Vec::new(),
            locked_entry: None,
        }
    }

    /// Moves `current_entry` to `target`, remembering the previous one for
    /// `cd -`.
    pub fn enter(&mut self, target: Entry) {
        self.last_entry = Some(std::mem::replace(&mut self.current_entry, target));
    }

    /// Swaps `current_entry` with `last_entry`, implementing `cd -`.
    pub fn enter_last(&mut self) -> bool {
        match self.last_entry.take() {
            Some(prev) => {
                self.last_entry = Some(std::mem::replace(&mut self.current_entry, prev));
                true
            }
            None => false,
        }
    }
}

/// The server's table of live sessions, keyed by opaque client id.
#[derive(Default)]
pub struct Sessions {
    table: HashMap<u32, Session>,
}

impl Sessions {
    pub fn new() -> Self {
        Sessions {
            table: HashMap::new(),
        }
    }

    /// Creates (or replaces) the session for `client_id`.
    pub fn open(&mut self, client_id: u32, root: Entry) {
        self.table.insert(client_id, Session::new(root));
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut Session> {
        self.table.get_mut(&client_id)
    }

    pub fn close(&mut self, client_id: u32) {
        self.table.remove(&client_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn enter_last_round_trips_through_two_moves() {
        let root = Entry::new("/", 0);
        let mut session = Session::new(root.clone());
        let a = Entry::new("a", 1);
        let b = Entry::new("b", 2);
        session.enter(a.clone());
        session.enter(b.clone());
        assert_eq!(session.current_entry, b);
        assert!(session.enter_last());
        assert_eq!(session.current_entry, a);
    }

    #[test]
    fn sessions_table_opens_and_closes() {
        let mut sessions = Sessions::new();
        sessions.open(7, Entry::new("/", 0));
        assert!(sessions.get_mut(7).is_some());
        sessions.close(7);
        assert!(sessions.get_mut(7).is_none());
    }
}
