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

//! Parses a shell command line into a [`Command`], and dispatches it
//! against the filesystem engine and the caller's session.

use crate::dirent::Entry;
use crate::error::{Error, ErrorCode};
use crate::fs::Filesystem;
use crate::lock;
use crate::session::Session;
use crate::wire::{Opt, Request, Response};

/// A parsed, whitespace-split command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Cat(String),
    Cd(Option<String>),
    Check,
    Copy(String, String),
    Del(Vec<String>),
    Dir(bool, Option<String>),
    Info(Option<String>),
    Ls(bool, Option<String>),
    Ll(bool, Option<String>),
    Md(Vec<String>),
    NewFile(Vec<String>),
    Rd(Vec<String>),
    Save,
    Su(String, Option<String>),
    SudoUseradd(String, String),
    SudoChmod(String, String),
    Exit,
    Unknown(String),
}

/// Splits `line` on whitespace and classifies it into a [`Command`].
pub fn parse(line: &str) -> Command {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&head) = tokens.first() else {
        return Command::Unknown(String::new());
    };
    let rest = &tokens[1..];
    match head {
        "cat" => Command::Cat(rest.last().map(|s| s.to_string()).unwrap_or_default()),
        "cd" => Command::Cd(rest.first().map(|s| s.to_string())),
        "check" => Command::Check,
        "copy" if rest.len() == 2 => Command::Copy(rest[0].to_string(), rest[1].to_string()),
        "del" => Command::Del(rest.iter().map(|s| s.to_string()).collect()),
        "dir" => parse_listing(rest, Command::Dir as fn(bool, Option<String>) -> Command),
        "info" => Command::Info(rest.first().map(|s| s.to_string())),
        "ls" => parse_listing(rest, Command::Ls as fn(bool, Option<String>) -> Command),
        "ll" => parse_listing(rest, Command::Ll as fn(bool, Option<String>) -> Command),
        "md" => Command::Md(rest.iter().map(|s| s.to_string()).collect()),
        "newfile" => Command::NewFile(rest.iter().map(|s| s.to_string()).collect()),
        "rd" => Command::Rd(rest.iter().map(|s| s.to_string()).collect()),
        "save" => Command::Save,
        "su" if rest.len() == 1 => Command::Su(rest[0].to_string(), None),
        "su" if rest.len() == 2 => {
            Command::Su(rest[0].to_string(), Some(rest[1].to_string()))
        }
        "sudo" if rest.first() == Some(&"useradd") && rest.len() == 3 => {
            Command::SudoUseradd(rest[1].to_string(), rest[2].to_string())
        }
        "sudo" if rest.first() == Some(&"chmod") && rest.len() == 3 => {
            Command::SudoChmod(rest[1].to_string(), rest[2].to_string())
        }
        "exit" => Command::Exit,
        _ => Command::Unknown(line.to_string()),
    }
}

fn parse_listing(rest: &[&str], make: fn(bool, Option<String>) -> Command) -> Command {
    let stat_self = rest.first() == Some(&"-s");
    let path = rest.iter().find(|a| **a != "-s").map(|s| s.to_string());
    make(stat_self, path)
}

fn err_response(id: u32, e: Error) -> Response {
    let code = e.code();
    Response::err(id, code, e.to_string())
}

/// Executes `request.data` against `fs` and `session`, producing the
/// response to send back to the client.
pub fn dispatch(fs: &mut Filesystem, session: &mut Session, request: &Request) -> Response {
    let id = request.id;

    // A `Write`/`Exit` option on an open scratch file carries raw file
    // content (or nothing), not a command line: route it straight to `cat`
    // without tokenizing `request.data`.
    if matches!(request.option, Opt::Write | Opt::Exit) && session.locked_entry.is_some() {
        return cat(fs, session, &request.data, request.option, id);
    }
    if request.option == Opt::Patch {
        return patch(session, &request.data, id);
    }
    if request.option == Opt::Tab {
        return tab(fs, session, &request.data, id);
    }

    let command = parse(&request.data);
    match command {
        Command::Cat(path) => cat(fs, session, &path, request.option, id),
        Command::Cd(arg) => cd(fs, session, arg.as_deref(), id),
        Command::Check => Response::ok(id, fs.check()),
        Command::Copy(src, dst) => copy(fs, session, &src, &dst, id),
        Command::Del(paths) => batch(fs, session, &paths, id, |fs, parent, name| {
            fs.remove_file(parent, name)
        }),
        Command::Dir(stat_self, path) => listing(fs, session, stat_self, path.as_deref(), false, id),
        Command::Ls(stat_self, path) => listing(fs, session, stat_self, path.as_deref(), false, id),
        Command::Ll(stat_self, path) => listing(fs, session, stat_self, path.as_deref(), true, id),
        Command::Info(flag) => info(fs, session, flag.as_deref(), id),
        Command::Md(paths) => {
            let owner = session.username.clone();
            batch(fs, session, &paths, id, move |fs, parent, name| {
                fs.make_directory(parent, name, &owner)
            })
        }
        Command::NewFile(paths) => {
            let owner = session.username.clone();
            batch(fs, session, &paths, id, move |fs, parent, name| {
                fs.create_file(parent, name, &owner)
            })
        }
        Command::Rd(paths) => rd(fs, session, &paths, request.option, id),
        Command::Save => Response::ok(id, "saved"),
        Command::Su(user, pass) => su(fs, session, &user, pass.as_deref(), request.option, id),
        Command::SudoUseradd(user, pass) => sudo_useradd(fs, session, &user, &pass, id),
        Command::SudoChmod(mode, path) => sudo_chmod(fs, session, &mode, &path, id),
        Command::Exit => Response::ok(id, "bye"),
        Command::Unknown(line) => Response::err(id, ErrorCode::Failure, format!("unknown command: {line}")),
    }
}

fn resolve_or_err(fs: &mut Filesystem, session: &Session, path: &str, id: u32) -> Result<Entry, Response> {
    fs.resolve(session, path).map_err(|e| err_response(id, e))
}

fn cd(fs: &mut Filesystem, session: &mut Session, arg: Option<&str>, id: u32) -> Response {
    if arg == Some("-") {
        return if session.enter_last() {
            Response::ok(id, "")
        } else {
            Response::err(id, ErrorCode::FileNotFound, "cd: no previous directory")
        };
    }
    let path = arg.unwrap_or("~");
    let target = match resolve_or_err(fs, session, path, id) {
        Ok(e) => e,
        Err(r) => return r,
    };
    let inode = match fs.inode_of(target.inode_id) {
        Ok(i) => i,
        Err(e) => return err_response(id, e),
    };
    if inode.kind != crate::inode::Kind::Dir {
        return Response::err(id, ErrorCode::FileNotMatch, "cd: Not a directory");
    }
    if fs.check_perm(&inode, &session.username, crate::fs::EXEC).is_err() {
        return Response::err(id, ErrorCode::PermissionDenied, "cd: Permission denied");
    }
    session.enter(target);
    Response::ok(id, "")
}

fn listing(
    fs: &mut Filesystem,
    session: &mut Session,
    stat_self: bool,
    path: Option<&str>,
    long: bool,
    id: u32,
) -> Response {
    let target = match resolve_or_err(fs, session, path.unwrap_or("."), id) {
        Ok(e) => e,
        Err(r) => return r,
    };
    match fs.list(&target, long, stat_self) {
        Ok(data) => Response::ok(id, data),
        Err(e) => err_response(id, e),
    }
}

fn batch(
    fs: &mut Filesystem,
    session: &mut Session,
    paths: &[String],
    id: u32,
    op: impl Fn(&mut Filesystem, &Entry, &str) -> crate::error::Result<()>,
) -> Response {
    for path in paths {
        let (parent_path, name) = Filesystem::split_path_and_name(path);
        let parent = match resolve_or_err(fs, session, &parent_path, id) {
            Ok(e) => e,
            Err(r) => return r,
        };
        if let Err(e) = op(fs, &parent, &name) {
            return err_response(id, e);
        }
    }
    Response::ok(id, "")
}

fn rd(fs: &mut Filesystem, session: &mut Session, paths: &[String], option: Opt, id: u32) -> Response {
    for path in paths {
        let (parent_path, name) = Filesystem::split_path_and_name(path);
        let parent = match resolve_or_err(fs, session, &parent_path, id) {
            Ok(e) => e,
            Err(r) => return r,
        };
        match fs.remove_directory(&parent, &name, option) {
            Ok(()) => {}
            Err(Error::WaitRequest) => {
                return Response::err(
                    id,
                    ErrorCode::WaitRequest,
                    format!("{path}: not empty, resend with confirmation to remove"),
                )
                .with_option(Opt::Response);
            }
            Err(e) => return err_response(id, e),
        }
    }
    Response::ok(id, "")
}

const HOST_PREFIX: &str = "<host>";

/// Strips a leading `<host>` marker, if present, returning the remainder
/// and whether the marker was there.
fn strip_host_prefix(path: &str) -> (bool, &str) {
    match path.strip_prefix(HOST_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, path),
    }
}

/// `copy SRC DST`, where either side may be prefixed `<host>` to name a
/// real path on the machine hosting the server rather than a path inside
/// the image.
fn copy(fs: &mut Filesystem, session: &mut Session, src: &str, dst: &str, id: u32) -> Response {
    let (src_is_host, src) = strip_host_prefix(src);
    let (dst_is_host, dst) = strip_host_prefix(dst);

    let data = if src_is_host {
        match std::fs::read(src) {
            Ok(d) => d,
            Err(e) => return Response::err(id, ErrorCode::Failure, format!("copy: {src}: {e}")),
        }
    } else {
        let src_entry = match resolve_or_err(fs, session, src, id) {
            Ok(e) => e,
            Err(r) => return r,
        };
        match fs.read_whole(&src_entry) {
            Ok(d) => d,
            Err(e) => return err_response(id, e),
        }
    };

    if dst_is_host {
        return match std::fs::write(dst, &data) {
            Ok(()) => Response::ok(id, ""),
            Err(e) => Response::err(id, ErrorCode::Failure, format!("copy: {dst}: {e}")),
        };
    }

    let (parent_path, name) = Filesystem::split_path_and_name(dst);
    let parent = match resolve_or_err(fs, session, &parent_path, id) {
        Ok(e) => e,
        Err(r) => return r,
    };
    if fs.child(&parent, &name).ok().flatten().is_none() {
        if let Err(e) = fs.create_file(&parent, &name, &session.username) {
            return err_response(id, e);
        }
    }
    let dst_entry = match fs.child(&parent, &name) {
        Ok(Some(e)) => e,
        _ => return Response::err(id, ErrorCode::Failure, "copy: destination vanished"),
    };
    match fs.write_whole(&dst_entry, &data, &session.username) {
        Ok(()) => Response::ok(id, ""),
        Err(e) => err_response(id, e),
    }
}

/// `info [-h|-i]`: command help, or a snapshot of the image's bitmap
/// populations.
fn info(fs: &mut Filesystem, session: &Session, flag: Option<&str>, id: u32) -> Response {
    match flag {
        Some("-h") => Response::ok(
            id,
            "cat cd check copy del dir info ls ll md newfile rd save su sudo exit",
        ),
        Some("-i") => Response::ok(
            id,
            format!(
                "blocks used: {}/{}  inodes used: {}/{}  block size: {}",
                fs.block_bitmap_count(),
                crate::layout::BLOCKS_NUM,
                fs.inode_bitmap_count(),
                crate::layout::INODES_NUM,
                crate::layout::BLOCK_SIZE,
            ),
        ),
        _ => Response::ok(id, format!("user: {}", session.username)),
    }
}

fn cat(fs: &mut Filesystem, session: &mut Session, path: &str, option: Opt, id: u32) -> Response {
    match option {
        Opt::Read | Opt::Get => {
            let entry = match resolve_or_err(fs, session, path, id) {
                Ok(e) => e,
                Err(r) => return r,
            };
            let is_write = option == Opt::Get;
            let locked = if is_write {
                lock::acquire_write(fs, entry.inode_id)
            } else {
                lock::acquire_read(fs, entry.inode_id)
            };
            if let Err(e) = locked {
                return err_response(id, e);
            }
            let data = match fs.read_whole(&entry) {
                Ok(d) => d,
                Err(e) => return err_response(id, e),
            };
            session.scratch = data.clone();
            session.locked_entry = Some((entry, is_write));
            Response::ok(id, String::from_utf8_lossy(&data).into_owned())
        }
        Opt::Write => match session.locked_entry.take() {
            Some((entry, true)) => {
                let result = fs.write_data(&entry, path.as_bytes());
                let _ = lock::release_write(fs, entry.inode_id);
                match result {
                    Ok(()) => Response::ok(id, ""),
                    Err(e) => err_response(id, e),
                }
            }
            Some((entry, false)) => {
                let _ = lock::release_read(fs, entry.inode_id);
                Response::err(id, ErrorCode::Failure, "cat: not opened for writing")
            }
            None => Response::err(id, ErrorCode::Failure, "cat: nothing open"),
        },
        Opt::Exit => match session.locked_entry.take() {
            Some((entry, true)) => {
                let _ = lock::release_write(fs, entry.inode_id);
                Response::ok(id, "")
            }
            Some((entry, false)) => {
                let _ = lock::release_read(fs, entry.inode_id);
                Response::ok(id, "")
            }
            None => Response::ok(id, ""),
        },
        _ => {
            let entry = match resolve_or_err(fs, session, path, id) {
                Ok(e) => e,
                Err(r) => return r,
            };
            match fs.read_whole(&entry) {
                Ok(data) => Response::ok(id, String::from_utf8_lossy(&data).into_owned()),
                Err(e) => err_response(id, e),
            }
        }
    }
}

/// Returns the next 1024-byte slice of `session.scratch`, at an offset
/// given by the ASCII decimal index carried in `index`.
fn patch(session: &Session, index: &str, id: u32) -> Response {
    let i: usize = match index.trim().parse() {
        Ok(i) => i,
        Err(_) => return Response::err(id, ErrorCode::Failure, "patch: bad slice index"),
    };
    let start = i * 1024;
    if start >= session.scratch.len() {
        return Response::ok(id, "");
    }
    let end = (start + 1024).min(session.scratch.len());
    Response::ok(id, String::from_utf8_lossy(&session.scratch[start..end]).into_owned())
}

/// Completes the last whitespace-separated token of `line` against the
/// names in the session's current directory, appending `/` to directories.
fn tab(fs: &mut Filesystem, session: &Session, line: &str, id: u32) -> Response {
    let prefix = line.rsplit(char::is_whitespace).next().unwrap_or("");
    let inode = match fs.inode_of(session.current_entry.inode_id) {
        Ok(i) => i,
        Err(e) => return err_response(id, e),
    };
    if inode.kind != crate::inode::Kind::Dir {
        return Response::ok(id, "");
    }
    let listing = match fs.list(&session.current_entry, false, false) {
        Ok(l) => l,
        Err(e) => return err_response(id, e),
    };
    let mut matches = Vec::new();
    for name in listing.split("  ").filter(|n| !n.is_empty() && n.starts_with(prefix)) {
        let suffix = match fs.child(&session.current_entry, name) {
            Ok(Some(child)) => match fs.inode_of(child.inode_id) {
                Ok(i) if i.kind == crate::inode::Kind::Dir => "/",
                _ => "",
            },
            _ => "",
        };
        matches.push(format!("{name}{suffix}"));
    }
    Response::ok(id, matches.join(" "))
}

fn su(
    fs: &mut Filesystem,
    session: &mut Session,
    user: &str,
    pass: Option<&str>,
    _option: Opt,
    id: u32,
) -> Response {
    match pass {
        Some(pass) if fs.authenticate(user, pass) => {
            session.username = user.to_string();
            Response::ok(id, "").with_option(Opt::Switch)
        }
        _ => Response::err(id, ErrorCode::PermissionDenied, "su: Authentication failure"),
    }
}

fn sudo_useradd(fs: &mut Filesystem, session: &mut Session, user: &str, pass: &str, id: u32) -> Response {
    if session.username != "root" {
        return Response::err(id, ErrorCode::PermissionDenied, "sudo: Permission denied");
    }
    match fs.useradd(user, pass) {
        Ok(()) => Response::ok(id, ""),
        Err(e) => err_response(id, e),
    }
}

fn sudo_chmod(fs: &mut Filesystem, session: &mut Session, mode: &str, path: &str, id: u32) -> Response {
    if session.username != "root" {
        return Response::err(id, ErrorCode::PermissionDenied, "sudo: Permission denied");
    }
    let entry = match resolve_or_err(fs, session, path, id) {
        Ok(e) => e,
        Err(r) => return r,
    };
    match fs.chmod(&entry, mode) {
        Ok(()) => Response::ok(id, ""),
        Err(e) => err_response(id, e),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_ls_with_stat_flag_and_path() {
        assert_eq!(
            parse("ls -s /home"),
            Command::Ls(true, Some("/home".to_string()))
        );
        assert_eq!(parse("ls"), Command::Ls(false, None));
    }

    #[test]
    fn parses_sudo_subcommands() {
        assert_eq!(
            parse("sudo useradd bob bob"),
            Command::SudoUseradd("bob".to_string(), "bob".to_string())
        );
        assert_eq!(
            parse("sudo chmod u+x /f"),
            Command::SudoChmod("u+x".to_string(), "/f".to_string())
        );
    }

    #[test]
    fn parses_cd_dash_as_none_argument_distinctly() {
        assert_eq!(parse("cd -"), Command::Cd(Some("-".to_string())));
        assert_eq!(parse("cd"), Command::Cd(None));
    }

    #[test]
    fn parses_info_flag() {
        assert_eq!(parse("info -i"), Command::Info(Some("-i".to_string())));
        assert_eq!(parse("info"), Command::Info(None));
    }

    fn fresh() -> (Filesystem, Session) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let fs = Filesystem::format(tmp.path()).unwrap();
        (fs, Session::new(Entry::new("/", 0)))
    }

    #[test]
    fn info_dash_i_reports_bitmap_populations() {
        let (mut fs, mut session) = fresh();
        session.current_entry = fs.root_entry();
        session.root_entry = fs.root_entry();
        let request = Request::new(1, 0, "info -i", Opt::None);
        let resp = dispatch(&mut fs, &mut session, &request);
        assert_eq!(resp.code, crate::error::ErrorCode::Success);
        assert!(resp.data.contains("blocks used"));
        assert!(resp.data.contains("inodes used"));
    }

    #[test]
    fn copy_round_trips_through_a_host_file() {
        let (mut fs, mut session) = fresh();
        session.current_entry = fs.root_entry();
        session.root_entry = fs.root_entry();
        let host_src = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(host_src.path(), b"from the host").unwrap();

        let copy_in = Request::new(
            1,
            0,
            format!("copy <host>{} /imported", host_src.path().display()),
            Opt::None,
        );
        let resp = dispatch(&mut fs, &mut session, &copy_in);
        assert_eq!(resp.code, crate::error::ErrorCode::Success);

        let entry = fs.resolve_from(&fs.root_entry(), "imported").unwrap();
        assert_eq!(fs.read_whole(&entry).unwrap(), b"from the host");
    }
}
