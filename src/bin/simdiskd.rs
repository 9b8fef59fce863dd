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

//! `simdiskd` formats or loads a disk image and serves shell commands read
//! from stdin, one line per request, printing each response to stdout.
//!
//! The interactive line editor (history, tab completion UI, echo
//! suppression) and the real shared-memory transport are out of this
//! crate's scope (see `spec.md` §1); this binary is the minimal host that
//! drives the engine end to end over a single local client.

use simdisk::error::ErrorCode;
use simdisk::wire::Opt;
use simdisk::{Filesystem, Server};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::exit;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// The name of the current program, as invoked.
    prog: String,
    /// If true, print command line help and exit.
    help: bool,
    /// If true, format a fresh image at `image` before serving it.
    format: bool,
    /// Path to the disk image to format or load.
    image: Option<PathBuf>,
}

impl Args {
    fn is_valid(&self) -> bool {
        self.help || self.image.is_some()
    }
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut iter = env::args();
    args.prog = iter.next().unwrap_or_else(|| "simdiskd".to_owned());

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => args.help = true,
            "--format" => args.format = true,
            "--image" => args.image = iter.next().map(PathBuf::from),
            other => {
                eprintln!("{}: unrecognized argument '{other}'", args.prog);
                exit(1);
            }
        }
    }
    args
}

fn print_usage(prog: &str) {
    eprintln!("{prog}: bad usage");
    eprintln!("Try '{prog} --help' for more information.");
}

fn print_help(prog: &str) {
    println!();
    println!("Usage:");
    println!(" {prog} --image <path> [--format]");
    println!();
    println!("Serves a simdisk filesystem image over stdin/stdout, one");
    println!("command per line.");
    println!();
    println!("Options:");
    println!(" -h, --help      Print this help.");
    println!(" --image <path>  Path to the disk image.");
    println!(" --format        Create a fresh image at <path> before serving.");
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = parse_args();

    if !args.is_valid() {
        print_usage(&args.prog);
        exit(1);
    }
    if args.help {
        print_help(&args.prog);
        exit(0);
    }

    let image = args.image.expect("validated by is_valid");
    let fs = if args.format {
        log::info!("formatting a fresh image at {}", image.display());
        Filesystem::format(&image)
    } else {
        log::info!("loading image at {}", image.display());
        Filesystem::load(&image)
    };
    let fs = match fs {
        Ok(fs) => fs,
        Err(e) => {
            log::error!("could not open {}: {e}", image.display());
            eprintln!("{}: {e}", args.prog);
            exit(1);
        }
    };

    let server = Server::start(fs);
    let mut client = server.connect();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::error!("reading stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let exiting = line.trim() == "exit";
        let response = client.send(&line);
        if response.code == ErrorCode::Success {
            if !response.data.is_empty() {
                println!("{}", response.data);
            }
        } else {
            eprintln!("{}", response.data);
            if response.code == ErrorCode::WaitRequest {
                eprint!("proceed anyway? [y/N] ");
                io::stdout().flush().ok();
                let mut confirm = String::new();
                if io::stdin().read_line(&mut confirm).is_ok() && confirm.trim() == "y" {
                    let retry = client.send_with_option(&line, Opt::Response);
                    if retry.code == ErrorCode::Success {
                        if !retry.data.is_empty() {
                            println!("{}", retry.data);
                        }
                    } else {
                        eprintln!("{}", retry.data);
                    }
                }
            }
        }
        if exiting {
            break;
        }
    }
}
