//! The dpip plugin protocol.
//!
//! dpip is a tag-based text protocol spoken between a browser front-end, the
//! `dpid` daemon, and helper plugins over Unix-domain sockets. This crate
//! provides:
//!
//! - the tag grammar ([`build_cmd`], [`build_cmd_fmt`], [`get_attr`]),
//! - the buffered, mode-aware socket handle [`Dsh`],
//! - shared-secret authentication ([`KeysFile`], [`check_auth`]),
//! - client helpers for the daemon's rendezvous socket
//!   ([`RendezvousClient`]).

pub mod auth;
pub mod client;
pub mod dsh;
pub mod error;
pub mod tag;

pub use auth::{KEYS_FILE_NAME, KeysFile, check_auth};
pub use client::{
    RENDEZVOUS_SOCKET_NAME, RendezvousClient, SOCKET_DIR_POINTER_NAME, connect_authenticated,
};
pub use dsh::{Dsh, DshMode, DshStatus, FLUSH_THRESHOLD, WriteStatus};
pub use error::{ClientError, DpipError, DshError, KeysError};
pub use tag::{
    MODE_SWITCH_TAG, TAG_END, build_cmd, build_cmd_fmt, escape, find_tag_end, get_attr,
    get_attr_bytes, parse_attrs,
};
