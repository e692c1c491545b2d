//! Unit tests for request decoding and readiness selection.
//!
//! The event loop itself reaps with `waitpid(-1)`, which would collect
//! children belonging to other tests, so it is exercised end to end by the
//! `dpid` binary tests instead.

use std::path::PathBuf;

use nix::unistd::Pid;
use rstest::rstest;

use super::commands::Request;
use super::*;

#[rstest]
#[case::auth("<cmd='auth' msg='ab' '>", Request::Auth)]
#[case::bye("<cmd='DpiBye' '>", Request::Bye)]
#[case::check("<cmd='check_server' msg='proto.http' '>", Request::CheckServer(Some(String::from("proto.http"))))]
#[case::check_without_name("<cmd='check_server' '>", Request::CheckServer(None))]
#[case::register("<cmd='register_all' '>", Request::RegisterAll)]
#[case::unknown("<cmd='reload' '>", Request::Unknown(String::from("reload")))]
#[case::no_cmd("<msg='x' '>", Request::Malformed)]
#[case::garbage("hello '>", Request::Malformed)]
fn requests_are_decoded(#[case] tag: &str, #[case] expected: Request) {
    assert_eq!(Request::parse(tag), expected);
}

#[rstest]
#[case::idle_filter("http/http.filter.dpi", None, true)]
#[case::busy_filter("http/http.filter.dpi", Some(42), true)]
#[case::idle_server("cookies/cookies.dpi", None, true)]
#[case::running_server("cookies/cookies.dpi", Some(42), false)]
fn only_running_servers_are_disarmed(
    #[case] relative: &str,
    #[case] pid: Option<i32>,
    #[case] armed: bool,
) {
    let plugin = Plugin::new("p", PathBuf::from("/dpi").join(relative));
    assert_eq!(is_armed(&plugin, pid.map(Pid::from_raw)), armed);
}
