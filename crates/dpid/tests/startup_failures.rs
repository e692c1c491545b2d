//! Startup checks that make the `dpid` binary exit with failure.

mod support;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

use support::Layout;

#[test]
fn missing_plugin_directories_fail_startup() {
    let layout = Layout::without_plugins().expect("scratch layout");
    let mut command = cargo_bin_cmd!("dpid");
    command.args(layout.args());
    command
        .assert()
        .failure()
        .stderr(contains("no plugin directory found"));
}

#[test]
fn second_instance_refuses_to_start() {
    let layout = Layout::new().expect("scratch layout");
    layout
        .add_plugin("cookies", "cookies.dpi", "sleep 1")
        .expect("plugin");
    let _daemon = layout.spawn(&[]).expect("first daemon");

    let mut command = cargo_bin_cmd!("dpid");
    command.args(layout.args());
    command
        .assert()
        .failure()
        .stderr(contains("already running"));
}

#[test]
fn invalid_log_filter_is_reported() {
    let layout = Layout::new().expect("scratch layout");
    let mut command = cargo_bin_cmd!("dpid");
    command
        .arg("--config-dir")
        .arg(layout.config_dir())
        .args(["--log-filter", "dpid=notalevel"]);
    command
        .assert()
        .failure()
        .stderr(contains("invalid log filter"));
}
