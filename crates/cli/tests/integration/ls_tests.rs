//! Ls command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

fn deployed_env() -> TestEnv {
  let env = TestEnv::new();
  env.write_source("web.yml", "rel_num: \"3.0\"\nfiles:\n  - a.txt:a.txt\ntargets:\n  - a.txt:a.txt\n");
  env.write_source("api.yml", "files:\n  - a.txt:a.txt\ntargets:\n  - a.txt:a.txt\n");
  env.write_source("a.txt", "a");
  let web = env.create("web", Some("3.0"));
  let api = env.create("api", None);

  let pkgs = format!("{},{}", web.display(), api.display());
  env.opkg_cmd().args(["deploy", "--pkg", &pkgs]).assert().success();
  env
}

#[test]
fn ls_prints_name_and_release() {
  let env = deployed_env();

  env
    .opkg_cmd()
    .arg("ls")
    .assert()
    .success()
    .stdout(predicate::str::contains("web-3.0"))
    .stdout(predicate::str::contains("api-dev"));
}

#[test]
fn ls_shows_location_under_install_root() {
  let env = deployed_env();
  let stamp = env.stamps().remove(0);

  env
    .opkg_cmd()
    .args(["ls", "--pkg", "web"])
    .assert()
    .success()
    .stdout(predicate::str::contains(stamp.join("web").display().to_string()))
    .stdout(predicate::str::contains("api-dev").not());
}

#[test]
fn ls_without_install_root_lists_releases_only() {
  let env = deployed_env();

  env
    .opkg_cmd()
    .env_remove("OPKG_INSTALL_ROOT")
    .arg("ls")
    .assert()
    .success()
    .stdout(predicate::str::contains("web-3.0"))
    .stdout(predicate::str::contains("installs").not());
}

#[test]
fn ls_warns_about_unknown_package() {
  let env = deployed_env();

  env
    .opkg_cmd()
    .args(["ls", "--pkg", "nope"])
    .assert()
    .success()
    .stderr(predicate::str::contains("nope is not installed"));
}

#[test]
fn ls_json_output() {
  let env = deployed_env();

  let output = env.opkg_cmd().args(["ls", "--json"]).output().unwrap();
  assert!(output.status.success());

  let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let entries = listing.as_array().unwrap();
  assert_eq!(entries.len(), 2);
  // Sorted by package name.
  assert_eq!(entries[0]["name"], "api");
  assert_eq!(entries[0]["release_id"], "dev");
  assert_eq!(entries[1]["name"], "web");
  assert_eq!(entries[1]["release_id"], "3.0");
  assert_eq!(entries[1]["installed"], true);
}
