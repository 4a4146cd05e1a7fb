//! Create command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn create_dev_archive() {
  let env = TestEnv::new();
  env.write_source("web.yml", "files:\n  - conf/app.conf:app.conf\n");
  env.write_source("app.conf", "listen 80\n");

  env
    .opkg_cmd()
    .args(["create", "--pkg", "web", "--build-root"])
    .arg(env.build_root())
    .assert()
    .success()
    .stdout(predicate::str::contains("Package web has been created"));

  assert!(env.work_dir().join("web.tgz").is_file());
  assert!(!env.build_root().join(".pkg/web").exists());
}

#[test]
fn create_release_archive_is_named_after_rel_num() {
  let env = TestEnv::new();
  env.write_source("api.yml", "rel_num: \"2.3\"\nfiles:\n  - app.conf:app.conf\n");
  env.write_source("app.conf", "x");

  let archive = env.create("api", Some("2.3"));

  assert!(archive.is_file());
  assert!(!env.work_dir().join("api.tgz").exists());
}

#[test]
fn create_release_without_rel_num_fails() {
  let env = TestEnv::new();
  env.write_source("api.yml", "files:\n  - app.conf:app.conf\n");
  env.write_source("app.conf", "x");

  env
    .opkg_cmd()
    .args(["create", "--release", "--pkg", "api", "--build-root"])
    .arg(env.build_root())
    .assert()
    .failure()
    .stderr(predicate::str::contains("releaseId"));
}

#[test]
fn create_continues_after_a_failed_package() {
  let env = TestEnv::new();
  env.write_source("good.yml", "files:\n  - a.txt:a.txt\n");
  env.write_source("a.txt", "a");

  env
    .opkg_cmd()
    .args(["create", "--pkg", "missing,good", "--build-root"])
    .arg(env.build_root())
    .assert()
    .failure()
    .stdout(predicate::str::contains("Package good has been created"))
    .stderr(predicate::str::contains("missing"));

  assert!(env.work_dir().join("good.tgz").is_file());
}

#[test]
fn create_rejects_illegal_package_name() {
  let env = TestEnv::new();

  env
    .opkg_cmd()
    .args(["create", "--pkg", "bad-name", "--build-root"])
    .arg(env.build_root())
    .assert()
    .failure();
}
