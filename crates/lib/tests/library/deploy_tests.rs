//! Full deployments through `DeploySession`.

use std::fs;

use opkg_lib::deploy::{DeployError, Phase};
use opkg_lib::ledger::Ledger;
use opkg_lib::manifest::BuildKind;
use opkg_lib::session::{InstallOutcome, SessionError};
use opkg_lib::util::hash::hash_file;

use super::common::{Workspace, deployed_dir};

#[test]
fn deploy_installs_release_and_records_it() {
  let ws = Workspace::new();
  ws.write_source("web.yml", "rel_num: \"1.4\"\nfiles:\n  - bin:bin\ntargets:\n  - bin:bin\n");
  ws.write_source("bin/app.sh", "run\n");
  let archive = ws.build("web", BuildKind::Release);

  let outcome = ws.deploy(&archive, ws.options()).unwrap();
  let deploy_dir = deployed_dir(&outcome);

  assert_eq!(fs::read_to_string(deploy_dir.join("bin/app.sh")).unwrap(), "run\n");
  assert!(deploy_dir.starts_with(ws.install_root().join("installs")));
  assert_eq!(deploy_dir.file_name().unwrap(), "web");

  let latest = Ledger::new(&ws.opkg_dir()).latest("web").unwrap();
  assert_eq!(latest.release_id, "1.4");
  assert_eq!(latest.release_timestamp, "0");
  assert_eq!(latest.content_hash, hash_file(&archive).unwrap());
  assert_eq!(
    deploy_dir.parent().unwrap().file_name().unwrap().to_string_lossy(),
    latest.deploy_stamp.to_string()
  );
}

#[test]
fn unchanged_archive_is_installed_once() {
  let ws = Workspace::new();
  ws.write_source("web.yml", "files:\n  - a.txt:a.txt\ntargets:\n  - a.txt:a.txt\n");
  ws.write_source("a.txt", "a");
  let archive = ws.build("web", BuildKind::Dev);

  let first = deployed_dir(&ws.deploy(&archive, ws.options()).unwrap());
  let latest_before = fs::read_to_string(ws.opkg_dir().join("meta/web/Latest.meta")).unwrap();

  let second = ws.deploy(&archive, ws.options()).unwrap();

  assert_eq!(second, InstallOutcome::AlreadyInstalled { location: first });
  assert_eq!(
    fs::read_to_string(ws.opkg_dir().join("meta/web/Latest.meta")).unwrap(),
    latest_before
  );
  assert!(!ws.opkg_dir().join("meta/web/Previous.meta").exists());
  assert!(ws.history().contains("already installed"));

  // The second session's stamp directory was released.
  let stamps = fs::read_dir(ws.install_root().join("installs")).unwrap().count();
  assert_eq!(stamps, 1);
}

#[test]
fn force_reinstalls_and_rotates_ledger() {
  let ws = Workspace::new();
  ws.write_source("web.yml", "files:\n  - a.txt:a.txt\n");
  ws.write_source("a.txt", "a");
  let archive = ws.build("web", BuildKind::Dev);

  ws.deploy(&archive, ws.options()).unwrap();
  let ledger = Ledger::new(&ws.opkg_dir());
  let first = ledger.latest("web").unwrap();

  let mut options = ws.options();
  options.force = true;
  let outcome = ws.deploy(&archive, options).unwrap();
  assert!(matches!(outcome, InstallOutcome::Installed { .. }));

  let history = ledger.load("web");
  assert_eq!(history.previous, Some(first.clone()));
  assert_ne!(history.latest.unwrap().deploy_stamp, first.deploy_stamp);
}

#[test]
fn new_release_moves_latest_to_previous() {
  let ws = Workspace::new();
  ws.write_source("web.yml", "rel_num: \"1.0\"\nfiles:\n  - a.txt:a.txt\n");
  ws.write_source("a.txt", "one");
  let v1 = ws.build("web", BuildKind::Release);
  ws.deploy(&v1, ws.options()).unwrap();

  ws.write_source("web.yml", "rel_num: \"1.1\"\nfiles:\n  - a.txt:a.txt\n");
  ws.write_source("a.txt", "two");
  let v2 = ws.build("web", BuildKind::Release);
  ws.deploy(&v2, ws.options()).unwrap();

  let history = Ledger::new(&ws.opkg_dir()).load("web");
  assert_eq!(history.latest.unwrap().release_id, "1.1");
  assert_eq!(history.previous.unwrap().release_id, "1.0");
}

#[test]
fn failing_pre_deploy_hook_blocks_the_rest() {
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    "files:\n  - bin:bin\ntargets:\n  - bin:bin\npre_deploy:\n  - exit 7\npost_deploy:\n  - echo post > post.txt\n",
  );
  ws.write_source("bin/app.sh", "run\n");
  let archive = ws.build("web", BuildKind::Dev);

  let err = ws.deploy(&archive, ws.options()).unwrap_err();

  match err {
    SessionError::Deploy { package, source } => {
      assert_eq!(package, "web");
      assert_eq!(source.phase(), Phase::PreDeploy);
      assert!(matches!(source, DeployError::Hook { .. }));
    }
    other => panic!("expected deploy failure, got {other:?}"),
  }

  assert_eq!(Ledger::new(&ws.opkg_dir()).latest("web"), None);
  let installs = ws.install_root().join("installs");
  for stamp in fs::read_dir(&installs).unwrap() {
    assert!(!stamp.unwrap().path().join("web/bin").exists());
  }
  assert!(ws.history().contains("Failed to install web"));
}

#[test]
fn templates_keep_empty_variables_verbatim() {
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    "files:\n  - conf:conf\ntargets:\n  - conf:conf\ntemplates:\n  - conf/app.conf\n",
  );
  ws.write_source("conf/app.conf", "listen {{ PORT }};\nname {{ NAME }};\n");
  let archive = ws.build("web", BuildKind::Dev);

  let mut options = ws.options();
  options.extra_vars.insert("PORT".to_string(), String::new());
  options.extra_vars.insert("NAME".to_string(), "web".to_string());
  let deploy_dir = deployed_dir(&ws.deploy(&archive, options).unwrap());

  assert_eq!(
    fs::read_to_string(deploy_dir.join("conf/app.conf")).unwrap(),
    "listen {{ PORT }};\nname web;\n"
  );
}

#[test]
fn replaces_rewrite_every_matching_line() {
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    "files:\n  - config.ini:config.ini\ntargets:\n  - config.ini:config.ini\nreplaces:\n  config.ini:\n    - \"HOST=.*\": \"HOST=prod.example.com\"\n",
  );
  ws.write_source("config.ini", "HOST=localhost\nPORT=80\nHOST=10.0.0.1\n");
  let archive = ws.build("web", BuildKind::Dev);

  let deploy_dir = deployed_dir(&ws.deploy(&archive, ws.options()).unwrap());

  assert_eq!(
    fs::read_to_string(deploy_dir.join("config.ini")).unwrap(),
    "HOST=prod.example.com\nPORT=80\nHOST=prod.example.com\n"
  );
}

#[test]
fn replacement_keeps_shell_variable_references() {
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    "files:\n  - env.sh:env.sh\ntargets:\n  - env.sh:env.sh\nreplaces:\n  env.sh:\n    - \"PATH=.*\": \"PATH=$PATH:/opt/bin\"\n    - \"(HOME)=.*\": \"$1=/home/$USER\"\n",
  );
  ws.write_source("env.sh", "PATH=/usr/bin\nHOME=/root\n");
  let archive = ws.build("web", BuildKind::Dev);

  let deploy_dir = deployed_dir(&ws.deploy(&archive, ws.options()).unwrap());

  assert_eq!(
    fs::read_to_string(deploy_dir.join("env.sh")).unwrap(),
    "PATH=$PATH:/opt/bin\nHOME=/home/$USER\n"
  );
}

#[test]
fn templates_and_replaces_rewrite_latin1_files() {
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    "files:\n  - conf:conf\ntargets:\n  - conf:conf\ntemplates:\n  - conf\nreplaces:\n  conf/app.ini:\n    - \"HOST=.*\": \"HOST=prod\"\n",
  );
  fs::create_dir_all(ws.build_root().join("conf")).unwrap();
  fs::write(ws.build_root().join("conf/app.ini"), b"HOST=old\nname={{ PACKAGE_NAME }} caf\xe9\n").unwrap();
  let archive = ws.build("web", BuildKind::Dev);

  let deploy_dir = deployed_dir(&ws.deploy(&archive, ws.options()).unwrap());

  assert_eq!(
    fs::read(deploy_dir.join("conf/app.ini")).unwrap(),
    b"HOST=prod\nname=web caf\xe9\n"
  );
}

#[test]
fn rewritten_files_leave_no_backups_by_default() {
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    "files:\n  - conf:conf\ntargets:\n  - conf:conf\ntemplates:\n  - conf\nreplaces:\n  conf/app.conf:\n    - \"listen .*\": \"listen 443;\"\n",
  );
  ws.write_source("conf/app.conf", "listen {{ PORT }};\nname {{ PACKAGE_NAME }};\n");
  let archive = ws.build("web", BuildKind::Dev);

  let mut options = ws.options();
  options.extra_vars.insert("PORT".to_string(), "80".to_string());
  let deploy_dir = deployed_dir(&ws.deploy(&archive, options).unwrap());

  let entries: Vec<_> = fs::read_dir(deploy_dir.join("conf"))
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  assert_eq!(entries, ["app.conf"]);
  assert_eq!(
    fs::read_to_string(deploy_dir.join("conf/app.conf")).unwrap(),
    "listen 443;\nname web;\n"
  );
}

#[test]
fn backup_option_keeps_each_rewrite() {
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    "files:\n  - conf:conf\ntargets:\n  - conf:conf\ntemplates:\n  - conf\nreplaces:\n  conf/app.conf:\n    - \"listen .*\": \"listen 443;\"\n",
  );
  ws.write_source("conf/app.conf", "listen {{ PORT }};\n");
  let archive = ws.build("web", BuildKind::Dev);

  let mut options = ws.options();
  options.backup = true;
  options.extra_vars.insert("PORT".to_string(), "80".to_string());
  let deploy_dir = deployed_dir(&ws.deploy(&archive, options).unwrap());

  let mut backups: Vec<String> = fs::read_dir(deploy_dir.join("conf"))
    .unwrap()
    .map(|e| e.unwrap().path())
    .filter(|p| p.file_name().unwrap() != "app.conf")
    .map(|p| fs::read_to_string(p).unwrap())
    .collect();
  backups.sort();
  assert_eq!(backups, ["listen 80;\n", "listen {{ PORT }};\n"]);
}

#[test]
fn release_id_survives_archive_name_round_trip() {
  let ws = Workspace::new();
  ws.write_source("web.yml", "rel_num: 10.0.3\nfiles: []\n");
  let archive = ws.build("web", BuildKind::Release);

  ws.deploy(&archive, ws.options()).unwrap();

  assert_eq!(Ledger::new(&ws.opkg_dir()).latest("web").unwrap().release_id, "10.0.3");
}

#[test]
#[cfg(unix)]
fn permissions_apply_mode_and_ownership() {
  use std::os::unix::fs::{MetadataExt, PermissionsExt};

  let (user, group) = super::common::current_owner();
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    &format!(
      "files:\n  - bin/app.sh:src/app.sh\ntargets:\n  - bin/app.sh:bin/app.sh\npermissions:\n  - bin/app.sh:{user}:{group} 0755\n"
    ),
  );
  ws.write_source("src/app.sh", "#!/bin/sh\n");
  let archive = ws.build("web", BuildKind::Dev);

  let deploy_dir = deployed_dir(&ws.deploy(&archive, ws.options()).unwrap());

  let meta = fs::metadata(deploy_dir.join("bin/app.sh")).unwrap();
  assert_eq!(meta.permissions().mode() & 0o7777, 0o755);
  assert_eq!(meta.uid(), nix::unistd::getuid().as_raw());
  assert_eq!(meta.gid(), nix::unistd::getgid().as_raw());
}

#[test]
#[cfg(unix)]
fn hooks_see_session_variables() {
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    "rel_num: \"3.1\"\npost_deploy:\n  - printf '%s %s %s' \"$PACKAGE_NAME\" \"$RELEASE_ID\" \"$ACTION\" > \"$DEPLOY_DIR/vars.txt\"\n",
  );
  let archive = ws.build("web", BuildKind::Release);

  let deploy_dir = deployed_dir(&ws.deploy(&archive, ws.options()).unwrap());

  assert_eq!(fs::read_to_string(deploy_dir.join("vars.txt")).unwrap(), "web 3.1 deploy");
}

#[test]
fn two_packages_share_one_session_stamp() {
  let ws = Workspace::new();
  ws.write_source("web.yml", "files:\n  - a.txt:a.txt\n");
  ws.write_source("api.yml", "files:\n  - a.txt:a.txt\n");
  ws.write_source("a.txt", "a");
  let web = ws.build("web", BuildKind::Dev);
  let api = ws.build("api", BuildKind::Dev);

  let mut session = opkg_lib::session::DeploySession::new(ws.options()).unwrap();
  let mut dirs = Vec::new();
  for archive in [&web, &api] {
    let (name, file) = session.stage_archive(archive).unwrap();
    dirs.push(deployed_dir(&session.install_package(&name, &file).unwrap()));
  }
  session.finish();

  assert_eq!(dirs[0].parent(), dirs[1].parent());
  assert_eq!(dirs[0].parent().unwrap(), session.version_dir());
  let ledger = Ledger::new(&ws.opkg_dir());
  assert_eq!(
    ledger.latest("web").unwrap().deploy_stamp,
    ledger.latest("api").unwrap().deploy_stamp
  );
  assert_eq!(ledger.installed_packages().unwrap(), ["api", "web"]);
}
