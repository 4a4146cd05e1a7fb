//! Archive builds followed by extraction.

use std::fs;

use opkg_lib::archive::{ArchiveError, BuildRequest, build, unpack};
use opkg_lib::manifest::{BuildKind, ManifestError};

use super::common::Workspace;

#[test]
fn build_then_extract_reproduces_declared_files() {
  let ws = Workspace::new();
  ws.write_source(
    "web.yml",
    "rel_num: \"2.0\"\nfiles:\n  - bin/app.sh:src/app.sh\n  - conf:conf\n  - share/data.bin:assets/data.bin\n",
  );
  ws.write_source("src/app.sh", "#!/bin/sh\nexec web\n");
  ws.write_source("conf/app.conf", "listen {{ PORT }};\n");
  ws.write_source("conf/sites/default.conf", "server {}\n");
  ws.write_source("assets/data.bin", "\u{0}\u{1}binary\u{2}");

  let archive = ws.build("web", BuildKind::Release);
  assert_eq!(archive.file_name().unwrap(), "web-2.0.tgz");

  let out = ws.temp.path().join("extracted");
  unpack(&archive, &out).unwrap();

  for (target, source) in [
    ("bin/app.sh", "src/app.sh"),
    ("conf/app.conf", "conf/app.conf"),
    ("conf/sites/default.conf", "conf/sites/default.conf"),
    ("share/data.bin", "assets/data.bin"),
  ] {
    assert_eq!(
      fs::read(out.join(target)).unwrap(),
      fs::read(ws.build_root().join(source)).unwrap(),
      "content mismatch for {target}"
    );
  }
  assert!(out.join(".deploy/web.yml").exists());
}

#[test]
fn dev_build_ignores_release_id() {
  let ws = Workspace::new();
  ws.write_source("web.yml", "rel_num: 2.0\nfiles: []\n");

  let archive = ws.build("web", BuildKind::Dev);
  assert_eq!(archive.file_name().unwrap(), "web.tgz");
}

#[test]
fn missing_manifest_fails() {
  let ws = Workspace::new();
  let err = build(&BuildRequest {
    name: "web".to_string(),
    build_root: ws.build_root(),
    output_dir: ws.dist(),
    kind: BuildKind::Dev,
  })
  .unwrap_err();
  assert!(matches!(err, ArchiveError::Manifest(_)));
}

#[test]
fn release_id_with_dash_is_refused() {
  let ws = Workspace::new();
  ws.write_source("web.yml", "rel_num: 1.4-rc1\nfiles: []\n");

  let err = build(&BuildRequest {
    name: "web".to_string(),
    build_root: ws.build_root(),
    output_dir: ws.dist(),
    kind: BuildKind::Release,
  })
  .unwrap_err();

  assert!(matches!(err, ArchiveError::Manifest(ManifestError::Schema { .. })), "got {err:?}");
  assert_eq!(fs::read_dir(ws.dist()).unwrap().count(), 0);
}
