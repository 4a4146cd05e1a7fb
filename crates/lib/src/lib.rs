//! opkg-lib: Core types and logic for opkg
//!
//! This crate provides the building blocks of the package build-and-deploy engine:
//! - `Manifest`: the YAML package descriptor, validated into typed sections
//! - `archive`: staging a package's file set into a `.tgz` and unpacking it again
//! - `template`: `{{ NAME }}` variable resolution and literal token replacement
//! - `Ledger`: latest/previous install records used for idempotency and rollback
//! - `deploy`: the ordered deployment phases for a single package
//! - `DeploySession`: run-scoped state shared by all packages of one invocation

pub mod archive;
pub mod config;
pub mod consts;
pub mod deploy;
pub mod ledger;
pub mod lock;
pub mod manifest;
pub mod package;
pub mod platform;
pub mod session;
pub mod template;
pub mod util;
