pub const APP_NAME: &str = "opkg";

/// Directory inside every archive (and staging tree) that holds the package manifest.
pub const META_DIR: &str = ".deploy";

/// Scratch directory under the build root where archives are staged.
pub const BUILD_STAGING_DIR: &str = ".pkg";

pub const MANIFEST_EXT: &str = "yml";
pub const ARCHIVE_EXT: &str = "tgz";

/// Release label recorded for development archives.
pub const DEV_RELEASE: &str = "dev";

pub const DEFAULT_HISTORY_FILE: &str = "deploy_history.log";

// Template variables bound by every deployment session.
pub const VAR_PACKAGE_NAME: &str = "PACKAGE_NAME";
pub const VAR_RELEASE_ID: &str = "RELEASE_ID";
pub const VAR_RELEASE_TIMESTAMP: &str = "RELEASE_TIMESTAMP";
pub const VAR_ACTION: &str = "ACTION";
pub const VAR_DEPLOY_DIR: &str = "DEPLOY_DIR";
