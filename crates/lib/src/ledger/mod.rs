//! Install ledger.
//!
//! For every package the ledger keeps the two most recent successful
//! installations. The ledger is what makes deployments idempotent: an archive
//! whose content hash matches the latest record is already installed.
//!
//! # Storage Layout
//!
//! ```text
//! <opkg_dir>/meta/
//! └── <package>/
//!     ├── Latest.meta     # name,release_id,release_timestamp,content_hash,deploy_stamp
//!     ├── Previous.meta   # the record Latest.meta replaced
//!     └── .lock           # held while the package is being deployed
//! ```

mod storage;
mod types;

pub use storage::*;
pub use types::*;
