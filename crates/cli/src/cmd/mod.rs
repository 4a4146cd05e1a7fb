mod create;
mod deploy;
mod ls;

pub use create::cmd_create;
pub use deploy::cmd_deploy;
pub use ls::cmd_ls;
