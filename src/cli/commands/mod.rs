mod account;
mod init;

pub use account::{cmd_create_account, cmd_record_usage, cmd_show_account};
pub use init::cmd_init;
