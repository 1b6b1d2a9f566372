pub mod files;
pub mod replicate;
pub mod shell;

pub use files::{cat_command, list_command, mkdir_command, remove_command, transfer_command};
pub use replicate::replicate_demo;
pub use shell::{run_lines, shell_command};
