pub mod image;
pub mod process_control;
pub mod startup_self_check;
pub mod toolkit;
pub mod video;
pub mod workdir;
