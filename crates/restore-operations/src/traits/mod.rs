mod clone_manager;
mod command_runner;
mod encryption;
mod file_exclusion;
mod loop_manager;
mod password_generator;
mod restore_repository;
mod target_service;

pub use clone_manager::CloneManager;
pub(crate) use command_runner::command_line;
pub use command_runner::{CommandOutput, CommandRunner};
pub use encryption::EncryptionService;
pub use file_exclusion::FileExclusion;
pub use loop_manager::LoopManager;
pub use password_generator::PasswordGenerator;
pub use restore_repository::RestoreRepository;
pub use target_service::TargetService;
