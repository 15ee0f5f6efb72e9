mod command;
mod encryption;
mod file_exclusion;
mod loop_manager;
mod password;
mod restore_repository;
mod target;
mod zfs;

pub use command::SystemCommandRunner;
pub use encryption::KeyStashEncryptionService;
pub use file_exclusion::GlobFileExclusion;
pub use loop_manager::LosetupLoopManager;
pub use password::RandomPasswordGenerator;
pub use restore_repository::FileSystemRestoreRepository;
pub use target::TargetcliService;
pub use zfs::ZfsCloneManager;
