pub mod entry;
pub mod store;

pub use entry::{format_size, FileEntry, FileStatus};
pub use store::{FileRegistry, RegistryEvent};
