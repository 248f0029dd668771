// # Secret Store Implementations
//
// - `MemorySecretStore`: secrets held in process, for tests and embedding
// - `DirSecretStore`: one file per key under `<root>/<namespace>/<name>/`,
//   the layout of a mounted secret volume

pub mod dir;
pub mod memory;

pub use dir::DirSecretStore;
pub use memory::MemorySecretStore;
