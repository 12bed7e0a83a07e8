// cratedig Filesystem Infrastructure
// Implements FileWalker port with walkdir

pub mod walker;

pub use walker::WalkdirWalker;
