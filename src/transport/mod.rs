/// Filesystem discovery of input shards.
pub mod fs;
