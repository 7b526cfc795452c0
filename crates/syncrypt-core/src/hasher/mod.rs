pub mod blake;

pub use blake::{hash_bytes, hash_file, hash_files, ContentHash};
