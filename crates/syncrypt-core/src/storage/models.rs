/// A tracked source file and the digest its artifact was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    pub content_hash: String,
    pub last_updated: String,
    pub deleted: bool,
}
