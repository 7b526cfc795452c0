use crate::storage::Ledger;

/// What to do with one scanned file, given its fresh content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Ledger already holds this hash for this filename.
    Unchanged,
    /// Another active record owns this content; never encrypt it twice.
    DuplicateContent,
    /// Tracked filename whose content now hashes differently.
    ContentChanged,
    /// Untracked filename with untracked content.
    New,
}

impl Classification {
    pub fn needs_encryption(self) -> bool {
        matches!(self, Self::ContentChanged | Self::New)
    }

    pub fn is_update(self) -> bool {
        self == Self::ContentChanged
    }
}

/// Content identity is checked before path identity: a file whose bytes are
/// already tracked under any active filename is a duplicate even if its own
/// path is tracked too.
pub fn classify(ledger: &Ledger, filename: &str, hash: &str) -> rusqlite::Result<Classification> {
    if ledger.get_hash(filename)?.as_deref() == Some(hash) {
        return Ok(Classification::Unchanged);
    }
    // The filename's own row cannot match here, so a hit is always another file.
    if ledger.has_hash(hash)? {
        return Ok(Classification::DuplicateContent);
    }
    if ledger.has_filename(filename)? {
        return Ok(Classification::ContentChanged);
    }
    Ok(Classification::New)
}
