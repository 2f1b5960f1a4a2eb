//! UIDVALIDITY-keyed local mirror: directory layout, reconciliation, and persistence.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Outcome of reconciling the local store against the server's current
/// UIDVALIDITY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Local state already matches; nothing was purged.
    Unchanged,
    /// A mismatch (or a stale/missing marker) caused a purge and rewrite.
    Updated,
    /// The mailbox directory did not exist yet.
    Created,
}

/// Local fullness of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fullness {
    Absent,
    HeadersOnly,
    Full,
}

const UIDVALIDITY_FILE: &str = "uidvalidity.txt";

/// Owns all filesystem state under `root`, laid out as
/// `<root>/<account>/<mailbox>/`.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> LocalStore {
        LocalStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn mailbox_dir(&self, account: &str, mailbox: &str) -> PathBuf {
        self.root.join(account).join(mailbox)
    }

    fn message_path(&self, account: &str, mailbox: &str, uid: u32) -> PathBuf {
        self.mailbox_dir(account, mailbox).join(format!("{uid}.eml"))
    }

    /// Compare `remote_uidvalidity` with the persisted value, purging stale
    /// `.eml` files and rewriting the marker whenever they disagree.
    pub fn reconcile(
        &self,
        account: &str,
        mailbox: &str,
        remote_uidvalidity: u32,
    ) -> Result<Reconciliation> {
        let dir = self.mailbox_dir(account, mailbox);

        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| Error::Storage(format!("failed to create {}: {e}", dir.display())))?;
            write_uidvalidity_atomically(&dir, remote_uidvalidity)?;
            return Ok(Reconciliation::Created);
        }

        let marker = dir.join(UIDVALIDITY_FILE);
        let existing = fs::read_to_string(&marker).ok().and_then(|s| s.trim().parse::<u32>().ok());

        match existing {
            None => {
                purge_messages(&dir)?;
                write_uidvalidity_atomically(&dir, remote_uidvalidity)?;
                Ok(Reconciliation::Created)
            }
            Some(stored) if stored == remote_uidvalidity => Ok(Reconciliation::Unchanged),
            Some(_) => {
                purge_messages(&dir)?;
                write_uidvalidity_atomically(&dir, remote_uidvalidity)?;
                Ok(Reconciliation::Updated)
            }
        }
    }

    /// Classify the local record for `uid` by content, per the blank-line rule.
    pub fn classify(&self, uid: u32, account: &str, mailbox: &str) -> Result<Fullness> {
        let path = self.message_path(account, mailbox, uid);
        let content = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Fullness::Absent),
            Err(e) => return Err(Error::Storage(format!("failed to read {}: {e}", path.display()))),
        };
        Ok(classify_content(&content))
    }

    /// Write `content` verbatim to `<uid>.eml`, creating the mailbox
    /// directory if needed and overwriting any existing file.
    pub fn save(&self, content: &[u8], uid: u32, account: &str, mailbox: &str) -> Result<()> {
        let dir = self.mailbox_dir(account, mailbox);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("failed to create {}: {e}", dir.display())))?;
        let path = self.message_path(account, mailbox, uid);
        fs::write(&path, content)
            .map_err(|e| Error::Storage(format!("failed to write {}: {e}", path.display())))
    }
}

/// An empty file, or one with no non-empty lines at all, is absent. A file is
/// headers-only if it has a blank separator line and nothing non-empty after
/// it; otherwise, if it has a non-empty line following a blank separator,
/// it's full.
fn classify_content(content: &[u8]) -> Fullness {
    if content.is_empty() {
        return Fullness::Absent;
    }

    let text = String::from_utf8_lossy(content);
    let mut seen_blank_separator = false;
    let mut non_empty_after_separator = false;
    let mut saw_any_line = false;

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        saw_any_line = true;
        if line.is_empty() {
            seen_blank_separator = true;
            continue;
        }
        if seen_blank_separator {
            non_empty_after_separator = true;
        }
    }

    if !saw_any_line {
        return Fullness::Absent;
    }
    if non_empty_after_separator {
        Fullness::Full
    } else if seen_blank_separator {
        Fullness::HeadersOnly
    } else {
        // No blank separator at all: treat a non-empty headers-only blob
        // (e.g. a single-line literal with no trailing body) as headers-only
        // rather than full, since no body was ever observed.
        Fullness::HeadersOnly
    }
}

fn purge_messages(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::Storage(format!("failed to read {}: {e}", dir.display())))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("eml") {
            fs::remove_file(&path)
                .map_err(|e| Error::Storage(format!("failed to remove {}: {e}", path.display())))?;
        }
    }
    Ok(())
}

/// Write the UIDVALIDITY marker via write-to-temp-then-rename, so a crash
/// mid-write never leaves an empty or truncated marker in place.
fn write_uidvalidity_atomically(dir: &Path, value: u32) -> Result<()> {
    let final_path = dir.join(UIDVALIDITY_FILE);
    let tmp_path = dir.join(format!("{UIDVALIDITY_FILE}.tmp"));

    let mut tmp = fs::File::create(&tmp_path)
        .map_err(|e| Error::Storage(format!("failed to create {}: {e}", tmp_path.display())))?;
    tmp.write_all(value.to_string().as_bytes())
        .map_err(|e| Error::Storage(format!("failed to write {}: {e}", tmp_path.display())))?;
    tmp.sync_all()
        .map_err(|e| Error::Storage(format!("failed to flush {}: {e}", tmp_path.display())))?;
    drop(tmp);

    fs::rename(&tmp_path, &final_path).map_err(|e| {
        Error::Storage(format!(
            "failed to rename {} to {}: {e}",
            tmp_path.display(),
            final_path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reconcile_creates_fresh_mailbox_directory() {
        let root = tempdir().unwrap();
        let store = LocalStore::new(root.path());
        let result = store.reconcile("alice", "INBOX", 111).unwrap();
        assert_eq!(result, Reconciliation::Created);
        let marker = root.path().join("alice/INBOX/uidvalidity.txt");
        assert_eq!(fs::read_to_string(marker).unwrap(), "111");
    }

    #[test]
    fn reconcile_is_unchanged_when_uidvalidity_matches() {
        let root = tempdir().unwrap();
        let store = LocalStore::new(root.path());
        store.reconcile("alice", "INBOX", 111).unwrap();
        let result = store.reconcile("alice", "INBOX", 111).unwrap();
        assert_eq!(result, Reconciliation::Unchanged);
    }

    #[test]
    fn reconcile_purges_stale_messages_on_uidvalidity_change() {
        let root = tempdir().unwrap();
        let store = LocalStore::new(root.path());
        store.reconcile("alice", "INBOX", 111).unwrap();
        store.save(b"Subject: hi\r\n\r\nbody", 5, "alice", "INBOX").unwrap();

        let result = store.reconcile("alice", "INBOX", 222).unwrap();
        assert_eq!(result, Reconciliation::Updated);
        assert_eq!(
            store.classify(5, "alice", "INBOX").unwrap(),
            Fullness::Absent
        );
        let marker = root.path().join("alice/INBOX/uidvalidity.txt");
        assert_eq!(fs::read_to_string(marker).unwrap(), "222");
    }

    #[test]
    fn reconcile_treats_missing_marker_in_existing_directory_as_stale() {
        let root = tempdir().unwrap();
        let dir = root.path().join("alice/INBOX");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("3.eml"), b"leftover").unwrap();

        let store = LocalStore::new(root.path());
        let result = store.reconcile("alice", "INBOX", 111).unwrap();
        assert_eq!(result, Reconciliation::Created);
        assert!(!dir.join("3.eml").exists());
    }

    #[test]
    fn classify_distinguishes_absent_headers_only_and_full() {
        let root = tempdir().unwrap();
        let store = LocalStore::new(root.path());

        assert_eq!(
            store.classify(1, "alice", "INBOX").unwrap(),
            Fullness::Absent
        );

        store.save(b"Subject: hi\r\n\r\n", 2, "alice", "INBOX").unwrap();
        assert_eq!(
            store.classify(2, "alice", "INBOX").unwrap(),
            Fullness::HeadersOnly
        );

        store
            .save(b"Subject: hi\r\n\r\nHello World!", 3, "alice", "INBOX")
            .unwrap();
        assert_eq!(store.classify(3, "alice", "INBOX").unwrap(), Fullness::Full);
    }

    #[test]
    fn save_overwrites_headers_only_with_full_content() {
        let root = tempdir().unwrap();
        let store = LocalStore::new(root.path());
        store.save(b"Subject: hi\r\n\r\n", 9, "alice", "INBOX").unwrap();
        assert_eq!(
            store.classify(9, "alice", "INBOX").unwrap(),
            Fullness::HeadersOnly
        );
        store
            .save(b"Subject: hi\r\n\r\nbody text", 9, "alice", "INBOX")
            .unwrap();
        assert_eq!(store.classify(9, "alice", "INBOX").unwrap(), Fullness::Full);
    }
}
