//! Append-only JSON-lines journal
//!
//! Backing format for the baseline log and the run ledger:
//! - One entry per line: `<crc32 hex>\t<compact JSON>\n`
//! - Appends are flushed and synced before returning
//! - Entries are never rewritten in place
//! - On open, a torn final line (crash mid-append) is truncated away;
//!   a bad checksum anywhere else is corruption and refuses to open

mod checksum;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use checksum::{compute_checksum, verify_checksum};

/// Entries recovered from an existing journal file.
#[derive(Debug)]
pub struct Replay<T> {
    pub entries: Vec<T>,
    /// A partial trailing line was found and dropped
    pub torn_tail: bool,
}

#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Opens (or creates) a journal, replaying its entries.
    pub fn open<T: DeserializeOwned>(path: impl AsRef<Path>) -> io::Result<(Self, Replay<T>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let (replay, valid_len) = if path.exists() {
            scan(&path)?
        } else {
            (
                Replay {
                    entries: Vec::new(),
                    torn_tail: false,
                },
                0,
            )
        };

        if replay.torn_tail {
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok((
            Self {
                path,
                file: Mutex::new(file),
            },
            replay,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and syncs it to disk.
    ///
    /// An entry whose JSON would not decode back (a non-finite float written
    /// as `null` into an `f64`, say) is refused with `InvalidData`, since a
    /// later replay would treat it as corruption.
    pub fn append<T: Serialize + DeserializeOwned>(&self, entry: &T) -> io::Result<()> {
        let payload = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        serde_json::from_str::<T>(&payload).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry would not replay from {}: {}", self.path.display(), e),
            )
        })?;
        let line = format!("{:08x}\t{}\n", compute_checksum(payload.as_bytes()), payload);

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_data()
    }

    /// Reads every entry of a journal without opening it for append.
    pub fn read_all<T: DeserializeOwned>(path: impl AsRef<Path>) -> io::Result<Replay<T>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Replay {
                entries: Vec::new(),
                torn_tail: false,
            });
        }
        scan(path).map(|(replay, _)| replay)
    }
}

/// Parses the journal, returning entries and the byte length of the valid
/// prefix.
fn scan<T: DeserializeOwned>(path: &Path) -> io::Result<(Replay<T>, u64)> {
    let content = std::fs::read(path)?;
    let mut entries = Vec::new();
    let mut offset = 0usize;
    let mut torn_tail = false;

    while offset < content.len() {
        let rest = &content[offset..];
        let (line, consumed, terminated) = match rest.iter().position(|b| *b == b'\n') {
            Some(end) => (&rest[..end], end + 1, true),
            None => (rest, rest.len(), false),
        };
        let is_last = offset + consumed >= content.len();

        match decode_line(line) {
            Some(entry) if terminated => {
                entries.push(entry);
                offset += consumed;
            }
            _ if is_last => {
                torn_tail = true;
                break;
            }
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "corrupt journal entry at byte {} in {}",
                        offset,
                        path.display()
                    ),
                ));
            }
        }
    }

    Ok((Replay { entries, torn_tail }, offset as u64))
}

fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Option<T> {
    let tab = line.iter().position(|b| *b == b'\t')?;
    let checksum = std::str::from_utf8(&line[..tab]).ok()?;
    let checksum = u32::from_str_radix(checksum, 16).ok()?;
    let payload = &line[tab + 1..];
    if !verify_checksum(payload, checksum) {
        return None;
    }
    serde_json::from_slice(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        n: u32,
        note: String,
    }

    fn entry(n: u32) -> Entry {
        Entry {
            n,
            note: format!("line\n{}", n),
        }
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        let (journal, replay) = Journal::open::<Entry>(&path).unwrap();
        assert!(replay.entries.is_empty());
        journal.append(&entry(1)).unwrap();
        journal.append(&entry(2)).unwrap();
        drop(journal);

        let (_journal, replay) = Journal::open::<Entry>(&path).unwrap();
        assert_eq!(replay.entries, vec![entry(1), entry(2)]);
        assert!(!replay.torn_tail);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        let (journal, _) = Journal::open::<Entry>(&path).unwrap();
        journal.append(&entry(1)).unwrap();
        drop(journal);

        let mut raw = fs::read(&path).unwrap();
        raw.extend_from_slice(b"deadbeef\t{\"n\":2,\"no");
        fs::write(&path, &raw).unwrap();

        let (journal, replay) = Journal::open::<Entry>(&path).unwrap();
        assert_eq!(replay.entries, vec![entry(1)]);
        assert!(replay.torn_tail);

        journal.append(&entry(3)).unwrap();
        drop(journal);
        let replay = Journal::read_all::<Entry>(&path).unwrap();
        assert_eq!(replay.entries, vec![entry(1), entry(3)]);
    }

    #[test]
    fn test_corruption_in_middle_refuses_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        let (journal, _) = Journal::open::<Entry>(&path).unwrap();
        journal.append(&entry(1)).unwrap();
        journal.append(&entry(2)).unwrap();
        drop(journal);

        let text = fs::read_to_string(&path).unwrap().replacen("\"n\":1", "\"n\":9", 1);
        fs::write(&path, text).unwrap();

        let err = Journal::open::<Entry>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        x: f64,
    }

    #[test]
    fn test_entry_that_cannot_replay_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        let (journal, _) = Journal::open::<Sample>(&path).unwrap();
        journal.append(&Sample { x: 1.5 }).unwrap();
        let err = journal.append(&Sample { x: f64::INFINITY }).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        journal.append(&Sample { x: 2.5 }).unwrap();
        drop(journal);

        let (_journal, replay) = Journal::open::<Sample>(&path).unwrap();
        assert_eq!(replay.entries, vec![Sample { x: 1.5 }, Sample { x: 2.5 }]);
    }

    #[test]
    fn test_read_all_of_missing_file() {
        let dir = tempdir().unwrap();
        let replay = Journal::read_all::<Entry>(dir.path().join("absent.jsonl")).unwrap();
        assert!(replay.entries.is_empty());
    }
}
