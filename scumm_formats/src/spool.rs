use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use log::debug;
use serde::Serialize;

use crate::chunk::{BlockLayout, Blocks, ByteReader, outer_block};
use crate::error::{FormatError, FourCc};

const TAG_SONG: FourCc = FourCc::new(b"SONG");
const TAG_SGHD: FourCc = FourCc::new(b"SGHD");
const TAG_SGEN: FourCc = FourCc::new(b"SGEN");

/// Location of one song inside a multiplexed music file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpoolEntry {
    pub id: u32,
    pub offset: u32,
    pub length: u32,
}

/// Song index parsed from the `SONG` header block.
///
/// Layout: `SONG { SGHD(u32 count) SGEN(u32 id, u32 offset, u32 length, u32 reserved)* }`
/// with absolute file offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpoolIndex {
    entries: Vec<SpoolEntry>,
    header_len: usize,
}

impl SpoolIndex {
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        let outer = outer_block(data, BlockLayout::Inclusive)?;
        if outer.tag != TAG_SONG {
            return Err(FormatError::UnexpectedTag {
                expected: TAG_SONG,
                found: outer.tag,
                offset: 0,
            });
        }

        let mut declared = None;
        let mut entries = Vec::new();
        for block in Blocks::new(outer.body, outer.body_offset, BlockLayout::Inclusive) {
            let block = block?;
            let mut reader = ByteReader::with_base(block.body, block.body_offset);
            match block.tag {
                TAG_SGHD => declared = Some(reader.read_u32_le("SGHD song count")? as usize),
                TAG_SGEN => {
                    let id = reader.read_u32_le("SGEN id")?;
                    let offset = reader.read_u32_le("SGEN offset")?;
                    let length = reader.read_u32_le("SGEN length")?;
                    entries.push(SpoolEntry { id, offset, length });
                }
                _ => {}
            }
        }

        let declared = declared.ok_or(FormatError::MissingBlock(TAG_SGHD))?;
        if declared != entries.len() {
            return Err(FormatError::InvalidField {
                field: "SGHD song count",
                value: declared as i64,
            });
        }

        Ok(SpoolIndex {
            entries,
            header_len: outer.body_offset + outer.body.len(),
        })
    }

    pub fn entries(&self) -> &[SpoolEntry] {
        &self.entries
    }

    pub fn find(&self, id: u32) -> Option<&SpoolEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Size of the index block; song data starts at or after this offset.
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Check that every entry lies inside a file of `file_len` bytes.
    pub fn validate_against(&self, file_len: u64) -> Result<(), FormatError> {
        for entry in &self.entries {
            let end = entry.offset as u64 + entry.length as u64;
            if (entry.offset as usize) < self.header_len || end > file_len {
                return Err(FormatError::Overrun {
                    tag: TAG_SGEN,
                    offset: entry.offset as usize,
                    len: entry.length as usize,
                    remaining: file_len.saturating_sub(entry.offset as u64) as usize,
                });
            }
        }
        Ok(())
    }
}

/// A music file kept open for the whole session so songs can be streamed
/// on demand.
#[derive(Debug)]
pub struct SpoolFile {
    path: PathBuf,
    file: File,
    index: SpoolIndex,
}

impl SpoolFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)
            .with_context(|| format!("opening spool file {}", path.display()))?;
        let file_len = file
            .metadata()
            .with_context(|| format!("reading metadata of {}", path.display()))?
            .len();

        let mut header = [0u8; 8];
        file.read_exact(&mut header)
            .with_context(|| format!("reading spool header of {}", path.display()))?;
        let index_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as u64;
        ensure!(
            index_len >= 8 && index_len <= file_len,
            "spool index of {} declares {} bytes in a {} byte file",
            path.display(),
            index_len,
            file_len
        );

        let mut index_bytes = vec![0u8; index_len as usize];
        file.seek(SeekFrom::Start(0))
            .context("rewinding spool file")?;
        file.read_exact(&mut index_bytes)
            .with_context(|| format!("reading spool index of {}", path.display()))?;
        let index = SpoolIndex::parse(&index_bytes)
            .with_context(|| format!("parsing spool index of {}", path.display()))?;
        index
            .validate_against(file_len)
            .with_context(|| format!("validating spool index of {}", path.display()))?;

        debug!(
            "opened spool file {} with {} songs",
            path.display(),
            index.entries().len()
        );
        Ok(SpoolFile { path, file, index })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &SpoolIndex {
        &self.index
    }

    /// Read a whole song.
    pub fn read_song(&mut self, id: u32) -> Result<Vec<u8>> {
        self.read_song_from(id, 0)
    }

    /// Read a song starting `start` bytes into its data.
    pub fn read_song_from(&mut self, id: u32, start: u32) -> Result<Vec<u8>> {
        let entry = *self.index.find(id).ok_or(FormatError::UnknownSong(id))?;
        ensure!(
            start <= entry.length,
            "start offset {} is past the end of song {} ({} bytes)",
            start,
            id,
            entry.length
        );
        let mut buf = vec![0u8; (entry.length - start) as usize];
        self.file
            .seek(SeekFrom::Start(entry.offset as u64 + start as u64))
            .with_context(|| format!("seeking to song {id}"))?;
        self.file
            .read_exact(&mut buf)
            .with_context(|| format!("reading song {id} from {}", self.path.display()))?;
        Ok(buf)
    }
}

/// Build a spool file image holding `songs` (id, data) back to back.
pub fn build_spool(songs: &[(u32, &[u8])]) -> Vec<u8> {
    use crate::chunk::push_block;

    let index_len = 8 + 12 + songs.len() * (8 + 16);
    let mut body = Vec::new();
    push_block(&mut body, b"SGHD", &(songs.len() as u32).to_le_bytes());
    let mut offset = index_len;
    for (id, data) in songs {
        let mut entry = Vec::new();
        entry.extend_from_slice(&id.to_le_bytes());
        entry.extend_from_slice(&(offset as u32).to_le_bytes());
        entry.extend_from_slice(&(data.len() as u32).to_le_bytes());
        entry.extend_from_slice(&0u32.to_le_bytes());
        push_block(&mut body, b"SGEN", &entry);
        offset += data.len();
    }

    let mut out = Vec::new();
    push_block(&mut out, b"SONG", &body);
    for (_, data) in songs {
        out.extend_from_slice(data);
    }
    out
}
