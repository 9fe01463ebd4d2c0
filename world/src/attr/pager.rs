//! Hash-chained attribute store file.
//!
//! Layout: fixed header, a bucket directory of chain heads, then
//! variable-length records. Each record is `[next][key][cap][len][owner]
//! [flags][crc][payload..cap]`; live records hang off their bucket's
//! chain, reclaimed records hang off the free chain and are reused
//! first-fit. The CRC covers the used payload.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use fnv::FnvHasher;
use std::hash::Hasher;
use tracing::{debug, warn};

use common::err::{CResult, MuxError};

use super::AttrValue;
use crate::attr::AttrFlags;

const MAGIC: &[u8; 8] = b"MUXATR01";
const VERSION: u32 = 1;

const HDR_SIZE: u64 = 24;
const REC_HDR_SIZE: u64 = 36;

/// Chain terminator / empty bucket.
const NIL: u64 = 0;

#[derive(Debug, Clone, Copy)]
struct RecHdr {
    next: u64,
    key: u64,
    cap: u32,
    len: u32,
    owner: i32,
    flags: u32,
    crc: u32,
}

#[derive(Debug)]
pub struct AtrPager {
    file: File,
    bucket_count: u32,
    free_head: u64,
}

impl AtrPager {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P, bucket_count: u32) -> CResult<Self> {
        let exists = path.as_ref().exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;

        if !exists || file.metadata()?.len() == 0 {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(MAGIC)?;
            file.write_u32::<BigEndian>(VERSION)?;
            file.write_u32::<BigEndian>(bucket_count)?;
            file.write_u64::<BigEndian>(NIL)?;
            // empty directory
            let zeros = vec![0u8; bucket_count as usize * 8];
            file.write_all(&zeros)?;
            file.sync_data()?;
            debug!(path = %path.as_ref().display(), bucket_count, "attribute store created");
            return Ok(AtrPager {
                file,
                bucket_count,
                free_head: NIL,
            });
        }

        file.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(MuxError::Corrupt("attribute store: bad magic".to_string()));
        }
        let version = file.read_u32::<BigEndian>()?;
        if version != VERSION {
            return Err(MuxError::Corrupt(format!(
                "attribute store: version {} unsupported",
                version
            )));
        }
        let bucket_count = file.read_u32::<BigEndian>()?;
        if bucket_count == 0 {
            return Err(MuxError::Corrupt(
                "attribute store: zero buckets".to_string(),
            ));
        }
        let free_head = file.read_u64::<BigEndian>()?;
        Ok(AtrPager {
            file,
            bucket_count,
            free_head,
        })
    }

    fn bucket_of(&self, key: u64) -> u32 {
        let mut h = FnvHasher::default();
        h.write(&key.to_be_bytes());
        (h.finish() % self.bucket_count as u64) as u32
    }

    fn dir_offset(&self, bucket: u32) -> u64 {
        HDR_SIZE + bucket as u64 * 8
    }

    fn read_head(&mut self, bucket: u32) -> CResult<u64> {
        self.file.seek(SeekFrom::Start(self.dir_offset(bucket)))?;
        Ok(self.file.read_u64::<BigEndian>()?)
    }

    fn write_head(&mut self, bucket: u32, off: u64) -> CResult<()> {
        self.file.seek(SeekFrom::Start(self.dir_offset(bucket)))?;
        self.file.write_u64::<BigEndian>(off)?;
        Ok(())
    }

    fn persist_free_head(&mut self) -> CResult<()> {
        self.file.seek(SeekFrom::Start(16))?;
        self.file.write_u64::<BigEndian>(self.free_head)?;
        Ok(())
    }

    fn read_rec(&mut self, off: u64) -> CResult<RecHdr> {
        self.file.seek(SeekFrom::Start(off))?;
        Ok(RecHdr {
            next: self.file.read_u64::<BigEndian>()?,
            key: self.file.read_u64::<BigEndian>()?,
            cap: self.file.read_u32::<BigEndian>()?,
            len: self.file.read_u32::<BigEndian>()?,
            owner: self.file.read_i32::<BigEndian>()?,
            flags: self.file.read_u32::<BigEndian>()?,
            crc: self.file.read_u32::<BigEndian>()?,
        })
    }

    fn write_rec(&mut self, off: u64, hdr: &RecHdr) -> CResult<()> {
        self.file.seek(SeekFrom::Start(off))?;
        self.file.write_u64::<BigEndian>(hdr.next)?;
        self.file.write_u64::<BigEndian>(hdr.key)?;
        self.file.write_u32::<BigEndian>(hdr.cap)?;
        self.file.write_u32::<BigEndian>(hdr.len)?;
        self.file.write_i32::<BigEndian>(hdr.owner)?;
        self.file.write_u32::<BigEndian>(hdr.flags)?;
        self.file.write_u32::<BigEndian>(hdr.crc)?;
        Ok(())
    }

    fn read_payload(&mut self, off: u64, len: u32) -> CResult<Vec<u8>> {
        self.file.seek(SeekFrom::Start(off + REC_HDR_SIZE))?;
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_payload(&mut self, off: u64, data: &[u8]) -> CResult<()> {
        self.file.seek(SeekFrom::Start(off + REC_HDR_SIZE))?;
        self.file.write_all(data)?;
        Ok(())
    }

    pub fn fetch(&mut self, key: u64) -> CResult<Option<AttrValue>> {
        let bucket = self.bucket_of(key);
        let mut off = self.read_head(bucket)?;
        while off != NIL {
            let hdr = self.read_rec(off)?;
            if hdr.key == key {
                let data = self.read_payload(off, hdr.len)?;
                if crc32fast::hash(&data) != hdr.crc {
                    return Err(MuxError::Corrupt(format!(
                        "attribute record {:#x}: checksum mismatch",
                        key
                    )));
                }
                let text = String::from_utf8(data)?;
                return Ok(Some(AttrValue {
                    text,
                    owner: hdr.owner,
                    flags: AttrFlags::from_bits_truncate(hdr.flags),
                }));
            }
            off = hdr.next;
        }
        Ok(None)
    }

    pub fn put(&mut self, key: u64, value: &AttrValue) -> CResult<()> {
        let data = value.text.as_bytes();
        let bucket = self.bucket_of(key);
        let head = self.read_head(bucket)?;

        // In-place rewrite when the record already fits.
        let mut prev = NIL;
        let mut off = head;
        while off != NIL {
            let hdr = self.read_rec(off)?;
            if hdr.key == key {
                if hdr.cap as usize >= data.len() {
                    let new = RecHdr {
                        len: data.len() as u32,
                        owner: value.owner,
                        flags: value.flags.bits(),
                        crc: crc32fast::hash(data),
                        ..hdr
                    };
                    self.write_rec(off, &new)?;
                    self.write_payload(off, data)?;
                    return Ok(());
                }
                // Outgrown: reclaim and fall through to a fresh insert.
                self.unlink(bucket, prev, off, hdr.next)?;
                self.free_push(off, hdr.cap)?;
                break;
            }
            prev = off;
            off = hdr.next;
        }

        let head = self.read_head(bucket)?;
        let off = self.allocate(data.len() as u32)?;
        let cap = self.read_rec(off).map(|h| h.cap).unwrap_or(0);
        let hdr = RecHdr {
            next: head,
            key,
            cap: cap.max(data.len() as u32),
            len: data.len() as u32,
            owner: value.owner,
            flags: value.flags.bits(),
            crc: crc32fast::hash(data),
        };
        self.write_rec(off, &hdr)?;
        self.write_payload(off, data)?;
        self.write_head(bucket, off)?;
        Ok(())
    }

    pub fn delete(&mut self, key: u64) -> CResult<()> {
        let bucket = self.bucket_of(key);
        let mut prev = NIL;
        let mut off = self.read_head(bucket)?;
        while off != NIL {
            let hdr = self.read_rec(off)?;
            if hdr.key == key {
                self.unlink(bucket, prev, off, hdr.next)?;
                self.free_push(off, hdr.cap)?;
                return Ok(());
            }
            prev = off;
            off = hdr.next;
        }
        Ok(())
    }

    fn unlink(&mut self, bucket: u32, prev: u64, _off: u64, next: u64) -> CResult<()> {
        if prev == NIL {
            self.write_head(bucket, next)?;
        } else {
            let mut p = self.read_rec(prev)?;
            p.next = next;
            self.write_rec(prev, &p)?;
        }
        Ok(())
    }

    /// First-fit from the free chain, else append at end of file. The
    /// returned record header holds a valid `cap`.
    fn allocate(&mut self, len: u32) -> CResult<u64> {
        let mut prev = NIL;
        let mut off = self.free_head;
        while off != NIL {
            let hdr = self.read_rec(off)?;
            if hdr.cap >= len {
                if prev == NIL {
                    self.free_head = hdr.next;
                    self.persist_free_head()?;
                } else {
                    let mut p = self.read_rec(prev)?;
                    p.next = hdr.next;
                    self.write_rec(prev, &p)?;
                }
                return Ok(off);
            }
            prev = off;
            off = hdr.next;
        }

        let end = self.file.seek(SeekFrom::End(0))?;
        let hdr = RecHdr {
            next: NIL,
            key: 0,
            cap: len,
            len: 0,
            owner: -1,
            flags: 0,
            crc: 0,
        };
        self.write_rec(end, &hdr)?;
        // Reserve the payload span so later appends land past it.
        let pad = vec![0u8; len as usize];
        self.write_payload(end, &pad)?;
        Ok(end)
    }

    fn free_push(&mut self, off: u64, cap: u32) -> CResult<()> {
        let hdr = RecHdr {
            next: self.free_head,
            key: 0,
            cap,
            len: 0,
            owner: -1,
            flags: 0,
            crc: 0,
        };
        self.write_rec(off, &hdr)?;
        self.free_head = off;
        self.persist_free_head()?;
        Ok(())
    }

    /// Every live key in the store. Used to rebuild the per-object
    /// attribute lists after a load.
    pub fn all_keys(&mut self) -> CResult<Vec<u64>> {
        let mut keys = Vec::new();
        for bucket in 0..self.bucket_count {
            let mut off = self.read_head(bucket)?;
            while off != NIL {
                let hdr = self.read_rec(off)?;
                if hdr.key != 0 {
                    keys.push(hdr.key);
                } else {
                    warn!(bucket, off, "live chain holds a freed record");
                }
                off = hdr.next;
            }
        }
        Ok(keys)
    }

    pub fn sync(&mut self) -> CResult<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attr::pack_key;

    fn temp_store(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("mux-pager-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_file(&p);
        p
    }

    fn v(text: &str) -> AttrValue {
        AttrValue::new(text, 1, AttrFlags::empty())
    }

    #[test]
    fn test_put_fetch_delete() {
        let path = temp_store("basic");
        let mut pager = AtrPager::open(&path, 64).unwrap();
        let key = pack_key(3, 256);

        assert!(pager.fetch(key).unwrap().is_none());
        pager.put(key, &v("hello")).unwrap();
        assert_eq!(pager.fetch(key).unwrap().unwrap().text, "hello");

        pager.put(key, &v("hi")).unwrap();
        assert_eq!(pager.fetch(key).unwrap().unwrap().text, "hi");

        pager.delete(key).unwrap();
        assert!(pager.fetch(key).unwrap().is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_grow_moves_record() {
        let path = temp_store("grow");
        let mut pager = AtrPager::open(&path, 8).unwrap();
        let key = pack_key(1, 2);
        pager.put(key, &v("ab")).unwrap();
        pager.put(key, &v(&"x".repeat(500))).unwrap();
        assert_eq!(pager.fetch(key).unwrap().unwrap().text.len(), 500);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_free_list_reuse() {
        let path = temp_store("freelist");
        let mut pager = AtrPager::open(&path, 8).unwrap();
        let a = pack_key(1, 300);
        let b = pack_key(2, 300);
        pager.put(a, &v(&"y".repeat(100))).unwrap();
        pager.delete(a).unwrap();
        let before = pager.file.metadata().unwrap().len();
        pager.put(b, &v("short")).unwrap();
        let after = pager.file.metadata().unwrap().len();
        // The reclaimed record is big enough; the file must not grow.
        assert_eq!(before, after);
        assert_eq!(pager.fetch(b).unwrap().unwrap().text, "short");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_survives_reopen() {
        let path = temp_store("reopen");
        let key = pack_key(7, 300);
        {
            let mut pager = AtrPager::open(&path, 16).unwrap();
            pager.put(key, &v("persistent")).unwrap();
            pager.sync().unwrap();
        }
        let mut pager = AtrPager::open(&path, 16).unwrap();
        assert_eq!(pager.fetch(key).unwrap().unwrap().text, "persistent");
        assert_eq!(pager.all_keys().unwrap(), vec![key]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_chain_collisions() {
        let path = temp_store("chains");
        // One bucket forces every record onto the same chain.
        let mut pager = AtrPager::open(&path, 1).unwrap();
        for i in 0..20 {
            pager.put(pack_key(i, 300), &v(&format!("value-{}", i))).unwrap();
        }
        for i in 0..20 {
            assert_eq!(
                pager.fetch(pack_key(i, 300)).unwrap().unwrap().text,
                format!("value-{}", i)
            );
        }
        pager.delete(pack_key(10, 300)).unwrap();
        assert!(pager.fetch(pack_key(10, 300)).unwrap().is_none());
        assert_eq!(pager.all_keys().unwrap().len(), 19);
        let _ = std::fs::remove_file(&path);
    }
}
