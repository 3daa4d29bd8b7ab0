//! SOME/IP-TP engine (C4): segments outbound payloads above the MTU
//! threshold and reassembles inbound segments, order-agnostically, keyed by
//! (service, method, client, session).

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::wire::{Error, TpHeader};

/// One outbound chunk: its byte offset, whether more follow, and its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpSegment {
    pub offset: u32,
    pub more_segments: bool,
    pub data: Vec<u8>,
}

impl TpSegment {
    pub fn header(&self) -> TpHeader {
        TpHeader {
            offset: self.offset,
            more_segments: self.more_segments,
        }
    }
}

/// Splits `payload` into TP segments whose non-terminal chunks are the
/// largest multiple of 16 bytes that fits under `threshold`. `payload` must
/// be larger than `threshold`; smaller payloads don't need TP at all and
/// callers should not invoke this for them.
pub fn segment(payload: &[u8], threshold: usize) -> Vec<TpSegment> {
    let chunk_size = (threshold / 16) * 16;
    assert!(chunk_size > 0, "TP threshold must be at least 16 bytes");

    let mut segments = Vec::with_capacity(payload.len().div_ceil(chunk_size));
    let mut offset = 0usize;
    while offset < payload.len() {
        let end = (offset + chunk_size).min(payload.len());
        let more_segments = end < payload.len();
        segments.push(TpSegment {
            offset: offset as u32,
            more_segments,
            data: payload[offset..end].to_vec(),
        });
        offset = end;
    }
    segments
}

/// The key under which inbound segments for a single logical payload are
/// grouped: one session on one method never shares TP state with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssemblyKey {
    pub service_id: u16,
    pub method_id: u16,
    pub client_id: u16,
    pub session_id: u16,
}

struct Assembly {
    segments: BTreeMap<u32, Vec<u8>>,
    final_length: Option<u32>,
    first_seen: Instant,
}

impl Assembly {
    fn new() -> Self {
        Self {
            segments: BTreeMap::new(),
            final_length: None,
            first_seen: Instant::now(),
        }
    }

    /// Inserts a segment. Returns `Ok(Some(payload))` once the assembly is
    /// complete (and removes it from the map — the caller drops the entry).
    fn insert(&mut self, offset: u32, more_segments: bool, data: Vec<u8>) -> Result<bool, Error> {
        if let Some(existing) = self.segments.get(&offset) {
            if *existing != data {
                return Err(Error::MalformedTp);
            }
        } else {
            for (&other_offset, other_data) in &self.segments {
                let this_range = offset..offset + data.len() as u32;
                let other_range = other_offset..other_offset + other_data.len() as u32;
                if ranges_overlap(&this_range, &other_range) {
                    let overlap_start = this_range.start.max(other_range.start);
                    let overlap_end = this_range.end.min(other_range.end);
                    let this_slice = &data[(overlap_start - offset) as usize..(overlap_end - offset) as usize];
                    let other_slice =
                        &other_data[(overlap_start - other_offset) as usize..(overlap_end - other_offset) as usize];
                    if this_slice != other_slice {
                        return Err(Error::MalformedTp);
                    }
                }
            }
        }

        if !more_segments {
            let final_length = offset + data.len() as u32;
            if let Some(existing) = self.final_length {
                if existing != final_length {
                    return Err(Error::MalformedTp);
                }
            }
            self.final_length = Some(final_length);
        }
        self.segments.insert(offset, data);
        Ok(self.is_complete())
    }

    fn is_complete(&self) -> bool {
        let Some(final_length) = self.final_length else {
            return false;
        };
        let mut expected = 0u32;
        for (&offset, data) in &self.segments {
            if offset != expected {
                return false;
            }
            expected += data.len() as u32;
        }
        expected == final_length
    }

    fn into_payload(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.final_length.unwrap_or(0) as usize);
        for (_, data) in self.segments {
            out.extend_from_slice(&data);
        }
        out
    }
}

fn ranges_overlap(a: &std::ops::Range<u32>, b: &std::ops::Range<u32>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Reassembles inbound TP segments, order-agnostically, and garbage-collects
/// assemblies that never complete within the configured timeout.
pub struct Reassembler {
    timeout: Duration,
    assemblies: Mutex<HashMap<AssemblyKey, Assembly>>,
}

impl Reassembler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            assemblies: Mutex::new(HashMap::new()),
        }
    }

    /// Feeds one inbound segment. Returns the fully reassembled payload once
    /// the final segment (`more_segments = false`) has arrived and every
    /// byte in `[0, final_length)` is covered with no gaps.
    pub fn insert(
        &self,
        key: AssemblyKey,
        offset: u32,
        more_segments: bool,
        data: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let mut assemblies = self.assemblies.lock().unwrap();
        let assembly = assemblies.entry(key).or_insert_with(Assembly::new);
        let complete = assembly.insert(offset, more_segments, data)?;
        if complete {
            let assembly = assemblies.remove(&key).unwrap();
            Ok(Some(assembly.into_payload()))
        } else {
            Ok(None)
        }
    }

    /// Drops assemblies that have been incomplete for longer than the
    /// reassembly timeout. Call periodically from the dispatcher's poll loop.
    pub fn sweep(&self) {
        let mut assemblies = self.assemblies.lock().unwrap();
        let timeout = self.timeout;
        let before = assemblies.len();
        assemblies.retain(|_, assembly| assembly.first_seen.elapsed() < timeout);
        let dropped = before - assemblies.len();
        if dropped > 0 {
            tracing::debug!(dropped, "swept incomplete TP reassemblies past deadline");
        }
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.assemblies.lock().unwrap().len()
    }
}
