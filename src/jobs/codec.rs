//! codec.rs
//! Wire format for JobLists.
//!
//! Layout (little-endian):
//! ```text
//! u32 count
//! repeated count times:
//!     u8  kind tag
//!     f64 creation time (ms)
//!     ... kind-specific payload
//! ```
//! Strings are a `u32` byte length followed by UTF-8. Booleans are one byte.
//! Decoding is all-or-nothing: any error discards the whole batch.

use crate::error::DecodeError;
use crate::jobs::job::{BehaviourJob, Job, JobKind, MotionJob, VisionJob};

const TAG_WALK: u8 = 0x01;
const TAG_HEAD: u8 = 0x02;
const TAG_FREEZE: u8 = 0x03;
const TAG_SAVE_IMAGES: u8 = 0x10;
const TAG_SELECT_BEHAVIOUR: u8 = 0x20;
const TAG_SET_PLAYER: u8 = 0x21;

/// Smallest possible encoded job: tag + timestamp.
const MIN_JOB_SIZE: usize = 1 + 8;

pub fn encode_jobs(jobs: &[Job]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + jobs.len() * 24);
    encode_jobs_into(jobs, &mut out);
    out
}

pub fn encode_jobs_into(jobs: &[Job], out: &mut Vec<u8>) {
    out.extend_from_slice(&(jobs.len() as u32).to_le_bytes());
    for job in jobs {
        encode_job(job, out);
    }
}

fn encode_job(job: &Job, out: &mut Vec<u8>) {
    let tag = match job.kind() {
        JobKind::Motion(MotionJob::Walk { .. }) => TAG_WALK,
        JobKind::Motion(MotionJob::Head { .. }) => TAG_HEAD,
        JobKind::Motion(MotionJob::Freeze) => TAG_FREEZE,
        JobKind::Vision(VisionJob::SaveImages { .. }) => TAG_SAVE_IMAGES,
        JobKind::Behaviour(BehaviourJob::SelectBehaviour { .. }) => TAG_SELECT_BEHAVIOUR,
        JobKind::Behaviour(BehaviourJob::SetPlayer { .. }) => TAG_SET_PLAYER,
    };
    out.push(tag);
    out.extend_from_slice(&job.created_ms().to_le_bytes());

    match job.kind() {
        JobKind::Motion(MotionJob::Walk {
            forward,
            side,
            turn,
        }) => {
            put_f32(out, *forward);
            put_f32(out, *side);
            put_f32(out, *turn);
        }
        JobKind::Motion(MotionJob::Head { pitch, yaw }) => {
            put_f32(out, *pitch);
            put_f32(out, *yaw);
        }
        JobKind::Motion(MotionJob::Freeze) => {}
        JobKind::Vision(VisionJob::SaveImages {
            save,
            variable_settings,
            filename_stem,
        }) => {
            out.push(*save as u8);
            out.push(*variable_settings as u8);
            put_str(out, filename_stem);
        }
        JobKind::Behaviour(BehaviourJob::SelectBehaviour { name }) => put_str(out, name),
        JobKind::Behaviour(BehaviourJob::SetPlayer { number }) => out.push(*number),
    }
}

pub fn decode_jobs(bytes: &[u8]) -> Result<Vec<Job>, DecodeError> {
    let mut reader = ByteReader::new(bytes);
    let count = reader.u32()? as usize;

    // Never trust the count for the allocation size.
    let mut jobs = Vec::with_capacity(count.min(reader.remaining() / MIN_JOB_SIZE));
    for _ in 0..count {
        jobs.push(decode_job(&mut reader)?);
    }
    reader.finish()?;
    Ok(jobs)
}

fn decode_job(reader: &mut ByteReader<'_>) -> Result<Job, DecodeError> {
    let tag = reader.u8()?;
    let created_ms = reader.f64()?;
    let kind = match tag {
        TAG_WALK => JobKind::Motion(MotionJob::Walk {
            forward: reader.f32()?,
            side: reader.f32()?,
            turn: reader.f32()?,
        }),
        TAG_HEAD => JobKind::Motion(MotionJob::Head {
            pitch: reader.f32()?,
            yaw: reader.f32()?,
        }),
        TAG_FREEZE => JobKind::Motion(MotionJob::Freeze),
        TAG_SAVE_IMAGES => JobKind::Vision(VisionJob::SaveImages {
            save: reader.bool()?,
            variable_settings: reader.bool()?,
            filename_stem: reader.string()?,
        }),
        TAG_SELECT_BEHAVIOUR => JobKind::Behaviour(BehaviourJob::SelectBehaviour {
            name: reader.string()?,
        }),
        TAG_SET_PLAYER => JobKind::Behaviour(BehaviourJob::SetPlayer {
            number: reader.u8()?,
        }),
        other => return Err(DecodeError::UnknownTag(other)),
    };
    Ok(Job::new(created_ms, kind))
}

fn put_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

/// Bounds-checked little-endian cursor shared by the packet decoders.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub(crate) fn take(&mut self, needed: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    pub(crate) fn header(&mut self) -> Result<[u8; 4], DecodeError> {
        self.array::<4>()
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.u8()? != 0)
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub(crate) fn f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    pub(crate) fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Fails if any bytes are left unread.
    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}
