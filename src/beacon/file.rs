//! On-disk record for aeon key material.
//!
//! Layout: magic, version (u16), body length (u32), then the body:
//! `validator_height`/`start`/`end` (u64), the group public key, the
//! ordered public-key-share vector, a qual bitmap over validator indices,
//! the dealing generator, and the optional private share. All integers are
//! big-endian; variable fields carry a u32 length prefix.

use super::aeon::AeonDetails;

use std::path::Path;

const MAGIC: [u8; 4] = *b"AEON";
const VERSION: u16 = 1;

#[derive(thiserror::Error, Debug)]
pub enum AeonFileError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("not an aeon details file (bad magic)")]
    BadMagic,
    #[error("unsupported aeon details file version {0}")]
    UnsupportedVersion(u16),
    #[error("aeon details file is truncated")]
    Truncated,
    #[error("aeon details file has trailing bytes")]
    TrailingBytes,
}

/// Deserialized aeon record, still unbound to a validator set.
///
/// Binding (and invariant checking) happens in
/// [`AeonDetails::from_file`](super::AeonDetails::from_file).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AeonDetailsFile {
    pub validator_height: u64,
    pub start: u64,
    pub end: u64,
    pub group_public_key: Vec<u8>,
    pub public_key_shares: Vec<Vec<u8>>,
    pub qual: Vec<u32>,
    pub generator: Vec<u8>,
    pub private_share: Option<(u32, Vec<u8>)>,
}

impl AeonDetailsFile {
    pub fn from_aeon(aeon: &AeonDetails) -> Self {
        let exec = aeon.exec_unit();
        Self {
            validator_height: aeon.validator_height(),
            start: aeon.start(),
            end: aeon.end(),
            group_public_key: exec.group_public_key().to_bytes().to_vec(),
            public_key_shares: exec
                .public_key_shares()
                .iter()
                .map(|pk| pk.to_bytes().to_vec())
                .collect(),
            qual: exec.qual().to_vec(),
            generator: exec.generator().to_vec(),
            private_share: exec
                .private_key()
                .map(|scalar| (exec.dkg_index().expect("private share has an index"), scalar.to_vec())),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), AeonFileError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.encode())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, AeonFileError> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.validator_height.to_be_bytes());
        body.extend_from_slice(&self.start.to_be_bytes());
        body.extend_from_slice(&self.end.to_be_bytes());

        write_framed(&mut body, &self.group_public_key);

        body.extend_from_slice(&(self.public_key_shares.len() as u32).to_be_bytes());
        for share in &self.public_key_shares {
            write_framed(&mut body, share);
        }

        let bits = self.public_key_shares.len() as u32;
        body.extend_from_slice(&bits.to_be_bytes());
        let mut bitmap = vec![0u8; bits.div_ceil(8) as usize];
        for &index in &self.qual {
            if index < bits {
                bitmap[index as usize / 8] |= 1 << (index % 8);
            }
        }
        body.extend_from_slice(&bitmap);

        write_framed(&mut body, &self.generator);

        match &self.private_share {
            Some((index, scalar)) => {
                body.push(1);
                body.extend_from_slice(&index.to_be_bytes());
                write_framed(&mut body, scalar);
            }
            None => body.push(0),
        }

        let mut out = Vec::with_capacity(10 + body.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, AeonFileError> {
        let mut r = Reader { buf: bytes, pos: 0 };
        if r.take(4)? != MAGIC.as_slice() {
            return Err(AeonFileError::BadMagic);
        }
        let version = r.read_u16()?;
        if version != VERSION {
            return Err(AeonFileError::UnsupportedVersion(version));
        }
        let body_len = r.read_u32()? as usize;
        if r.remaining() != body_len {
            return Err(if r.remaining() < body_len {
                AeonFileError::Truncated
            } else {
                AeonFileError::TrailingBytes
            });
        }

        let validator_height = r.read_u64()?;
        let start = r.read_u64()?;
        let end = r.read_u64()?;
        let group_public_key = r.read_framed()?.to_vec();

        let share_count = r.read_u32()? as usize;
        let mut public_key_shares = Vec::with_capacity(share_count.min(1024));
        for _ in 0..share_count {
            public_key_shares.push(r.read_framed()?.to_vec());
        }

        let bits = r.read_u32()?;
        let bitmap = r.take(bits.div_ceil(8) as usize)?;
        let qual = (0..bits)
            .filter(|index| bitmap[*index as usize / 8] & (1 << (index % 8)) != 0)
            .collect();

        let generator = r.read_framed()?.to_vec();

        let private_share = match r.read_u8()? {
            0 => None,
            _ => {
                let index = r.read_u32()?;
                let scalar = r.read_framed()?.to_vec();
                Some((index, scalar))
            }
        };

        if r.remaining() != 0 {
            return Err(AeonFileError::TrailingBytes);
        }

        Ok(Self {
            validator_height,
            start,
            end,
            group_public_key,
            public_key_shares,
            qual,
            generator,
            private_share,
        })
    }
}

fn write_framed(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u32).to_be_bytes());
    out.extend_from_slice(field);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], AeonFileError> {
        if self.remaining() < n {
            return Err(AeonFileError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, AeonFileError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, AeonFileError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32, AeonFileError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64, AeonFileError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_framed(&mut self) -> Result<&'a [u8], AeonFileError> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }
}
