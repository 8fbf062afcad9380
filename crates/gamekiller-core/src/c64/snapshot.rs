//! Versioned snapshot container.
//!
//! Byte layout follows the VICE snapshot format: a file header followed by
//! a flat list of named modules, each carrying its own major.minor version.
//!
//! ```text
//! header: magic[19] major minor machine[16]
//! module: name[16] major minor size:u32le payload[size - 22]
//! ```

use crate::c64::cartridge::image::AttachError;
use thiserror::Error;

pub const SNAPSHOT_MAGIC: &[u8; 19] = b"VICE Snapshot File\x1a";
pub const SNAPSHOT_VERSION_MAJOR: u8 = 2;
pub const SNAPSHOT_VERSION_MINOR: u8 = 0;

const NAME_LEN: usize = 16;
const FILE_HEADER_SIZE: usize = SNAPSHOT_MAGIC.len() + 2 + NAME_LEN;
const MODULE_HEADER_SIZE: usize = NAME_LEN + 2 + 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Not a snapshot file")]
    BadMagic,

    #[error("Snapshot truncated at offset {0}")]
    Truncated(usize),

    #[error("Snapshot module {0} not found")]
    ModuleNotFound(String),

    #[error("Read past the end of snapshot module {0}")]
    ModuleExhausted(String),

    #[error("Name longer than 16 bytes: {0}")]
    NameTooLong(String),
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("Snapshot module {0} not found")]
    ModuleNotFound(String),

    #[error("Snapshot module version {major}.{minor} does not match {expected_major}.{expected_minor}")]
    VersionMismatch {
        major: u8,
        minor: u8,
        expected_major: u8,
        expected_minor: u8,
    },

    #[error("Snapshot record too short")]
    ShortRecord,

    #[error(transparent)]
    Attach(#[from] AttachError),
}

impl From<SnapshotError> for RestoreError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::ModuleNotFound(name) => RestoreError::ModuleNotFound(name),
            _ => RestoreError::ShortRecord,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Module {
    name: String,
    major: u8,
    minor: u8,
    data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    machine: String,
    major: u8,
    minor: u8,
    modules: Vec<Module>,
}

impl Snapshot {
    pub fn new(machine: &str) -> Result<Self, SnapshotError> {
        check_name(machine)?;
        Ok(Self {
            machine: machine.to_string(),
            major: SNAPSHOT_VERSION_MAJOR,
            minor: SNAPSHOT_VERSION_MINOR,
            modules: Vec::new(),
        })
    }

    pub fn machine(&self) -> &str {
        &self.machine
    }

    pub fn version(&self) -> (u8, u8) {
        (self.major, self.minor)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name.as_str())
    }

    /// Start a module, replacing any earlier one with the same name
    pub fn module_create(
        &mut self,
        name: &str,
        major: u8,
        minor: u8,
    ) -> Result<ModuleWriter<'_>, SnapshotError> {
        check_name(name)?;
        self.modules.retain(|m| m.name != name);
        self.modules.push(Module {
            name: name.to_string(),
            major,
            minor,
            data: Vec::new(),
        });
        let idx = self.modules.len() - 1;
        Ok(ModuleWriter {
            module: &mut self.modules[idx],
        })
    }

    pub fn module_open(&self, name: &str) -> Result<ModuleReader<'_>, SnapshotError> {
        self.modules
            .iter()
            .find(|m| m.name == name)
            .map(|module| ModuleReader { module, pos: 0 })
            .ok_or_else(|| SnapshotError::ModuleNotFound(name.to_string()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let payload: usize = self
            .modules
            .iter()
            .map(|m| MODULE_HEADER_SIZE + m.data.len())
            .sum();
        let mut out = Vec::with_capacity(FILE_HEADER_SIZE + payload);

        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.push(self.major);
        out.push(self.minor);
        push_name(&mut out, &self.machine);

        for m in &self.modules {
            push_name(&mut out, &m.name);
            out.push(m.major);
            out.push(m.minor);
            let size = (MODULE_HEADER_SIZE + m.data.len()) as u32;
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&m.data);
        }
        out
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, SnapshotError> {
        if raw.len() < SNAPSHOT_MAGIC.len() || &raw[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        if raw.len() < FILE_HEADER_SIZE {
            return Err(SnapshotError::Truncated(raw.len()));
        }

        let mut pos = SNAPSHOT_MAGIC.len();
        let major = raw[pos];
        let minor = raw[pos + 1];
        pos += 2;
        let machine = read_name(&raw[pos..pos + NAME_LEN]);
        pos += NAME_LEN;

        let mut modules = Vec::new();
        while pos < raw.len() {
            if raw.len() - pos < MODULE_HEADER_SIZE {
                return Err(SnapshotError::Truncated(pos));
            }
            let name = read_name(&raw[pos..pos + NAME_LEN]);
            let mod_major = raw[pos + NAME_LEN];
            let mod_minor = raw[pos + NAME_LEN + 1];
            let size_at = pos + NAME_LEN + 2;
            let size = u32::from_le_bytes([
                raw[size_at],
                raw[size_at + 1],
                raw[size_at + 2],
                raw[size_at + 3],
            ]) as usize;

            if size < MODULE_HEADER_SIZE || size > raw.len() - pos {
                return Err(SnapshotError::Truncated(pos));
            }

            modules.push(Module {
                name,
                major: mod_major,
                minor: mod_minor,
                data: raw[pos + MODULE_HEADER_SIZE..pos + size].to_vec(),
            });
            pos += size;
        }

        Ok(Self {
            machine,
            major,
            minor,
            modules,
        })
    }
}

pub struct ModuleWriter<'a> {
    module: &'a mut Module,
}

impl ModuleWriter<'_> {
    pub fn write_u8(&mut self, value: u8) {
        self.module.data.push(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.module.data.extend_from_slice(bytes);
    }
}

pub struct ModuleReader<'a> {
    module: &'a Module,
    pos: usize,
}

impl<'a> ModuleReader<'a> {
    pub fn name(&self) -> &str {
        &self.module.name
    }

    pub fn major(&self) -> u8 {
        self.module.major
    }

    pub fn minor(&self) -> u8 {
        self.module.minor
    }

    pub fn remaining(&self) -> usize {
        self.module.data.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], SnapshotError> {
        if self.remaining() < len {
            return Err(SnapshotError::ModuleExhausted(self.module.name.clone()));
        }
        let module: &'a Module = self.module;
        let bytes = &module.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

fn check_name(name: &str) -> Result<(), SnapshotError> {
    if name.len() > NAME_LEN {
        return Err(SnapshotError::NameTooLong(name.to_string()));
    }
    Ok(())
}

fn push_name(out: &mut Vec<u8>, name: &str) {
    let mut field = [0u8; NAME_LEN];
    field[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&field);
}

fn read_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
