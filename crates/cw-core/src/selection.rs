//! Selection slots and the values stored for them

use std::fmt;

/// Format name used to ask an owner for its list of formats.
pub const TARGETS: &str = "TARGETS";

/// Clipboard-manager marker; like `TARGETS` it is never stored.
pub const SAVE_TARGETS: &str = "SAVE_TARGETS";

/// Property type announcing an incremental (chunked) transfer.
pub const INCR: &str = "INCR";

/// Returns `true` for format names that are synthesized, never stored.
pub fn is_synthetic_format(name: &str) -> bool {
    name == TARGETS || name == SAVE_TARGETS
}

/// One of the two well-known selections this process keeps ownership of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Primary,
    Clipboard,
}

impl Slot {
    /// Every slot, in the order they are claimed at startup.
    pub const ALL: [Slot; 2] = [Slot::Primary, Slot::Clipboard];

    /// Atom name of the selection on the display server.
    pub fn atom_name(self) -> &'static str {
        match self {
            Slot::Primary => "PRIMARY",
            Slot::Clipboard => "CLIPBOARD",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Slot::Primary => 0,
            Slot::Clipboard => 1,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.atom_name())
    }
}

/// Unit width of a property payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropFormat {
    Bits8,
    Bits16,
    Bits32,
}

impl PropFormat {
    /// Parse the raw `format` field of a property reply.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            8 => Some(PropFormat::Bits8),
            16 => Some(PropFormat::Bits16),
            32 => Some(PropFormat::Bits32),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            PropFormat::Bits8 => 8,
            PropFormat::Bits16 => 16,
            PropFormat::Bits32 => 32,
        }
    }

    /// Size of one unit in bytes.
    pub fn unit_len(self) -> usize {
        usize::from(self.bits() / 8)
    }
}

/// Content of one format entry, exactly as an owner delivered it.
///
/// `bytes` holds the raw property payload. For 16 and 32-bit formats the
/// units are in native byte order, which is how the display server hands
/// them to clients and how it expects them back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub bytes: Vec<u8>,
    pub format: PropFormat,
    /// Atom of the property type (`UTF8_STRING`, `ATOM`, `image/png`, ...).
    pub type_atom: u32,
}

impl Value {
    pub fn new(bytes: Vec<u8>, format: PropFormat, type_atom: u32) -> Self {
        Self {
            bytes,
            format,
            type_atom,
        }
    }

    /// Build a 32-bit value from a list of atoms.
    pub fn from_atoms(atoms: &[u32], type_atom: u32) -> Self {
        let bytes = atoms.iter().flat_map(|a| a.to_ne_bytes()).collect();
        Self::new(bytes, PropFormat::Bits32, type_atom)
    }

    /// Decode a 32-bit payload into its units. Returns `None` for other
    /// formats.
    pub fn as_u32s(&self) -> Option<Vec<u32>> {
        if self.format != PropFormat::Bits32 {
            return None;
        }
        Some(
            self.bytes
                .chunks_exact(4)
                .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// Number of format units in the payload.
    pub fn unit_count(&self) -> usize {
        self.bytes.len() / self.format.unit_len()
    }
}
