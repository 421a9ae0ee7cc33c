//! Session command grammar.
//!
//! | Line          | Meaning                          | Reply            |
//! |---------------|----------------------------------|------------------|
//! | `FW+UPD:<n>`  | receive an `n` byte image        | OK / FAIL / ERROR|
//! | `FW+RST!`     | abort and reboot                 | none             |
//! | `FW+RAM?`     | free heap                        | `<bytes>\r\n`    |
//! | `FW+VER?`     | firmware version                 | `<version>\r\n`  |
//!
//! Only the first seven bytes select the command, trailing `\r\n` is
//! optional.

const PREFIX_LEN: usize = 7;

const UPD: &[u8] = b"FW+UPD:";
const RST: &[u8] = b"FW+RST!";
const RAM: &[u8] = b"FW+RAM?";
const VER: &[u8] = b"FW+VER?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin an update of this many bytes.  0 when the length is missing,
    /// malformed or out of range.
    Update(u32),
    Reset,
    FreeMemory,
    Version,
}

impl Command {
    /// Match a command line.  `None` for anything unrecognised.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let prefix = line.get(..PREFIX_LEN)?;
        match prefix {
            UPD => Some(Self::Update(parse_length(&line[PREFIX_LEN..]))),
            RST => Some(Self::Reset),
            RAM => Some(Self::FreeMemory),
            VER => Some(Self::Version),
            _ => None,
        }
    }
}

/// Leading decimal digits as a length; anything else yields 0.
fn parse_length(digits: &[u8]) -> u32 {
    let mut value: u32 = 0;
    let mut seen = false;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        seen = true;
        value = match value.checked_mul(10).and_then(|v| v.checked_add(u32::from(b - b'0'))) {
            Some(v) => v,
            None => return 0,
        };
    }
    if seen { value } else { 0 }
}

/// `true` if `chunk` is exactly a reset line (optionally CR/LF terminated).
pub fn is_reset_line(chunk: &[u8]) -> bool {
    chunk.len() >= PREFIX_LEN
        && &chunk[..PREFIX_LEN] == RST
        && chunk[PREFIX_LEN..].iter().all(|&b| b == b'\r' || b == b'\n')
}

/// Fixed status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Fail,
    Done,
    Error,
}

impl Response {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK\r\n",
            Self::Fail => "FAIL\r\n",
            Self::Done => "DONE\r\n",
            Self::Error => "ERROR\r\n",
        }
    }
}
