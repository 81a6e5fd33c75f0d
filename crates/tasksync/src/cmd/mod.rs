use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use tasksync_frame::{Magic, PinFieldType, PinRequestKind, SyncState};

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod magics;
pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the magic registry.
    Magics(MagicsArgs),
    /// Decode frames from hex or a binary file.
    Decode(DecodeArgs),
    /// Encode one message and print it as hex.
    Encode(EncodeArgs),
    /// Replay a captured exchange through the sequencer.
    Replay(ReplayArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Magics(args) => magics::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Replay(args) => replay::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct MagicsArgs {
    /// Only show magics of this class.
    #[arg(long, value_enum)]
    pub class: Option<ClassArg>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClassArg {
    Request,
    Response,
    Notification,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex (whitespace and a leading 0x are ignored).
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read raw frame bytes from a file.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// Decode every frame in the input, not just the first.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Magic name (e.g. CRYPTO_PIN_CMD) or value (e.g. 0x62).
    #[arg(long)]
    pub magic: String,
    /// State name (e.g. ASK_FOR_DATA) or raw byte value.
    #[arg(long, default_value = "0")]
    pub state: String,
    /// Raw payload bytes as hex.
    #[arg(long, conflicts_with_all = ["text", "words", "dwords", "pin_type"])]
    pub data: Option<String>,
    /// Raw payload bytes as UTF-8 text.
    #[arg(long, conflicts_with_all = ["words", "dwords", "pin_type"])]
    pub text: Option<String>,
    /// 16-bit payload values (comma-separated).
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["dwords", "pin_type"])]
    pub words: Option<Vec<u16>>,
    /// 32-bit payload values (comma-separated).
    #[arg(long, value_delimiter = ',', conflicts_with = "pin_type")]
    pub dwords: Option<Vec<u32>>,
    /// PIN request field type.
    #[arg(long, value_enum, requires = "pin_req")]
    pub pin_type: Option<PinTypeArg>,
    /// PIN request kind.
    #[arg(long, value_enum, requires = "pin_type")]
    pub pin_req: Option<PinReqArg>,
    /// PIN request name buffer contents (at most 24 bytes).
    #[arg(long, alias = "pet-name", requires = "pin_type")]
    pub pin_name: Option<String>,
    /// Data-plane sector address.
    #[arg(long, default_value = "0")]
    pub sector_address: u32,
    /// Data-plane sector count.
    #[arg(long, default_value = "0")]
    pub num_sectors: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PinTypeArg {
    UserPin,
    PetPin,
    PetName,
}

impl From<PinTypeArg> for PinFieldType {
    fn from(arg: PinTypeArg) -> Self {
        match arg {
            PinTypeArg::UserPin => PinFieldType::UserPin,
            PinTypeArg::PetPin => PinFieldType::PetPin,
            PinTypeArg::PetName => PinFieldType::PetName,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PinReqArg {
    Authenticate,
    Modify,
}

impl From<PinReqArg> for PinRequestKind {
    fn from(arg: PinReqArg) -> Self {
        match arg {
            PinReqArg::Authenticate => PinRequestKind::Authenticate,
            PinReqArg::Modify => PinRequestKind::Modify,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Trace file: one frame per line as `> HEX` (sent) or `< HEX` (received).
    pub trace: PathBuf,
    /// Do not check state bytes against the registry.
    #[arg(long)]
    pub no_state_checks: bool,
    /// Allow PIN modify requests before AUTH_STATE_PASSED.
    #[arg(long)]
    pub allow_unauthenticated_modify: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a magic given by name or by numeric value.
pub fn parse_magic(input: &str) -> CliResult<Magic> {
    if let Some(magic) = Magic::from_name(input) {
        return Ok(magic);
    }
    parse_byte(input)
        .and_then(Magic::from_u8)
        .ok_or_else(|| CliError::usage(format!("unknown magic: {input}")))
}

/// Parse a state given by sync state name or raw byte value.
pub fn parse_state(input: &str) -> CliResult<u8> {
    if let Some(state) = SyncState::from_name(input) {
        return Ok(state.as_u8());
    }
    parse_byte(input).ok_or_else(|| CliError::usage(format!("invalid state: {input}")))
}

/// Decode hex, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    hex::decode(digits).map_err(|err| CliError::usage(format!("invalid hex: {err}")))
}

fn parse_byte(input: &str) -> Option<u8> {
    let input = input.trim();
    match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => input.parse().ok(),
    }
}
