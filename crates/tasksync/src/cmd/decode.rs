use std::fs;

use tasksync_frame::{Codec, DecodeError, Message};
use tracing::debug;

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{decode_error, io_error, CliError, CliResult, SUCCESS};
use crate::output::{print_messages, MessageView, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = read_input(&args)?;
    let codec = Codec::new();

    let messages = if args.all {
        decode_all(&codec, &bytes).map_err(|err| decode_error("decode failed", err))?
    } else {
        let (message, used) = codec
            .decode_prefix(&bytes)
            .map_err(|err| decode_error("decode failed", err))?;
        if used < bytes.len() {
            debug!(trailing = bytes.len() - used, "ignoring bytes after first frame");
        }
        vec![message]
    };

    let views: Vec<MessageView> = messages
        .iter()
        .map(|message| MessageView::new(message, codec.registry()))
        .collect();
    print_messages(&views, format);
    Ok(SUCCESS)
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    match &args.hex {
        Some(hex) => parse_hex(hex),
        None => Err(CliError::usage("either HEX or --file is required")),
    }
}

/// Decode back-to-back frames until the input is used up.
///
/// Any error aborts; its offset is relative to the start of the input.
fn decode_all(codec: &Codec, bytes: &[u8]) -> Result<Vec<Message>, DecodeError> {
    let mut messages = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let (message, used) = codec
            .decode_prefix(&bytes[offset..])
            .map_err(|err| err.rebase(offset))?;
        messages.push(message);
        offset += used;
    }
    Ok(messages)
}
