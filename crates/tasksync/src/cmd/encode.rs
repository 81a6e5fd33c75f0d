use std::sync::Arc;

use serde::Serialize;
use tasksync_frame::{
    Codec, CodecConfig, Message, Payload, PayloadKind, PinRequest, ProtocolRegistry,
};

use crate::cmd::{parse_hex, parse_magic, parse_state, EncodeArgs};
use crate::exit::{encode_error, CliError, CliResult, SUCCESS};
use crate::output::{new_table, print_json, OutputFormat};

#[derive(Debug, Serialize)]
struct EncodedFrame {
    magic: &'static str,
    state: u8,
    wire_size: usize,
    hex: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    // User input must never panic the process, even in debug builds.
    let codec = Codec::with_config(
        Arc::new(ProtocolRegistry::new()),
        CodecConfig {
            panic_on_encode_overflow: false,
        },
    );
    let message = build_message(&args, codec.registry())?;
    let wire = codec
        .encode(&message)
        .map_err(|err| encode_error("encode failed", err))?;

    let frame = EncodedFrame {
        magic: message.magic().name(),
        state: message.state(),
        wire_size: wire.len(),
        hex: hex::encode(&wire),
    };
    match format {
        OutputFormat::Json => print_json(&frame),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            table
                .add_row(vec!["magic".to_string(), frame.magic.to_string()])
                .add_row(vec!["state".to_string(), frame.state.to_string()])
                .add_row(vec!["wire size".to_string(), frame.wire_size.to_string()])
                .add_row(vec!["hex".to_string(), frame.hex.clone()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", frame.hex),
    }
    Ok(SUCCESS)
}

fn build_message(args: &EncodeArgs, registry: &ProtocolRegistry) -> CliResult<Message> {
    let magic = parse_magic(&args.magic)?;
    let state = parse_state(&args.state)?;

    // Unregistered magics and the sentinel are left for the codec to reject.
    let Some(kind) = registry.payload_kind(magic) else {
        return Ok(Message::command(magic, state));
    };

    let given = payload_flag(args);
    let mismatch = |flag: &str| {
        CliError::usage(format!(
            "{magic} takes a {kind} payload; {flag} does not apply"
        ))
    };

    match kind {
        PayloadKind::Empty => match given {
            Some(flag) => Err(mismatch(flag)),
            None => Ok(Message::command(magic, state)),
        },
        PayloadKind::Bytes => {
            let bytes = match (&args.data, &args.text, given) {
                (Some(hex), _, _) => parse_hex(hex)?,
                (None, Some(text), _) => text.as_bytes().to_vec(),
                (None, None, Some(flag)) => return Err(mismatch(flag)),
                (None, None, None) => Vec::new(),
            };
            Ok(Message::with_bytes(magic, state, bytes))
        }
        PayloadKind::Words => match (&args.words, given) {
            (Some(words), _) => Ok(Message::with_payload(
                magic,
                state,
                Payload::Words(words.clone()),
            )),
            (None, Some(flag)) => Err(mismatch(flag)),
            (None, None) => Ok(Message::with_payload(magic, state, Payload::Words(Vec::new()))),
        },
        PayloadKind::DWords => match (&args.dwords, given) {
            (Some(dwords), _) => Ok(Message::with_payload(
                magic,
                state,
                Payload::DWords(dwords.clone()),
            )),
            (None, Some(flag)) => Err(mismatch(flag)),
            (None, None) => Ok(Message::with_payload(magic, state, Payload::DWords(Vec::new()))),
        },
        PayloadKind::Pin => {
            let (Some(field), Some(request)) = (args.pin_type, args.pin_req) else {
                return Err(CliError::usage(format!(
                    "{magic} needs --pin-type and --pin-req"
                )));
            };
            let name = args.pin_name.as_deref().unwrap_or("");
            let req = PinRequest::new(field.into(), request.into(), name.as_bytes())
                .map_err(|err| encode_error("invalid PIN request", err))?;
            Ok(Message::pin(magic, state, req))
        }
        PayloadKind::Dataplane => match given {
            Some(flag) => Err(mismatch(flag)),
            None => Ok(Message::dataplane(
                magic,
                state,
                args.sector_address,
                args.num_sectors,
            )),
        },
    }
}

fn payload_flag(args: &EncodeArgs) -> Option<&'static str> {
    if args.data.is_some() {
        Some("--data")
    } else if args.text.is_some() {
        Some("--text")
    } else if args.words.is_some() {
        Some("--words")
    } else if args.dwords.is_some() {
        Some("--dwords")
    } else if args.pin_type.is_some() {
        Some("--pin-type")
    } else {
        None
    }
}
