use std::fs;
use std::sync::Arc;

use serde::Serialize;
use tasksync_frame::{Codec, ProtocolRegistry};
use tasksync_sequencer::{Direction, Sequencer, SequencerConfig};
use tracing::info;

use crate::cmd::ReplayArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{new_table, print_json, OutputFormat};

/// One captured frame line: `>` was sent by this end, `<` was received.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TraceLine {
    line: usize,
    direction: Direction,
    bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct Verdict {
    line: usize,
    direction: &'static str,
    /// Byte offset of the frame within its line.
    offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    magic: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<u8>,
    admitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    frames: usize,
    admitted: usize,
    rejected: usize,
}

#[derive(Debug, Serialize)]
struct ReplayOutput<'a> {
    trace: String,
    frames: &'a [Verdict],
    summary: &'a Summary,
}

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let text = fs::read_to_string(&args.trace)
        .map_err(|err| io_error(&format!("failed reading {}", args.trace.display()), err))?;
    let lines = parse_trace(&text)?;

    let registry = Arc::new(ProtocolRegistry::new());
    let codec = Codec::with_registry(Arc::clone(&registry));
    let mut sequencer = Sequencer::with_config(
        registry,
        SequencerConfig {
            check_states: !args.no_state_checks,
            require_auth_for_pin_modify: !args.allow_unauthenticated_modify,
        },
    );

    let verdicts = replay(&lines, &codec, &mut sequencer);
    let summary = summarize(&verdicts);
    info!(
        frames = summary.frames,
        rejected = summary.rejected,
        "replay finished"
    );

    match format {
        OutputFormat::Json => print_json(&ReplayOutput {
            trace: args.trace.display().to_string(),
            frames: &verdicts,
            summary: &summary,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["LINE", "DIR", "MAGIC", "STATE", "VERDICT"]);
            for verdict in &verdicts {
                table.add_row(vec![
                    verdict.line.to_string(),
                    arrow(verdict.direction).to_string(),
                    verdict.magic.unwrap_or("?").to_string(),
                    verdict.state.map(|s| s.to_string()).unwrap_or_default(),
                    verdict_text(verdict),
                ]);
            }
            println!("{table}");
            println!(
                "{} frames, {} admitted, {} rejected",
                summary.frames, summary.admitted, summary.rejected
            );
        }
        OutputFormat::Pretty => {
            for verdict in &verdicts {
                println!(
                    "line {} {} {}: {}",
                    verdict.line,
                    arrow(verdict.direction),
                    verdict.magic.unwrap_or("?"),
                    verdict_text(verdict)
                );
            }
        }
    }

    if summary.rejected > 0 {
        Ok(DATA_INVALID)
    } else {
        Ok(SUCCESS)
    }
}

fn parse_trace(text: &str) -> CliResult<Vec<TraceLine>> {
    let mut lines = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let (direction, rest) = if let Some(rest) = content.strip_prefix('>') {
            (Direction::Outbound, rest)
        } else if let Some(rest) = content.strip_prefix('<') {
            (Direction::Inbound, rest)
        } else {
            return Err(CliError::new(
                DATA_INVALID,
                format!("line {line}: expected '>' or '<' before the frame"),
            ));
        };
        let bytes = crate::cmd::parse_hex(rest)
            .map_err(|err| CliError::new(DATA_INVALID, format!("line {line}: {err}")))?;
        lines.push(TraceLine {
            line,
            direction,
            bytes,
        });
    }
    Ok(lines)
}

/// Decode and admit every frame in order. A line may hold several
/// back-to-back frames; a decode error ends that line.
fn replay(lines: &[TraceLine], codec: &Codec, sequencer: &mut Sequencer) -> Vec<Verdict> {
    let mut verdicts = Vec::new();
    for trace in lines {
        let mut offset = 0;
        loop {
            let verdict = match codec.decode_prefix(&trace.bytes[offset..]) {
                Ok((message, used)) => {
                    let admitted = sequencer.admit(trace.direction, &message);
                    let verdict = Verdict {
                        line: trace.line,
                        direction: trace.direction.name(),
                        offset,
                        magic: Some(message.magic().name()),
                        state: Some(message.state()),
                        admitted: admitted.is_ok(),
                        error: admitted.err().map(|err| err.to_string()),
                    };
                    offset += used;
                    verdict
                }
                Err(err) => {
                    let err = err.rebase(offset);
                    verdicts.push(Verdict {
                        line: trace.line,
                        direction: trace.direction.name(),
                        offset,
                        magic: err.magic().map(|magic| magic.name()),
                        state: None,
                        admitted: false,
                        error: Some(err.to_string()),
                    });
                    break;
                }
            };
            verdicts.push(verdict);
            if offset >= trace.bytes.len() {
                break;
            }
        }
    }
    verdicts
}

fn summarize(verdicts: &[Verdict]) -> Summary {
    let admitted = verdicts.iter().filter(|v| v.admitted).count();
    Summary {
        frames: verdicts.len(),
        admitted,
        rejected: verdicts.len() - admitted,
    }
}

fn arrow(direction: &str) -> &'static str {
    if direction == Direction::Outbound.name() {
        ">"
    } else {
        "<"
    }
}

fn verdict_text(verdict: &Verdict) -> String {
    match &verdict.error {
        Some(err) => format!("rejected: {err}"),
        None => "ok".to_string(),
    }
}
