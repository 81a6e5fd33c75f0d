use serde::Serialize;
use tasksync_frame::{MagicClass, MagicEntry, ProtocolRegistry};

use crate::cmd::{ClassArg, MagicsArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{new_table, print_json, OutputFormat};

#[derive(Debug, Serialize)]
struct MagicRow {
    magic: &'static str,
    value: String,
    class: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub_protocol: Option<&'static str>,
    shape: &'static str,
    wire_size: usize,
    payload: &'static str,
    states: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    responses: Vec<&'static str>,
}

impl From<&MagicEntry> for MagicRow {
    fn from(entry: &MagicEntry) -> Self {
        Self {
            magic: entry.magic.name(),
            value: format!("0x{:02x}", entry.magic.as_u8()),
            class: entry.class.name(),
            sub_protocol: entry.sub_protocol.map(|sub| sub.name()),
            shape: entry.shape().name(),
            wire_size: entry.shape().wire_size(),
            payload: entry.payload.name(),
            states: entry.states.describe(),
            responses: entry.responses.iter().map(|magic| magic.name()).collect(),
        }
    }
}

pub fn run(args: MagicsArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = ProtocolRegistry::new();
    let rows = rows(&registry, args.class);

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut table = new_table(vec![
                "MAGIC",
                "VALUE",
                "CLASS",
                "SUB-PROTOCOL",
                "SHAPE",
                "PAYLOAD",
                "STATES",
                "RESPONSES",
            ]);
            for row in &rows {
                table.add_row(vec![
                    row.magic.to_string(),
                    row.value.clone(),
                    row.class.to_string(),
                    row.sub_protocol.unwrap_or("-").to_string(),
                    format!("{} ({})", row.shape, row.wire_size),
                    row.payload.to_string(),
                    row.states.clone(),
                    row.responses.join(","),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                let mut line = format!("{} {} {}", row.value, row.magic, row.class);
                if let Some(sub) = row.sub_protocol {
                    line.push_str(&format!(" [{sub}]"));
                }
                if !row.responses.is_empty() {
                    line.push_str(&format!(" -> {}", row.responses.join("|")));
                }
                println!("{line}");
            }
        }
    }

    Ok(SUCCESS)
}

fn rows(registry: &ProtocolRegistry, class: Option<ClassArg>) -> Vec<MagicRow> {
    registry
        .entries()
        .filter(|entry| class.is_none_or(|class| matches_class(class, entry.class)))
        .map(MagicRow::from)
        .collect()
}

fn matches_class(arg: ClassArg, class: MagicClass) -> bool {
    matches!(
        (arg, class),
        (ClassArg::Request, MagicClass::Request)
            | (ClassArg::Response, MagicClass::Response)
            | (ClassArg::Notification, MagicClass::Notification)
    )
}
