use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use tasksync_frame::{Message, Payload, ProtocolRegistry};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Printable view of one decoded message.
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub magic: &'static str,
    pub value: String,
    pub class: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_protocol: Option<&'static str>,
    pub state: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_name: Option<&'static str>,
    pub shape: &'static str,
    pub wire_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_address: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_sectors: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadView {
    Bytes {
        size: usize,
        hex: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Words {
        size: usize,
        values: Vec<u16>,
    },
    Dwords {
        size: usize,
        values: Vec<u32>,
    },
    /// The name buffer may hold a PIN; only its length is shown.
    Pin {
        size: usize,
        field: &'static str,
        request: &'static str,
        name: String,
    },
}

impl MessageView {
    pub fn new(message: &Message, registry: &ProtocolRegistry) -> Self {
        let magic = message.magic();
        let (sector_address, num_sectors) = match message {
            Message::Dataplane(cmd) => (Some(cmd.sector_address), Some(cmd.num_sectors)),
            _ => (None, None),
        };
        Self {
            magic: magic.name(),
            value: format!("0x{:02x}", magic.as_u8()),
            class: registry.classify(magic).name(),
            sub_protocol: registry.sub_protocol(magic).map(|sub| sub.name()),
            state: message.state(),
            state_name: message.sync_state().map(|state| state.name()),
            shape: message.shape().name(),
            wire_size: message.wire_size(),
            payload: message.payload().map(PayloadView::new),
            sector_address,
            num_sectors,
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("magic", format!("{} ({})", self.magic, self.value)),
            ("class", self.class.to_string()),
        ];
        if let Some(sub) = self.sub_protocol {
            rows.push(("sub-protocol", sub.to_string()));
        }
        rows.push(("state", state_label(self.state, self.state_name)));
        rows.push(("shape", format!("{} ({} bytes)", self.shape, self.wire_size)));
        if let Some(payload) = &self.payload {
            rows.extend(payload.rows());
        }
        if let Some(address) = self.sector_address {
            rows.push(("sector address", address.to_string()));
        }
        if let Some(count) = self.num_sectors {
            rows.push(("sectors", count.to_string()));
        }
        rows
    }

    fn one_line(&self) -> String {
        let mut line = format!(
            "{} state={}",
            self.magic,
            state_label(self.state, self.state_name)
        );
        for (key, value) in self.rows() {
            if matches!(key, "magic" | "class" | "state" | "shape") {
                continue;
            }
            line.push_str(&format!(" {}={}", key.replace(' ', "_"), value));
        }
        line
    }
}

impl PayloadView {
    fn new(payload: &Payload) -> Self {
        let size = payload.encoded_len();
        match payload {
            Payload::Bytes(bytes) => PayloadView::Bytes {
                size,
                hex: hex::encode(bytes),
                text: std::str::from_utf8(bytes)
                    .ok()
                    .filter(|text| !text.is_empty() && text.chars().all(|c| !c.is_control()))
                    .map(str::to_string),
            },
            Payload::Words(values) => PayloadView::Words {
                size,
                values: values.clone(),
            },
            Payload::DWords(values) => PayloadView::Dwords {
                size,
                values: values.clone(),
            },
            Payload::Pin(req) => PayloadView::Pin {
                size,
                field: req.field.name(),
                request: req.request.name(),
                name: format!("<redacted:{} bytes>", req.name_bytes().len()),
            },
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        match self {
            PayloadView::Bytes { size, hex, text } => {
                let mut rows = vec![("size", size.to_string()), ("data", hex.clone())];
                if let Some(text) = text {
                    rows.push(("text", text.clone()));
                }
                rows
            }
            PayloadView::Words { size, values } => vec![
                ("size", size.to_string()),
                ("words", join(values)),
            ],
            PayloadView::Dwords { size, values } => vec![
                ("size", size.to_string()),
                ("dwords", join(values)),
            ],
            PayloadView::Pin {
                size,
                field,
                request,
                name,
            } => vec![
                ("size", size.to_string()),
                ("pin field", field.to_string()),
                ("pin request", request.to_string()),
                ("pin name", name.clone()),
            ],
        }
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn state_label(state: u8, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{state} ({name})"),
        None => state.to_string(),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_messages(views: &[MessageView], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            if let [single] = views {
                print_json(single);
            } else {
                print_json(&views);
            }
        }
        OutputFormat::Table => {
            for view in views {
                let mut table = new_table(vec!["FIELD", "VALUE"]);
                for (key, value) in view.rows() {
                    table.add_row(vec![key.to_string(), value]);
                }
                println!("{table}");
            }
        }
        OutputFormat::Pretty => {
            for view in views {
                println!("{}", view.one_line());
            }
        }
    }
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}
