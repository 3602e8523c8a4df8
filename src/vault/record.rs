use crate::chat::client::ChatMessage;
use crate::vault::attachments::DownloadOutcome;
use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset, Utc};

/// Column order is fixed and doubles as the archive header row.
pub const HEADER_LINE: &str =
    "Time\tUser\tMessage\tEmbed\tAttachments\tFailedAttachments\tLastEdited\tPinned\tTts\tId";

const DATETIME_FMT: &str = "%Y-%m-%d %I:%M:%S %p %:z";
const FIELD_COUNT: usize = 10;

/// One archived chat message, exactly one line in the archive file.
///
/// Every field is already rendered to its on-disk string form except `id`,
/// which stays numeric because it is the resume anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub time: String,
    pub user: String,
    pub message: String,
    pub embed: String,
    pub attachments: String,
    pub failed_attachments: String,
    pub last_edited: String,
    pub pinned: String,
    pub tts: String,
    pub id: u64,
}

/// Parse a `[+|-]hh:mm` display offset. A leading `+` is stripped before
/// use; the bare form means east of UTC.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let trimmed = raw.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (hh, mm) = rest
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid UTC offset `{raw}`: expected [+|-]hh:mm"))?;
    if hh.len() != 2 || mm.len() != 2 {
        return Err(anyhow!("invalid UTC offset `{raw}`: expected [+|-]hh:mm"));
    }
    let hours: i32 = hh
        .parse()
        .map_err(|_| anyhow!("invalid UTC offset hours in `{raw}`"))?;
    let minutes: i32 = mm
        .parse()
        .map_err(|_| anyhow!("invalid UTC offset minutes in `{raw}`"))?;
    if hours > 23 || minutes > 59 {
        return Err(anyhow!("UTC offset `{raw}` out of range"));
    }

    let mut secs = hours * 3600 + minutes * 60;
    if negative {
        secs = -secs;
    }
    FixedOffset::east_opt(secs).ok_or_else(|| anyhow!("UTC offset `{raw}` out of range"))
}

/// Render an instant at the configured display offset, empty when absent.
pub fn format_instant(time: Option<DateTime<Utc>>, offset: FixedOffset) -> String {
    match time {
        Some(t) => t.with_timezone(&offset).format(DATETIME_FMT).to_string(),
        None => String::new(),
    }
}

fn render_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn escape_field(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_field(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(anyhow!("unknown escape `\\{other}` in record field")),
            None => return Err(anyhow!("dangling escape at end of record field")),
        }
    }
    Ok(out)
}

impl MessageRecord {
    /// Fold a fetched message and its attachment outcome into a record.
    pub fn from_message(
        message: &ChatMessage,
        attachments: &DownloadOutcome,
        offset: FixedOffset,
    ) -> Result<Self> {
        Ok(Self {
            time: format_instant(Some(message.timestamp), offset),
            user: message.author_tag(),
            message: message.content.clone(),
            embed: serde_json::to_string(&message.embeds)?,
            attachments: serde_json::to_string(&attachments.success)?,
            failed_attachments: serde_json::to_string(&attachments.failed)?,
            last_edited: format_instant(message.edited_timestamp, offset),
            pinned: render_bool(message.pinned).to_string(),
            tts: render_bool(message.tts).to_string(),
            id: message.id,
        })
    }

    /// Encode as one archive line, without the trailing newline.
    pub fn encode_line(&self) -> String {
        [
            escape_field(&self.time),
            escape_field(&self.user),
            escape_field(&self.message),
            escape_field(&self.embed),
            escape_field(&self.attachments),
            escape_field(&self.failed_attachments),
            escape_field(&self.last_edited),
            escape_field(&self.pinned),
            escape_field(&self.tts),
            self.id.to_string(),
        ]
        .join("\t")
    }

    /// Decode one archive line. Rejects anything that is not exactly the
    /// ten expected columns with a parsable id.
    pub fn decode_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != FIELD_COUNT {
            return Err(anyhow!(
                "malformed record: expected {FIELD_COUNT} columns, found {}",
                fields.len()
            ));
        }

        let id: u64 = fields[9]
            .trim()
            .parse()
            .map_err(|_| anyhow!("malformed record: id `{}` is not a u64", fields[9]))?;

        Ok(Self {
            time: unescape_field(fields[0])?,
            user: unescape_field(fields[1])?,
            message: unescape_field(fields[2])?,
            embed: unescape_field(fields[3])?,
            attachments: unescape_field(fields[4])?,
            failed_attachments: unescape_field(fields[5])?,
            last_edited: unescape_field(fields[6])?,
            pinned: unescape_field(fields[7])?,
            tts: unescape_field(fields[8])?,
            id,
        })
    }
}
