//! `label | url` button lines, one per line, packed two per row.

use std::fmt;

use url::Url;

use crate::messaging::types::{InlineButton, InlineKeyboard};

const BUTTONS_PER_ROW: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// Rows of link buttons in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ButtonRows(pub Vec<Vec<LinkButton>>);

impl ButtonRows {
    fn pack(buttons: Vec<LinkButton>) -> Self {
        Self(
            buttons
                .chunks(BUTTONS_PER_ROW)
                .map(|c| c.to_vec())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|r| r.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(Vec::len).sum()
    }

    pub fn to_keyboard(&self) -> InlineKeyboard {
        InlineKeyboard::new(
            self.0
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| InlineButton::url(b.label.clone(), b.url.clone()))
                        .collect()
                })
                .collect(),
        )
    }

    /// Inverse of `parse_lenient` for rows it can produce.
    pub fn serialize(&self) -> String {
        self.0
            .iter()
            .flatten()
            .map(|b| format!("{} | {}", b.label, b.url))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonLineProblem {
    /// Not exactly one `|`, or an empty label/url.
    Malformed,
    /// URL does not start with `http://` or `https://`.
    InvalidUrl(String),
    /// URL has a web scheme but is not a well-formed absolute URL.
    UnparsableUrl(String),
}

/// First offending line of a strictly validated spec. `line_no` is 1-based and counts
/// blank lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonLineError {
    pub line_no: usize,
    pub line: String,
    pub problem: ButtonLineProblem,
}

impl fmt::Display for ButtonLineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            ButtonLineProblem::Malformed => write!(
                f,
                "Line {} is malformed: {}\nExpected format: Button text | link\nExample: Our channel | https://t.me/channel",
                self.line_no, self.line
            ),
            ButtonLineProblem::InvalidUrl(url) => write!(
                f,
                "Line {} has an invalid URL: {}\nLinks must start with http:// or https://",
                self.line_no, url
            ),
            ButtonLineProblem::UnparsableUrl(url) => write!(
                f,
                "Line {} has a link that cannot be opened: {}\nCheck the host name and remove any spaces.",
                self.line_no, url
            ),
        }
    }
}

impl std::error::Error for ButtonLineError {}

fn split_line(line: &str) -> Option<LinkButton> {
    let (label, url) = line.split_once('|')?;
    let label = label.trim();
    let url = url.trim().trim_matches('`').trim();
    if label.is_empty() || url.is_empty() {
        return None;
    }
    Some(LinkButton {
        label: label.to_string(),
        url: url.to_string(),
    })
}

fn has_web_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn is_web_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| u.host_str().is_some_and(|h| !h.is_empty()))
}

/// Telegram rejects the whole keyboard if a single button URL does not parse.
fn is_well_formed(url: &str) -> bool {
    Url::parse(url).is_ok()
}

/// Parse a stored spec, silently dropping lines that do not split into a label and a
/// well-formed url.
pub fn parse_lenient(raw: &str) -> ButtonRows {
    ButtonRows::pack(
        raw.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(split_line)
            .filter(|b| is_well_formed(&b.url))
            .collect(),
    )
}

/// Validate every line before accepting any of them.
pub fn parse_strict(raw: &str) -> Result<ButtonRows, ButtonLineError> {
    let mut buttons = Vec::new();
    for (idx, raw_line) in raw.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fail = |problem| ButtonLineError {
            line_no: idx + 1,
            line: line.to_string(),
            problem,
        };

        if line.matches('|').count() != 1 {
            return Err(fail(ButtonLineProblem::Malformed));
        }
        let Some(button) = split_line(line) else {
            return Err(fail(ButtonLineProblem::Malformed));
        };
        if !has_web_scheme(&button.url) {
            return Err(fail(ButtonLineProblem::InvalidUrl(button.url)));
        }
        if !is_web_url(&button.url) {
            return Err(fail(ButtonLineProblem::UnparsableUrl(button.url)));
        }
        buttons.push(button);
    }
    Ok(ButtonRows::pack(buttons))
}
