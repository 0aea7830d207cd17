//! Inline-button callback payloads.
//!
//! Raw payload strings are decoded into `CallbackAction` once at the dispatcher
//! boundary; handlers match on the variant.

use crate::domain::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageDirection {
    Prev,
    Next,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderAction {
    SetText,
    SetMedia,
    SkipMedia,
    SetButtons,
    SkipButtons,
    Preview,
    Send,
    Cancel,
}

const BUILDER_ACTIONS: [(BuilderAction, &str); 8] = [
    (BuilderAction::SetText, "set_text"),
    (BuilderAction::SetMedia, "set_media"),
    (BuilderAction::SkipMedia, "skip_media"),
    (BuilderAction::SetButtons, "set_buttons"),
    (BuilderAction::SkipButtons, "skip_buttons"),
    (BuilderAction::Preview, "preview"),
    (BuilderAction::Send, "send"),
    (BuilderAction::Cancel, "cancel"),
];

impl BuilderAction {
    fn slug(self) -> &'static str {
        BUILDER_ACTIONS
            .iter()
            .find(|(a, _)| *a == self)
            .map(|(_, s)| *s)
            .unwrap_or("cancel")
    }

    fn from_slug(slug: &str) -> Option<Self> {
        BUILDER_ACTIONS
            .iter()
            .find(|(_, s)| *s == slug)
            .map(|(a, _)| *a)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Unblock(UserId),
    PageNav { direction: PageDirection, page: usize },
    Block(UserId),
    Builder(BuilderAction),
    Unrecognized,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        if let Some(rest) = data.strip_prefix("unblock_") {
            return parse_user(rest).map_or(Self::Unrecognized, Self::Unblock);
        }
        if let Some(rest) = data.strip_prefix("block_") {
            return parse_user(rest).map_or(Self::Unrecognized, Self::Block);
        }
        if let Some(rest) = data.strip_prefix("page_prev_") {
            return parse_page(rest, PageDirection::Prev);
        }
        if let Some(rest) = data.strip_prefix("page_next_") {
            return parse_page(rest, PageDirection::Next);
        }
        if let Some(rest) = data.strip_prefix("bbuild_") {
            return BuilderAction::from_slug(rest).map_or(Self::Unrecognized, Self::Builder);
        }
        Self::Unrecognized
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Unblock(id) => format!("unblock_{}", id.0),
            Self::Block(id) => format!("block_{}", id.0),
            Self::PageNav {
                direction: PageDirection::Prev,
                page,
            } => format!("page_prev_{page}"),
            Self::PageNav {
                direction: PageDirection::Next,
                page,
            } => format!("page_next_{page}"),
            Self::Builder(action) => format!("bbuild_{}", action.slug()),
            Self::Unrecognized => String::new(),
        }
    }
}

fn parse_user(s: &str) -> Option<UserId> {
    s.parse::<i64>().ok().filter(|id| *id != 0).map(UserId)
}

fn parse_page(s: &str, direction: PageDirection) -> CallbackAction {
    match s.parse::<usize>() {
        Ok(page) => CallbackAction::PageNav { direction, page },
        Err(_) => CallbackAction::Unrecognized,
    }
}
