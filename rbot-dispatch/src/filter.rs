//! Composable predicates over an [`Update`].
//!
//! A [`Filter`] is a tree of primitive checks joined by `&`, `|` and `!`. Evaluation walks the
//! tree left to right and short-circuits, so the right side of `a & b` is never inspected when
//! `a` is false (and likewise for `|` when `a` is true). A filter that needs a field the update
//! doesn't carry simply evaluates to false.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use rbot_core::{ChatType, MediaKind, Update, UpdateKind};

type Predicate = Arc<dyn Fn(&Update) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Filter {
    /// Matches everything.
    All,
    Kind(UpdateKind),
    Private,
    Group,
    Channel,
    HasText,
    TextEquals(String),
    /// Text whose first word is `/name` for one of the names.
    Command(Vec<String>),
    Regex(regex::Regex),
    Media(MediaKind),
    HasButton,
    Button(String),
    IsReply,
    IsForward,
    Sender(Vec<String>),
    Custom(Predicate),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn text(value: impl Into<String>) -> Self {
        Filter::TextEquals(value.into())
    }

    pub fn command(name: impl Into<String>) -> Self {
        Filter::Command(vec![name.into()])
    }

    pub fn commands<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Command(names.into_iter().map(Into::into).collect())
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Filter::Regex(regex::Regex::new(pattern)?))
    }

    pub fn button(id: impl Into<String>) -> Self {
        Filter::Button(id.into())
    }

    pub fn sender<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Sender(ids.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        Filter::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, update: &Update) -> bool {
        match self {
            Filter::All => true,
            Filter::Kind(kind) => update.kind == *kind,
            Filter::Private => update.chat_type() == ChatType::User,
            Filter::Group => update.chat_type() == ChatType::Group,
            Filter::Channel => update.chat_type() == ChatType::Channel,
            Filter::HasText => update.text().is_some_and(|t| !t.is_empty()),
            Filter::TextEquals(expected) => update.text() == Some(expected.as_str()),
            Filter::Command(names) => command_name(update)
                .is_some_and(|name| names.iter().any(|n| n == name)),
            Filter::Regex(re) => update.text().is_some_and(|t| re.is_match(t)),
            Filter::Media(kind) => update.has_media(*kind),
            Filter::HasButton => update.button_id().is_some(),
            Filter::Button(id) => update.button_id() == Some(id.as_str()),
            Filter::IsReply => update
                .message
                .as_ref()
                .is_some_and(|m| m.reply_to_message_id.is_some()),
            Filter::IsForward => update.message.as_ref().is_some_and(|m| m.is_forwarded),
            Filter::Sender(ids) => update
                .sender_id()
                .is_some_and(|sender| ids.iter().any(|id| id == sender)),
            Filter::Custom(predicate) => predicate(update),
            Filter::And(left, right) => left.matches(update) && right.matches(update),
            Filter::Or(left, right) => left.matches(update) || right.matches(update),
            Filter::Not(inner) => !inner.matches(update),
        }
    }
}

/// The command word of a `/command arg…` text, without the slash.
pub fn command_name(update: &Update) -> Option<&str> {
    let text = update.text()?;
    let first = text.split_whitespace().next()?;
    first.strip_prefix('/').filter(|name| !name.is_empty())
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        Filter::And(Box::new(self), Box::new(rhs))
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        Filter::Or(Box::new(self), Box::new(rhs))
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => f.write_str("All"),
            Filter::Kind(kind) => write!(f, "Kind({kind:?})"),
            Filter::Private => f.write_str("Private"),
            Filter::Group => f.write_str("Group"),
            Filter::Channel => f.write_str("Channel"),
            Filter::HasText => f.write_str("HasText"),
            Filter::TextEquals(text) => write!(f, "TextEquals({text:?})"),
            Filter::Command(names) => write!(f, "Command({names:?})"),
            Filter::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
            Filter::Media(kind) => write!(f, "Media({kind:?})"),
            Filter::HasButton => f.write_str("HasButton"),
            Filter::Button(id) => write!(f, "Button({id:?})"),
            Filter::IsReply => f.write_str("IsReply"),
            Filter::IsForward => f.write_str("IsForward"),
            Filter::Sender(ids) => write!(f, "Sender({ids:?})"),
            Filter::Custom(_) => f.write_str("Custom(..)"),
            Filter::And(l, r) => write!(f, "({l:?} & {r:?})"),
            Filter::Or(l, r) => write!(f, "({l:?} | {r:?})"),
            Filter::Not(inner) => write!(f, "!{inner:?}"),
        }
    }
}
