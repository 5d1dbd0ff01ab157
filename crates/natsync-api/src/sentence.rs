// Sentence framing
//
// A sentence is every word up to the next zero-length word. Its first
// `!`-prefixed word is the reply type; `=key=value` words are attributes;
// `.tag=N` is the API-level correlation tag. Anything else is kept as a
// bare flag so newer reply words don't break older clients.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::trace;

/// Attribute map of a single sentence (`=key=value` words).
pub type Attributes = BTreeMap<String, String>;

// ── Reply type ───────────────────────────────────────────────────────

/// The leading control word of a reply sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `!re` -- one data row.
    Re,
    /// `!done` -- command finished.
    Done,
    /// `!trap` -- command failed.
    Trap,
    /// `!fatal` -- router is closing the connection.
    Fatal,
    /// `!empty` -- command produced no rows (newer firmware).
    Empty,
    /// Any other `!word`.
    Other(String),
}

impl Reply {
    fn parse(word: &str) -> Self {
        match word {
            "!re" => Self::Re,
            "!done" => Self::Done,
            "!trap" => Self::Trap,
            "!fatal" => Self::Fatal,
            "!empty" => Self::Empty,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Re => f.write_str("!re"),
            Self::Done => f.write_str("!done"),
            Self::Trap => f.write_str("!trap"),
            Self::Fatal => f.write_str("!fatal"),
            Self::Empty => f.write_str("!empty"),
            Self::Other(word) => f.write_str(word),
        }
    }
}

/// Router-side error class carried in a trap's `category` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum TrapCategory {
    MissingItem,
    Argument,
    Interrupted,
    Scripting,
    General,
    Api,
    Tty,
    Return,
}

impl TrapCategory {
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "0" => Self::MissingItem,
            "1" => Self::Argument,
            "2" => Self::Interrupted,
            "3" => Self::Scripting,
            "4" => Self::General,
            "5" => Self::Api,
            "6" => Self::Tty,
            "7" => Self::Return,
            _ => return None,
        })
    }
}

// ── Sentence ─────────────────────────────────────────────────────────

/// One parsed sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    /// Leading `!` word, or `None` for a sentence without one.
    pub reply: Option<Reply>,
    /// `.tag` API attribute, echoed by the router.
    pub tag: Option<String>,
    /// `=key=value` attributes. Later duplicates overwrite earlier ones.
    pub attributes: Attributes,
    /// Words that are neither control words nor attributes.
    pub flags: Vec<String>,
}

impl Sentence {
    /// Build a sentence from its (non-empty) words.
    pub fn from_words<I, W>(words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: AsRef<[u8]>,
    {
        let mut sentence = Self::default();
        for word in words {
            sentence.push_word(&decode_word(word.as_ref()));
        }
        sentence
    }

    fn push_word(&mut self, word: &str) {
        if let Some(rest) = word.strip_prefix('=') {
            // Only the first `=` after the key splits; values may contain `=`.
            let (key, value) = rest.split_once('=').unwrap_or((rest, ""));
            self.attributes.insert(key.to_owned(), value.to_owned());
        } else if let Some(tag) = word.strip_prefix(".tag=") {
            self.tag = Some(tag.to_owned());
        } else if word.starts_with('!') && self.reply.is_none() {
            self.reply = Some(Reply::parse(word));
        } else {
            self.flags.push(word.to_owned());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// Words are UTF-8 on current firmware; older configs may hold comments in
/// a legacy codepage. Those bytes become U+FFFD and can no longer match an
/// exact comment query.
fn decode_word(word: &[u8]) -> Cow<'_, str> {
    let text = String::from_utf8_lossy(word);
    if let Cow::Owned(replaced) = &text {
        trace!(word = %replaced, "non-UTF-8 bytes in word replaced");
    }
    text
}

// ── Framer ───────────────────────────────────────────────────────────

/// Accumulates decoded words until a sentence is complete.
///
/// Feed it every word in arrival order; it hands back a [`Sentence`] when
/// the zero-length terminator arrives. A terminator with nothing buffered
/// is skipped.
#[derive(Debug, Default)]
pub struct SentenceFramer {
    pending: Vec<String>,
}

impl SentenceFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one word. Returns the finished sentence on a terminator.
    pub fn push(&mut self, word: &[u8]) -> Option<Sentence> {
        if !word.is_empty() {
            self.pending.push(decode_word(word).into_owned());
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }
        Some(Sentence::from_words(self.pending.drain(..)))
    }

    /// `true` if words have arrived since the last complete sentence.
    pub fn is_mid_sentence(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_reply_attributes_and_tag() {
        let s = Sentence::from_words(["!re", "=.id=*1A", "=comment=Pelican: abc", ".tag=7"]);
        assert_eq!(s.reply, Some(Reply::Re));
        assert_eq!(s.tag.as_deref(), Some("7"));
        assert_eq!(s.get(".id"), Some("*1A"));
        assert_eq!(s.get("comment"), Some("Pelican: abc"));
        assert!(s.flags.is_empty());
    }

    #[test]
    fn value_keeps_embedded_equals() {
        let s = Sentence::from_words(["!done", "=ret==a=b="]);
        assert_eq!(s.get("ret"), Some("=a=b="));
    }

    #[test]
    fn attribute_without_value_is_empty_string() {
        let s = Sentence::from_words(["!re", "=disabled"]);
        assert_eq!(s.get("disabled"), Some(""));
    }

    #[test]
    fn later_duplicate_overwrites_earlier() {
        let s = Sentence::from_words(["!re", "=name=first", "=name=second"]);
        assert_eq!(s.get("name"), Some("second"));
        assert_eq!(s.attributes.len(), 1);
    }

    #[test]
    fn bare_words_become_flags() {
        let s = Sentence::from_words(["!fatal", "session terminated on request", "done"]);
        assert_eq!(s.reply, Some(Reply::Fatal));
        assert_eq!(s.flags, vec!["session terminated on request", "done"]);
        assert!(s.has_flag("done"));
    }

    #[test]
    fn non_utf8_bytes_are_replaced() {
        let s = Sentence::from_words([&b"=comment=caf\xe9"[..]]);
        assert_eq!(s.get("comment"), Some("caf\u{FFFD}"));

        let mut framer = SentenceFramer::new();
        assert!(framer.push(b"!re").is_none());
        assert!(framer.push(b"=comment=\xff").is_none());
        let row = framer.push(b"").unwrap();
        assert_eq!(row.get("comment"), Some("\u{FFFD}"));
    }

    #[test]
    fn sentence_without_reply_word() {
        let s = Sentence::from_words(["=ret=0123abcd"]);
        assert_eq!(s.reply, None);
        assert_eq!(s.get("ret"), Some("0123abcd"));
    }

    #[test]
    fn unknown_reply_word_is_preserved() {
        let s = Sentence::from_words(["!bogus"]);
        assert_eq!(s.reply, Some(Reply::Other("!bogus".into())));
        assert_eq!(s.reply.unwrap().to_string(), "!bogus");
    }

    #[test]
    fn framer_emits_on_terminator_and_skips_empty_sentences() {
        let mut framer = SentenceFramer::new();
        assert_eq!(framer.push(b""), None);
        assert_eq!(framer.push(b"!re"), None);
        assert_eq!(framer.push(b"=a=1"), None);
        assert!(framer.is_mid_sentence());

        let s = framer.push(b"").unwrap();
        assert_eq!(s.reply, Some(Reply::Re));
        assert_eq!(s.get("a"), Some("1"));
        assert!(!framer.is_mid_sentence());
        assert_eq!(framer.push(b""), None);
    }

    #[test]
    fn trap_category_codes() {
        assert_eq!(TrapCategory::from_code("1"), Some(TrapCategory::Argument));
        assert_eq!(TrapCategory::from_code("9"), None);
        assert_eq!(TrapCategory::MissingItem.to_string(), "missing-item");
    }
}
