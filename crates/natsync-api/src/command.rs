// Commands and their aggregated results
//
// A `Command` is the word list written for one request. A `CommandResult`
// is everything the router sent back for it: the `!re` rows plus the one
// terminal status. `ReplyCollector` folds sentences into that result.

use std::fmt;

use crate::error::Error;
use crate::sentence::{Attributes, Reply, Sentence, TrapCategory};

/// Attribute keys whose values are never printed in `Debug` output.
const SECRET_KEYS: &[&str] = &["password", "response"];

// ── Command ──────────────────────────────────────────────────────────

/// One API request: a command path followed by attribute and query words.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    path: String,
    words: Vec<String>,
}

impl Command {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            words: Vec::new(),
        }
    }

    /// Append an `=key=value` attribute word.
    pub fn attr(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.words.push(format!("={key}={value}"));
        self
    }

    /// Append several attribute words in order.
    pub fn attrs<K, V>(self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: fmt::Display,
    {
        pairs
            .into_iter()
            .fold(self, |cmd, (k, v)| cmd.attr(k.as_ref(), v))
    }

    /// Append a `?key=value` exact-match query word.
    pub fn query(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.words.push(format!("?{key}={value}"));
        self
    }

    /// Append a `?~key=pattern` regex query word.
    pub fn query_regex(mut self, key: &str, pattern: &str) -> Self {
        self.words.push(format!("?~{key}={pattern}"));
        self
    }

    /// Restrict returned rows to the given properties.
    pub fn proplist(self, fields: &[&str]) -> Self {
        self.attr(".proplist", fields.join(","))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Words following the command path, in write order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Full word list for the wire, ending with the `.tag` word.
    pub(crate) fn to_words(&self, tag: &str) -> Vec<String> {
        let mut out = Vec::with_capacity(self.words.len() + 2);
        out.push(self.path.clone());
        out.extend(self.words.iter().cloned());
        out.push(format!(".tag={tag}"));
        out
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = self.words.iter().map(|w| redact(w)).collect();
        f.debug_struct("Command")
            .field("path", &self.path)
            .field("words", &words)
            .finish()
    }
}

fn redact(word: &str) -> String {
    let secret = word
        .strip_prefix('=')
        .and_then(|rest| rest.split_once('='))
        .is_some_and(|(key, _)| SECRET_KEYS.contains(&key));
    if secret {
        let key = word.trim_start_matches('=').split('=').next().unwrap_or("");
        format!("={key}=****")
    } else {
        word.to_owned()
    }
}

// ── Result ───────────────────────────────────────────────────────────

/// Terminal status of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// `!done`, with whatever attributes it carried (e.g. `ret`).
    Done(Attributes),
    /// `!trap`, with its `message` / `category` attributes.
    Trap(Attributes),
}

/// Aggregate reply to one command: data rows plus terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub rows: Vec<Attributes>,
    pub status: Status,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, Status::Done(_))
    }

    /// The `ret` attribute of a successful `!done`.
    pub fn ret(&self) -> Option<&str> {
        match &self.status {
            Status::Done(attrs) => attrs.get("ret").map(String::as_str),
            Status::Trap(_) => None,
        }
    }

    pub fn trap_message(&self) -> Option<&str> {
        match &self.status {
            Status::Trap(attrs) => Some(
                attrs
                    .get("message")
                    .map_or("unknown error", String::as_str),
            ),
            Status::Done(_) => None,
        }
    }

    pub fn trap_category(&self) -> Option<TrapCategory> {
        match &self.status {
            Status::Trap(attrs) => attrs
                .get("category")
                .and_then(|c| TrapCategory::from_code(c)),
            Status::Done(_) => None,
        }
    }

    /// Turn a trap into [`Error::Trap`], passing successes through.
    pub fn into_result(self, command: &str) -> Result<Self, Error> {
        match self.status {
            Status::Done(_) => Ok(self),
            Status::Trap(_) => Err(Error::Trap {
                command: command.to_owned(),
                message: self.trap_message().unwrap_or_default().to_owned(),
                category: self.trap_category(),
            }),
        }
    }
}

// ── Collector ────────────────────────────────────────────────────────

/// Folds the sentences of one exchange into a [`CommandResult`].
///
/// Real firmware follows every `!trap` with a `!done`; the collector keeps
/// the trap as the status and waits for that `!done` so the stream is left
/// clean for the next command.
#[derive(Debug)]
pub struct ReplyCollector {
    tag: Option<String>,
    rows: Vec<Attributes>,
    trap: Option<Attributes>,
    login: bool,
}

impl ReplyCollector {
    /// Collector for an exchange tagged with `tag` (or untagged).
    pub fn new(tag: Option<String>) -> Self {
        Self {
            tag,
            rows: Vec::new(),
            trap: None,
            login: false,
        }
    }

    /// Also accept the login challenge some firmware sends as a bare
    /// `=ret=` sentence with no reply word. It ends the exchange like
    /// `!done`.
    #[must_use]
    pub fn for_login(mut self) -> Self {
        self.login = true;
        self
    }

    /// Feed one sentence. Returns the finished result on `!done`.
    pub fn accept(&mut self, sentence: Sentence) -> Result<Option<CommandResult>, Error> {
        if let (Some(expected), Some(got)) = (&self.tag, &sentence.tag) {
            if expected != got {
                return Err(Error::TagMismatch {
                    expected: expected.clone(),
                    got: got.clone(),
                });
            }
        }

        match sentence.reply {
            Some(Reply::Re) => self.rows.push(sentence.attributes),
            Some(Reply::Empty) => {}
            Some(Reply::Trap) => {
                // Keep the first trap; a second one adds nothing actionable.
                self.trap.get_or_insert(sentence.attributes);
            }
            Some(Reply::Done) => return Ok(Some(self.complete(sentence.attributes))),
            None if self.login && sentence.attributes.contains_key("ret") => {
                return Ok(Some(self.complete(sentence.attributes)));
            }
            Some(Reply::Fatal) => {
                let message = sentence
                    .flags
                    .first()
                    .cloned()
                    .or_else(|| sentence.attributes.get("message").cloned())
                    .unwrap_or_else(|| "no reason given".into());
                return Err(Error::Fatal { message });
            }
            Some(Reply::Other(word)) => return Err(Error::UnexpectedSentence(word)),
            None => {
                return Err(Error::UnexpectedSentence(
                    sentence.flags.join(" "),
                ));
            }
        }
        Ok(None)
    }

    fn complete(&mut self, done: Attributes) -> CommandResult {
        let status = match self.trap.take() {
            Some(trap) => Status::Trap(trap),
            None => Status::Done(done),
        };
        CommandResult {
            rows: std::mem::take(&mut self.rows),
            status,
        }
    }

    /// The stream ended cleanly between sentences.
    ///
    /// A trap already received stands as the terminal status; anything
    /// else means the reply was cut short.
    pub fn finish_at_eof(&mut self) -> Option<CommandResult> {
        self.trap.take().map(|trap| CommandResult {
            rows: std::mem::take(&mut self.rows),
            status: Status::Trap(trap),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use pretty_assertions::assert_eq;
    use tokio_util::codec::{Decoder, Encoder};

    use crate::codec::WordCodec;
    use crate::sentence::SentenceFramer;

    fn encode(words: &[&str]) -> BytesMut {
        let mut codec = WordCodec::default();
        let mut buf = BytesMut::new();
        for word in words {
            codec.encode(*word, &mut buf).unwrap();
        }
        buf
    }

    /// Decode a byte buffer all the way to a `CommandResult`.
    fn collect(mut buf: BytesMut) -> Result<Option<CommandResult>, Error> {
        let mut codec = WordCodec::default();
        let mut framer = SentenceFramer::new();
        let mut collector = ReplyCollector::new(None);
        while let Some(word) = codec.decode_eof(&mut buf)? {
            if let Some(sentence) = framer.push(&word) {
                if let Some(result) = collector.accept(sentence)? {
                    return Ok(Some(result));
                }
            }
        }
        Ok(collector.finish_at_eof())
    }

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn data_row_then_done() {
        let buf = encode(&["!re", "=name1=val1", "=name2=val2", "", "!done", ""]);
        let result = collect(buf).unwrap().unwrap();

        assert_eq!(
            result.rows,
            vec![attrs(&[("name1", "val1"), ("name2", "val2")])]
        );
        assert_eq!(result.status, Status::Done(Attributes::new()));
        assert!(result.is_success());
    }

    #[test]
    fn trap_without_done_stands_at_eof() {
        let buf = encode(&["!trap", "=message=failure", ""]);
        let result = collect(buf).unwrap().unwrap();

        assert!(result.rows.is_empty());
        assert_eq!(result.status, Status::Trap(attrs(&[("message", "failure")])));
        assert_eq!(result.trap_message(), Some("failure"));
    }

    #[test]
    fn trap_followed_by_done_keeps_trap_status() {
        let buf = encode(&[
            "!trap",
            "=category=1",
            "=message=failure: already have such entry",
            "",
            "!done",
            "",
        ]);
        let result = collect(buf).unwrap().unwrap();

        assert!(!result.is_success());
        assert_eq!(result.trap_category(), Some(TrapCategory::Argument));
        let err = result.into_result("/ip/firewall/nat/add").unwrap_err();
        assert!(err.is_command());
        assert!(err.to_string().contains("already have such entry"));
    }

    #[test]
    fn done_with_ret_exposes_it() {
        let buf = encode(&["!done", "=ret=*2B", ""]);
        let result = collect(buf).unwrap().unwrap();
        assert_eq!(result.ret(), Some("*2B"));
    }

    #[test]
    fn fatal_reply_is_an_error() {
        let buf = encode(&["!fatal", "not logged in", ""]);
        let err = collect(buf).unwrap_err();
        assert!(matches!(err, Error::Fatal { ref message } if message == "not logged in"));
    }

    #[test]
    fn mismatched_tag_is_framing_error() {
        let mut collector = ReplyCollector::new(Some("3".into()));
        let stray = Sentence::from_words(["!done", ".tag=2"]);
        let err = collector.accept(stray).unwrap_err();
        assert!(err.is_framing());
    }

    #[test]
    fn bare_challenge_only_ends_a_login_exchange() {
        let challenge = || Sentence::from_words(["=ret=0123abcd", ".tag=1"]);

        let mut login = ReplyCollector::new(Some("1".into())).for_login();
        let result = login.accept(challenge()).unwrap().unwrap();
        assert_eq!(result.ret(), Some("0123abcd"));

        let mut plain = ReplyCollector::new(Some("1".into()));
        assert!(plain.accept(challenge()).unwrap_err().is_framing());
    }

    #[test]
    fn rows_without_done_at_eof_yield_nothing() {
        let buf = encode(&["!re", "=a=1", ""]);
        assert_eq!(collect(buf).unwrap(), None);
    }

    #[test]
    fn command_words_and_redaction() {
        let cmd = Command::new("/login")
            .attr("name", "admin")
            .attr("password", "hunter2")
            .query("comment", "x")
            .proplist(&[".id", "comment"]);

        assert_eq!(
            cmd.to_words("9"),
            vec![
                "/login",
                "=name=admin",
                "=password=hunter2",
                "?comment=x",
                "=.proplist=.id,comment",
                ".tag=9",
            ]
        );

        let debug = format!("{cmd:?}");
        assert!(debug.contains("=password=****"));
        assert!(!debug.contains("hunter2"));
    }
}
