// Comment tags
//
// Every rule this crate creates carries `"Pelican: <uuid> <port>"` in its
// comment. That comment is the only link back to the owning server, so
// removal finds rules purely by matching it:
//
//   allocation scope   exact match on "Pelican: <uuid> <port>"
//   server scope       regex ^Pelican: <uuid>( |$)
//
// The regex is anchored at the start and requires a space or end after
// the uuid, so server "abc-123" never matches rules of "abc-1234".

use natsync_api::RuleFilter;

pub const TAG_PREFIX: &str = "Pelican: ";

/// `"Pelican: <uuid>"`
pub fn server_tag(uuid: &str) -> String {
    format!("{TAG_PREFIX}{uuid}")
}

/// `"Pelican: <uuid> <port>"`
pub fn allocation_tag(uuid: &str, port: u16) -> String {
    format!("{TAG_PREFIX}{uuid} {port}")
}

/// Backslash-escape POSIX extended regex metacharacters.
pub fn escape_regex(literal: &str) -> String {
    const META: &[char] = &[
        '\\', '.', '[', ']', '(', ')', '{', '}', '*', '+', '?', '^', '$', '|',
    ];
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if META.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Regex selecting every rule tagged for `uuid`, any port.
pub fn server_pattern(uuid: &str) -> String {
    format!("^{}( |$)", escape_regex(&server_tag(uuid)))
}

/// The set of rules one operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// All rules of a server.
    Server(&'a str),
    /// The TCP + UDP pair of one allocation.
    Allocation { server: &'a str, port: u16 },
}

impl Scope<'_> {
    pub fn server(&self) -> &str {
        match self {
            Scope::Server(uuid) | Scope::Allocation { server: uuid, .. } => uuid,
        }
    }

    pub fn tag(&self) -> String {
        match *self {
            Scope::Server(uuid) => server_tag(uuid),
            Scope::Allocation { server, port } => allocation_tag(server, port),
        }
    }

    /// Router-side query selecting the rules in scope.
    pub fn filter(&self) -> RuleFilter {
        match *self {
            Scope::Server(uuid) => RuleFilter::CommentMatches(server_pattern(uuid)),
            Scope::Allocation { server, port } => {
                RuleFilter::CommentEquals(allocation_tag(server, port))
            }
        }
    }

    /// Local equivalent of [`Scope::filter`], for checking a comment
    /// already in hand.
    pub fn matches(&self, comment: &str) -> bool {
        match *self {
            Scope::Server(uuid) => comment
                .strip_prefix(&server_tag(uuid))
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(' ')),
            Scope::Allocation { server, port } => comment == allocation_tag(server, port),
        }
    }
}
