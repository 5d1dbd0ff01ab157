// Scripted RouterOS stand-in for integration tests.
//
// Listens on a loopback port, speaks the word protocol, keeps an in-memory
// NAT table, and records every command it receives.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use natsync_api::{Attributes, Sentence, SentenceFramer, WordCodec};
use regex::Regex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

pub const USER: &str = "admin";
pub const PASSWORD: &str = "s3cret";

/// One command as the router saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub attributes: Attributes,
    pub queries: Vec<String>,
}

impl Recorded {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct RouterState {
    pub connections: usize,
    pub commands: Vec<Recorded>,
    pub rules: Vec<Attributes>,
    next_id: u32,
    /// Protocols whose `add` is answered with a trap.
    pub reject_protocols: Vec<String>,
    /// Answer every `print` with a trap.
    pub reject_lookups: bool,
    /// Treat `?~` regex query words as matching nothing.
    pub ignore_regex_queries: bool,
}

impl RouterState {
    fn insert(&mut self, mut rule: Attributes) -> String {
        self.next_id += 1;
        let id = format!("*{:X}", self.next_id);
        rule.insert(".id".into(), id.clone());
        self.rules.push(rule);
        id
    }
}

pub struct FakeRouter {
    pub address: String,
    pub port: u16,
    state: Arc<Mutex<RouterState>>,
    task: JoinHandle<()>,
}

impl FakeRouter {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(RouterState::default()));

        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                shared.lock().unwrap().connections += 1;
                tokio::spawn(serve(stream, Arc::clone(&shared)));
            }
        });

        Self {
            address: local.to_string(),
            port: local.port(),
            state,
            task,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap()
    }

    /// Pre-existing rule with the given comment and protocol.
    pub fn seed(&self, comment: &str, protocol: &str) -> String {
        let rule = [("comment", comment), ("protocol", protocol), ("chain", "dstnat")]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        self.state().insert(rule)
    }

    /// Commands under `/ip/firewall/nat`, in arrival order.
    pub fn nat_commands(&self) -> Vec<Recorded> {
        self.state()
            .commands
            .iter()
            .filter(|c| c.path.starts_with("/ip/firewall/nat/"))
            .cloned()
            .collect()
    }

    pub fn comments(&self) -> Vec<String> {
        self.state()
            .rules
            .iter()
            .filter_map(|r| r.get("comment").cloned())
            .collect()
    }

    /// Provider values pointing at this router.
    pub fn config(&self) -> HashMap<String, String> {
        [
            ("ip", "127.0.0.1".to_owned()),
            ("port", self.port.to_string()),
            ("user", USER.to_owned()),
            ("pass", PASSWORD.to_owned()),
            ("interface", "ether1".to_owned()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
    }
}

impl Drop for FakeRouter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A loopback address nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ── Connection handling ─────────────────────────────────────────────

async fn serve(stream: TcpStream, state: Arc<Mutex<RouterState>>) {
    let mut framed = Framed::new(stream, WordCodec::default());
    let mut framer = SentenceFramer::new();

    while let Some(Ok(word)) = framed.next().await {
        let Some(sentence) = framer.push(&word) else {
            continue;
        };
        let replies = handle(&state, &sentence);
        for reply in replies {
            for word in reply {
                framed.feed(word).await.unwrap();
            }
            if let Some(tag) = &sentence.tag {
                framed.feed(format!(".tag={tag}")).await.unwrap();
            }
            framed.feed("").await.unwrap();
        }
        if SinkExt::<&str>::flush(&mut framed).await.is_err() {
            return;
        }
    }
}

fn handle(state: &Mutex<RouterState>, sentence: &Sentence) -> Vec<Vec<String>> {
    let path = sentence.flags.first().cloned().unwrap_or_default();
    let queries: Vec<String> = sentence
        .flags
        .iter()
        .skip(1)
        .filter(|w| w.starts_with('?'))
        .cloned()
        .collect();

    let mut state = state.lock().unwrap();
    state.commands.push(Recorded {
        path: path.clone(),
        attributes: sentence.attributes.clone(),
        queries: queries.clone(),
    });

    let attrs = &sentence.attributes;
    match path.as_str() {
        "/login" => match (attrs.get("name"), attrs.get("password")) {
            (None, None) => vec![done()],
            (Some(name), Some(password)) if name == USER && password == PASSWORD => vec![done()],
            _ => trap("invalid user name or password (6)"),
        },
        "/ip/firewall/nat/add" => {
            let protocol = attrs.get("protocol").cloned().unwrap_or_default();
            if state.reject_protocols.contains(&protocol) {
                return trap("failure: protocol not allowed here");
            }
            let id = state.insert(attrs.clone());
            vec![vec!["!done".into(), format!("=ret={id}")]]
        }
        "/ip/firewall/nat/print" => {
            if state.reject_lookups {
                return trap("no such command or directory (print)");
            }
            let proplist: Option<Vec<&str>> =
                attrs.get(".proplist").map(|p| p.split(',').collect());
            let ignore_regex = state.ignore_regex_queries;
            let mut replies: Vec<Vec<String>> = state
                .rules
                .iter()
                .filter(|rule| {
                    queries
                        .iter()
                        .all(|q| !(ignore_regex && q.starts_with("?~")) && query_matches(q, rule))
                })
                .map(|rule| {
                    let mut row = vec!["!re".to_owned()];
                    for (key, value) in rule {
                        if proplist.as_ref().is_none_or(|keys| keys.contains(&key.as_str())) {
                            row.push(format!("={key}={value}"));
                        }
                    }
                    row
                })
                .collect();
            replies.push(done());
            replies
        }
        "/ip/firewall/nat/remove" => {
            let id = attrs.get(".id").cloned().unwrap_or_default();
            let before = state.rules.len();
            state.rules.retain(|r| r.get(".id") != Some(&id));
            if state.rules.len() == before {
                return trap("no such item");
            }
            vec![done()]
        }
        other => trap(&format!("no such command prefix {other}")),
    }
}

fn query_matches(query: &str, rule: &Attributes) -> bool {
    let body = &query[1..];
    if let Some(rest) = body.strip_prefix('~') {
        let (key, pattern) = rest.split_once('=').unwrap();
        let re = Regex::new(pattern).unwrap();
        rule.get(key).is_some_and(|v| re.is_match(v))
    } else {
        let (key, value) = body.split_once('=').unwrap();
        rule.get(key).is_some_and(|v| v == value)
    }
}

fn done() -> Vec<String> {
    vec!["!done".into()]
}

fn trap(message: &str) -> Vec<Vec<String>> {
    vec![vec!["!trap".into(), format!("=message={message}")], done()]
}
