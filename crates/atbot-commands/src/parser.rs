//! Turns raw message text into a [`ParsedIntent`].
//!
//! A message addresses the bot when it arrives in a direct-message channel or
//! contains the bot's mention. Only a mention at the start of a line followed
//! by whitespace introduces a command line; a mention anywhere else is a
//! greeting.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use atbot_core::types::{ChannelId, UserId};

/// Fenced code blocks: opening fence at line start, closing fence at line end.
static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^```\n?(.*?)\n```$").unwrap());

/// `&N`, or `&amp;N` as delivered by platforms that HTML-escape text.
static BACK_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^&(?:amp;)?(\d+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("Code block numbers start at &1")]
    ZeroIndex,

    #[error("Found code block reference &{index} but the message only has {available} code blocks")]
    OutOfRange { index: usize, available: usize },

    #[error("Bad code block reference &{0}")]
    BadIndex(String),

    #[error("Unterminated {0} quote")]
    UnterminatedQuote(char),
}

/// Where a message was posted, as far as the parser cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressingContext {
    pub is_private: bool,
}

impl AddressingContext {
    pub fn for_channel(channel: &ChannelId) -> Self {
        Self {
            is_private: channel.is_im(),
        }
    }
}

/// Result of parsing one message text.
///
/// Exactly one of these holds for an addressed message: `greeting_only`, or
/// `arguments` is `Some` (possibly with a `tokenize_error` attached).
#[derive(Debug, Clone, Default)]
pub struct ParsedIntent {
    pub greeting_only: bool,
    pub arguments: Option<Vec<String>>,
    pub tokenize_error: Option<TokenizeError>,
    /// The whole text was taken as the command line (private channel, no
    /// line-leading mention).
    pub lenient_full_message: bool,
}

impl ParsedIntent {
    pub fn is_addressed(&self) -> bool {
        self.greeting_only || self.is_command()
    }

    pub fn is_command(&self) -> bool {
        self.arguments.is_some()
    }
}

// Two parses of the same text must compare equal; an edit whose intent is
// unchanged is ignored on that basis.
impl PartialEq for ParsedIntent {
    fn eq(&self, other: &Self) -> bool {
        self.greeting_only == other.greeting_only
            && self.lenient_full_message == other.lenient_full_message
            && self.arguments == other.arguments
            && self.tokenize_error == other.tokenize_error
    }
}

impl Eq for ParsedIntent {}

/// Parser bound to one bot identity.
#[derive(Debug, Clone)]
pub struct MessageParser {
    mention: String,
}

impl MessageParser {
    pub fn new(bot_user: &UserId) -> Self {
        Self {
            mention: bot_user.mention(),
        }
    }

    pub fn parse(&self, text: &str, ctx: &AddressingContext) -> ParsedIntent {
        let mut intent = ParsedIntent::default();

        let start = match self.command_line_start(text) {
            Some(start) => start,
            None if ctx.is_private => {
                intent.lenient_full_message = true;
                0
            }
            None => {
                intent.greeting_only = text.contains(&self.mention);
                return intent;
            }
        };

        let (tokens, err) = parse_arguments(text, start);
        if tokens.is_empty() && err.is_none() {
            intent.greeting_only = true;
            return intent;
        }
        intent.arguments = Some(tokens);
        intent.tokenize_error = err;
        intent
    }

    /// Byte offset where the command line begins, if some line starts with
    /// the mention followed by whitespace. The whitespace may include
    /// newlines, so a mention alone on its line addresses the next line.
    fn command_line_start(&self, text: &str) -> Option<usize> {
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let indent = line.len() - line.trim_start().len();
            if line[indent..].starts_with(&self.mention) {
                let mention_end = offset + indent + self.mention.len();
                let tail = &text[mention_end..];
                let gap = tail.len() - tail.trim_start().len();
                if gap > 0 {
                    return Some(mention_end + gap);
                }
            }
            offset += line.len();
        }
        None
    }
}

/// Tokenize the line starting at `start` and resolve code block references
/// against the whole `text`.
fn parse_arguments(text: &str, start: usize) -> (Vec<String>, Option<TokenizeError>) {
    let line = text[start..].lines().next().unwrap_or("");
    let (mut tokens, mut err) = shell_split(line);

    let mut blocks: Option<Vec<&str>> = None;
    for token in tokens.iter_mut() {
        let Some(index) = BACK_REFERENCE
            .captures(token.trim())
            .map(|caps| caps[1].to_string())
        else {
            continue;
        };
        let blocks = blocks.get_or_insert_with(|| code_blocks(text));
        match index.parse::<usize>() {
            Err(_) => err = Some(TokenizeError::BadIndex(index)),
            Ok(0) => err = Some(TokenizeError::ZeroIndex),
            Ok(n) if n > blocks.len() => {
                err = Some(TokenizeError::OutOfRange {
                    index: n,
                    available: blocks.len(),
                })
            }
            Ok(n) => *token = blocks[n - 1].to_string(),
        }
    }
    (tokens, err)
}

fn code_blocks(text: &str) -> Vec<&str> {
    CODE_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

fn closing_quote(c: char) -> Option<char> {
    match c {
        '\'' => Some('\''),
        '"' => Some('"'),
        '\u{201c}' => Some('\u{201d}'),
        '\u{2018}' => Some('\u{2019}'),
        _ => None,
    }
}

/// Whitespace-separated words; single, double and typographic quotes group
/// words. An unterminated quote swallows the rest of the line as one token.
fn shell_split(line: &str) -> (Vec<String>, Option<TokenizeError>) {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(first) = chars.next() else { break };

        let mut token = String::new();
        if let Some(close) = closing_quote(first) {
            let mut terminated = false;
            for c in chars.by_ref() {
                if c == close {
                    terminated = true;
                    break;
                }
                token.push(c);
            }
            if !terminated {
                let rest = token.trim_end();
                if !rest.is_empty() {
                    tokens.push(rest.to_string());
                }
                return (tokens, Some(TokenizeError::UnterminatedQuote(first)));
            }
        } else {
            token.push(first);
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                token.push(c);
            }
        }
        tokens.push(token);
    }
    (tokens, None)
}
