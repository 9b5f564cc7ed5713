//! Parsing client input lines.
//!
//! Every line a client sends is either a command (starts with `:`) or a chat
//! message. Commands are split into a lowercased verb and whitespace-delimited
//! arguments, then mapped onto a typed [`Request`].

use thiserror::Error;

/// Prefix that marks a line as a command.
pub const COMMAND_PREFIX: char = ':';

/// Usage text for `:meet`.
pub const MEET_USAGE: &str = ":meet YourName";

/// Usage text for `:whisper`.
pub const WHISPER_USAGE: &str = ":whisper <client name> <message>";

/// A single line received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// Line started with `:`
    Command(Command),
    /// Anything else, forwarded to the other members
    Chat(String),
    /// Nothing but whitespace
    Empty,
}

impl ClientLine {
    /// Classifies a line (already stripped of its terminator).
    pub fn parse(line: &str) -> Self {
        if let Some(body) = line.strip_prefix(COMMAND_PREFIX) {
            return Self::Command(Command::parse(body));
        }

        if line.trim().is_empty() {
            return Self::Empty;
        }

        Self::Chat(line.to_string())
    }
}

/// Untyped command: verb plus arguments.
///
/// The verb is everything between the `:` and the first whitespace,
/// lowercased. Arguments are the whitespace-delimited tokens after it, so
/// runs of spaces collapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: String,
    pub args: Vec<String>,
    /// Everything after the verb, trimmed
    pub rest: String,
}

impl Command {
    /// Parses the text following the command prefix.
    pub fn parse(body: &str) -> Self {
        let (verb, rest) = body
            .split_once(char::is_whitespace)
            .unwrap_or((body, ""));

        Self {
            verb: verb.to_lowercase(),
            args: rest.split_whitespace().map(str::to_string).collect(),
            rest: rest.trim().to_string(),
        }
    }
}

/// Typed request mapped from a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `:meet <name>` - identify during the handshake
    Meet { name: String },
    /// `:p` - listening port
    Port,
    /// `:n` - active member count
    Members,
    /// `:m` - fixed greeting
    Greeting,
    /// `:who` - list member names
    Who,
    /// `:quit` - leave the chat
    Quit,
    /// `:whisper <name> <msg...>` - private message
    Whisper { target: String, message: String },
}

impl TryFrom<&Command> for Request {
    type Error = ParseError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        match cmd.verb.as_str() {
            "meet" => {
                if cmd.rest.is_empty() {
                    return Err(ParseError::Usage { usage: MEET_USAGE });
                }
                Ok(Self::Meet {
                    name: cmd.rest.clone(),
                })
            }
            "p" => Ok(Self::Port),
            "n" => Ok(Self::Members),
            "m" => Ok(Self::Greeting),
            "who" => Ok(Self::Who),
            "quit" => Ok(Self::Quit),
            "whisper" => match cmd.args.split_first() {
                Some((target, words)) if !words.is_empty() => Ok(Self::Whisper {
                    target: target.clone(),
                    message: words.join(" "),
                }),
                _ => Err(ParseError::Usage {
                    usage: WHISPER_USAGE,
                }),
            },
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

/// Errors mapping a command onto a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("usage: {usage}")]
    Usage { usage: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(line: &str) -> Result<Request, ParseError> {
        match ClientLine::parse(line) {
            ClientLine::Command(cmd) => Request::try_from(&cmd),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn test_chat_line() {
        assert_eq!(
            ClientLine::parse("hi all"),
            ClientLine::Chat("hi all".to_string())
        );
    }

    #[test]
    fn test_leading_space_is_chat() {
        assert!(matches!(ClientLine::parse(" :who"), ClientLine::Chat(_)));
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(ClientLine::parse(""), ClientLine::Empty);
        assert_eq!(ClientLine::parse("   "), ClientLine::Empty);
    }

    #[test]
    fn test_verb_is_lowercased() {
        assert_eq!(request(":WHO"), Ok(Request::Who));
        assert_eq!(request(":Quit"), Ok(Request::Quit));
    }

    #[test]
    fn test_trailing_whitespace_ignored() {
        assert_eq!(request(":n   "), Ok(Request::Members));
    }

    #[test]
    fn test_simple_verbs() {
        assert_eq!(request(":p"), Ok(Request::Port));
        assert_eq!(request(":n"), Ok(Request::Members));
        assert_eq!(request(":m"), Ok(Request::Greeting));
    }

    #[test]
    fn test_meet_takes_trimmed_remainder() {
        assert_eq!(
            request(":meet   alice  "),
            Ok(Request::Meet {
                name: "alice".to_string()
            })
        );
    }

    #[test]
    fn test_meet_without_name() {
        assert_eq!(request(":meet"), Err(ParseError::Usage { usage: MEET_USAGE }));
        assert_eq!(request(":meet   "), Err(ParseError::Usage { usage: MEET_USAGE }));
    }

    #[test]
    fn test_meet_glued_to_name_is_unknown() {
        assert_eq!(
            request(":meetbob"),
            Err(ParseError::UnknownCommand("meetbob".to_string()))
        );
    }

    #[test]
    fn test_whisper_joins_body_with_single_spaces() {
        assert_eq!(
            request(":whisper bob hello    there"),
            Ok(Request::Whisper {
                target: "bob".to_string(),
                message: "hello there".to_string(),
            })
        );
    }

    #[test]
    fn test_whisper_target_is_case_preserved() {
        assert_eq!(
            request(":WHISPER Bob hi"),
            Ok(Request::Whisper {
                target: "Bob".to_string(),
                message: "hi".to_string(),
            })
        );
    }

    #[test]
    fn test_whisper_needs_two_tokens() {
        let usage = Err(ParseError::Usage {
            usage: WHISPER_USAGE,
        });
        assert_eq!(request(":whisper"), usage);
        assert_eq!(request(":whisper bob"), usage);
        assert_eq!(request(":whisper bob   "), usage);
    }

    #[test]
    fn test_unknown_verb() {
        assert_eq!(
            request(":dance wildly"),
            Err(ParseError::UnknownCommand("dance".to_string()))
        );
    }

    #[test]
    fn test_bare_prefix_is_unknown() {
        assert_eq!(request(":"), Err(ParseError::UnknownCommand(String::new())));
        assert_eq!(
            request(": who"),
            Err(ParseError::UnknownCommand(String::new()))
        );
    }

    #[test]
    fn test_command_args() {
        let cmd = Command::parse("whisper  bob   hi there");
        assert_eq!(cmd.verb, "whisper");
        assert_eq!(cmd.args, vec!["bob", "hi", "there"]);
        assert_eq!(cmd.rest, "bob   hi there");
    }
}
