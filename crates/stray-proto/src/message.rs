//! Owned message model: optional tags, optional prefix, command.

use std::fmt;
use std::str::FromStr;

use crate::command::Command;
use crate::error::MessageParseError;
use crate::prefix::Prefix;

/// A message tag (the relay attaches metadata like `badges` and `color`).
///
/// Tag values are kept verbatim; this client never requests capabilities
/// that require unescaping.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tag(
    /// Tag key.
    pub String,
    /// Optional tag value; some tags are presence-only flags.
    pub Option<String>,
);

/// A complete parsed message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// Message tags, if the frame carried any.
    pub tags: Option<Vec<Tag>>,
    /// The origin of the message.
    pub prefix: Option<Prefix>,
    /// The command and its parameters.
    pub command: Command,
}

impl Message {
    /// The nickname of the message origin, if it was a user.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    /// The place a reply to this message should go: the channel for channel
    /// messages, otherwise the sender's nick.
    pub fn response_target(&self) -> Option<&str> {
        match &self.command {
            Command::PRIVMSG(target, _) | Command::NOTICE(target, _)
                if target.starts_with('#') =>
            {
                Some(target)
            }
            _ => self.source_nickname(),
        }
    }

    /// A PRIVMSG to a target.
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Command::PRIVMSG(target.into(), text.into()).into()
    }

    /// A NOTICE to a target.
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Command::NOTICE(target.into(), text.into()).into()
    }

    /// A JOIN for a channel or comma-separated channel list.
    pub fn join(channels: impl Into<String>) -> Self {
        Command::JOIN(channels.into()).into()
    }

    /// A PART for a channel.
    pub fn part(channel: impl Into<String>) -> Self {
        Command::PART(channel.into(), None).into()
    }

    /// A PASS frame carrying the auth token.
    pub fn pass(token: impl Into<String>) -> Self {
        Command::PASS(token.into()).into()
    }

    /// A NICK frame.
    pub fn nick(nickname: impl Into<String>) -> Self {
        Command::NICK(nickname.into()).into()
    }

    /// A PING with a token.
    pub fn ping(token: impl Into<String>) -> Self {
        Command::PING(token.into()).into()
    }

    /// A PONG answering a PING token.
    pub fn pong(token: impl Into<String>) -> Self {
        Command::PONG(token.into()).into()
    }

    /// A QUIT with a reason.
    pub fn quit(reason: impl Into<String>) -> Self {
        Command::QUIT(Some(reason.into())).into()
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message {
            tags: None,
            prefix: None,
            command,
        }
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s.trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return Err(MessageParseError::Empty);
        }

        let tags = if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, after) = stripped
                .split_once(' ')
                .ok_or(MessageParseError::MissingCommand)?;
            rest = after.trim_start_matches(' ');
            Some(
                raw_tags
                    .split(';')
                    .filter(|t| !t.is_empty())
                    .map(|t| match t.split_once('=') {
                        Some((k, v)) => Tag(k.to_string(), Some(v.to_string())),
                        None => Tag(t.to_string(), None),
                    })
                    .collect(),
            )
        } else {
            None
        };

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (raw_prefix, after) = stripped
                .split_once(' ')
                .ok_or(MessageParseError::MissingCommand)?;
            rest = after.trim_start_matches(' ');
            Some(Prefix::new_from_str(raw_prefix))
        } else {
            None
        };

        let mut params = Vec::new();
        let cmd = match rest.split_once(' ') {
            Some((cmd, mut args)) => {
                loop {
                    args = args.trim_start_matches(' ');
                    if args.is_empty() {
                        break;
                    }
                    if let Some(trailing) = args.strip_prefix(':') {
                        params.push(trailing.to_string());
                        break;
                    }
                    match args.split_once(' ') {
                        Some((word, next)) => {
                            params.push(word.to_string());
                            args = next;
                        }
                        None => {
                            params.push(args.to_string());
                            break;
                        }
                    }
                }
                cmd
            }
            None => rest,
        };

        if cmd.is_empty() {
            return Err(MessageParseError::MissingCommand);
        }

        Ok(Message {
            tags,
            prefix,
            command: Command::new(cmd, params),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tags) = &self.tags {
            write!(f, "@")?;
            for (i, Tag(key, value)) in tags.iter().enumerate() {
                if i > 0 {
                    write!(f, ";")?;
                }
                match value {
                    Some(v) => write!(f, "{key}={v}")?,
                    None => write!(f, "{key}")?,
                }
            }
            write!(f, " ")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_message() {
        let msg: Message = ":alice!alice@alice.tmi.example.com PRIVMSG #chan :hello there"
            .parse()
            .unwrap();
        assert_eq!(msg.source_nickname(), Some("alice"));
        assert_eq!(
            msg.command,
            Command::PRIVMSG("#chan".into(), "hello there".into())
        );
        assert_eq!(msg.response_target(), Some("#chan"));
    }

    #[test]
    fn parses_server_ping() {
        let msg: Message = "PING :relay.example.com\r\n".parse().unwrap();
        assert_eq!(msg.command, Command::PING("relay.example.com".into()));
        assert!(msg.prefix.is_none());
    }

    #[test]
    fn parses_welcome_numeric() {
        let msg: Message = ":relay.example.com 001 bot :Welcome, GLHF!".parse().unwrap();
        assert_eq!(
            msg.command,
            Command::Response(crate::RPL_WELCOME, vec!["bot".into(), "Welcome, GLHF!".into()])
        );
        assert_eq!(
            msg.prefix,
            Some(Prefix::ServerName("relay.example.com".into()))
        );
    }

    #[test]
    fn parses_tags() {
        let msg: Message = "@badges=broadcaster/1;flag :a!a@a PRIVMSG #c :hi"
            .parse()
            .unwrap();
        let tags = msg.tags.unwrap();
        assert_eq!(tags[0], Tag("badges".into(), Some("broadcaster/1".into())));
        assert_eq!(tags[1], Tag("flag".into(), None));
    }

    #[test]
    fn rejects_empty_and_command_less_frames() {
        assert_eq!(
            "".parse::<Message>().unwrap_err(),
            MessageParseError::Empty
        );
        assert_eq!(
            "\r\n".parse::<Message>().unwrap_err(),
            MessageParseError::Empty
        );
    }

    #[test]
    fn private_message_replies_to_sender() {
        let msg: Message = ":bob!bob@host PRIVMSG bot :psst".parse().unwrap();
        assert_eq!(msg.response_target(), Some("bob"));
    }

    #[test]
    fn display_round_trips() {
        for raw in [
            "PRIVMSG #chan :hello there",
            ":nick!user@host PRIVMSG #chan :hi",
            "PING relay.example.com",
            "QUIT :bye",
        ] {
            let msg: Message = raw.parse().unwrap();
            assert_eq!(msg.to_string(), raw);
        }
    }
}
