//! Command types for the client dialect.
//!
//! Only the commands a chat client actually exchanges with the relay get
//! typed variants; numerics map to [`Command::Response`] and anything else
//! falls through to [`Command::Raw`] rather than failing the parse, so an
//! unexpected server message never kills the read loop.

use std::fmt;

/// The welcome numeric sent by the server after a successful handshake.
pub const RPL_WELCOME: u16 = 1;

/// A command with its parameters.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Command {
    /// PASS: the connection password (relay auth token).
    PASS(String),
    /// NICK: the login nickname.
    NICK(String),
    /// JOIN: a channel, or a comma-separated channel list.
    JOIN(String),
    /// PART: leave a channel, with an optional message.
    PART(String, Option<String>),
    /// PRIVMSG: (target, text).
    PRIVMSG(String, String),
    /// NOTICE: (target, text).
    NOTICE(String, String),
    /// PING with its token.
    PING(String),
    /// PONG answering a PING token.
    PONG(String),
    /// QUIT with an optional reason.
    QUIT(Option<String>),
    /// A numeric reply: (code, parameters).
    Response(u16, Vec<String>),
    /// Any other command, kept verbatim: (command, parameters).
    Raw(String, Vec<String>),
}

impl Command {
    /// Build a command from a raw command token and its parameters.
    ///
    /// Known commands with the wrong parameter count degrade to [`Command::Raw`]
    /// instead of erroring; the dispatch layer ignores what it cannot use.
    pub fn new(cmd: &str, mut args: Vec<String>) -> Command {
        let upper = cmd.to_ascii_uppercase();

        if upper.len() == 3 && upper.bytes().all(|b| b.is_ascii_digit()) {
            // Numeric replies always parse; leading zeroes keep this in range.
            let code = upper.parse::<u16>().unwrap_or(0);
            return Command::Response(code, args);
        }

        match (upper.as_str(), args.len()) {
            ("PASS", 1) => Command::PASS(args.remove(0)),
            ("NICK", 1) => Command::NICK(args.remove(0)),
            ("JOIN", 1) => Command::JOIN(args.remove(0)),
            ("PART", 1) => Command::PART(args.remove(0), None),
            ("PART", 2) => {
                let chan = args.remove(0);
                Command::PART(chan, Some(args.remove(0)))
            }
            ("PRIVMSG", 2) => {
                let target = args.remove(0);
                Command::PRIVMSG(target, args.remove(0))
            }
            ("NOTICE", 2) => {
                let target = args.remove(0);
                Command::NOTICE(target, args.remove(0))
            }
            ("PING", 1) => Command::PING(args.remove(0)),
            ("PONG", 1 | 2) => Command::PONG(args.remove(0)),
            ("QUIT", 0) => Command::QUIT(None),
            ("QUIT", 1) => Command::QUIT(Some(args.remove(0))),
            _ => Command::Raw(upper, args),
        }
    }
}

/// Write plain parameters followed by an optional trailing parameter.
///
/// Text-bearing commands (PRIVMSG, NOTICE, PART/QUIT reasons) always use the
/// trailing form; for everything else the final parameter is only marked as
/// trailing when it has to be (empty, contains a space, starts with a colon).
fn write_params(
    f: &mut fmt::Formatter<'_>,
    params: &[&str],
    trailing: Option<&str>,
) -> fmt::Result {
    match (params.split_last(), trailing) {
        (Some((last, rest)), None) => {
            for p in rest {
                write!(f, " {p}")?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        (_, Some(text)) => {
            for p in params {
                write!(f, " {p}")?;
            }
            write!(f, " :{text}")?;
        }
        (None, None) => {}
    }
    Ok(())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::PASS(p) => {
                write!(f, "PASS")?;
                write_params(f, &[p], None)
            }
            Command::NICK(n) => {
                write!(f, "NICK")?;
                write_params(f, &[n], None)
            }
            Command::JOIN(chans) => {
                write!(f, "JOIN")?;
                write_params(f, &[chans], None)
            }
            Command::PART(chan, msg) => {
                write!(f, "PART")?;
                write_params(f, &[chan], msg.as_deref())
            }
            Command::PRIVMSG(target, text) => {
                write!(f, "PRIVMSG")?;
                write_params(f, &[target], Some(text))
            }
            Command::NOTICE(target, text) => {
                write!(f, "NOTICE")?;
                write_params(f, &[target], Some(text))
            }
            Command::PING(token) => {
                write!(f, "PING")?;
                write_params(f, &[token], None)
            }
            Command::PONG(token) => {
                write!(f, "PONG")?;
                write_params(f, &[token], None)
            }
            Command::QUIT(msg) => {
                write!(f, "QUIT")?;
                write_params(f, &[], msg.as_deref())
            }
            Command::Response(code, params) => {
                let refs: Vec<&str> = params.iter().map(String::as_str).collect();
                write!(f, "{code:03}")?;
                write_params(f, &refs, None)
            }
            Command::Raw(cmd, params) => {
                let refs: Vec<&str> = params.iter().map(String::as_str).collect();
                write!(f, "{cmd}")?;
                write_params(f, &refs, None)
            }
        }
    }
}
