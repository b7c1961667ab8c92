//! # stray-proto
//!
//! Wire protocol support for straybot: parsing and serializing messages for
//! the relay dialect of IRC spoken by Twitch-style chat servers.
//!
//! The dialect differs from RFC 1459/2812 in one important way: the servers
//! accept frames of up to 2048 bytes (including the CR-LF terminator) instead
//! of the standard 512. [`RELAY_MAX_LINE`] carries that limit and
//! [`LineCodec`] enforces it in both directions.
//!
//! ## Creating messages
//!
//! ```rust
//! use stray_proto::Message;
//!
//! let privmsg = Message::privmsg("#rust", "Hello, world!");
//! assert_eq!(privmsg.to_string(), "PRIVMSG #rust :Hello, world!");
//! ```
//!
//! ## Parsing messages
//!
//! ```rust
//! use stray_proto::Message;
//!
//! let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
//! assert_eq!(msg.source_nickname(), Some("nick"));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod line;
pub mod message;
pub mod prefix;

pub use self::command::{Command, RPL_WELCOME};
pub use self::error::{MessageParseError, ProtocolError};
pub use self::line::{LineCodec, RELAY_MAX_LINE};
pub use self::message::{Message, Tag};
pub use self::prefix::Prefix;
