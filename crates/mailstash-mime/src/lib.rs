//! # mailstash-mime
//!
//! MIME message parsing for the mailstash cache engine.
//!
//! ## Features
//!
//! - **Message parsing**: raw RFC 822 blobs into headers plus flattened
//!   leaf parts, with nested multipart support
//! - **Header decoding**: RFC 2047 encoded words with charset fallback
//! - **Body decoding**: Base64 and Quoted-Printable transfer encodings,
//!   charset-aware text extraction that never fails
//! - **Attachment detection**: parts carrying a filename or an attachment
//!   disposition
//!
//! ## Quick start
//!
//! ```ignore
//! use mailstash_mime::Message;
//!
//! let raw = b"From: sender@example.com\r\n\
//!             Subject: =?utf-8?B?SMOpbGxv?=\r\n\
//!             Content-Type: text/plain\r\n\
//!             \r\n\
//!             Hello, World!";
//!
//! let message = Message::parse(raw)?;
//! println!("Subject: {}", message.subject());
//! if let Some(part) = message.text_part() {
//!     println!("Body: {}", part.text());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, Part, TransferEncoding};
