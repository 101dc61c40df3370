// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("(de)serialization error: {0}")]
    Scroll(#[from] scroll::Error),

    #[error("bad header: {0}")]
    BadHeader(&'static str),

    #[error("bad table of contents: {0}")]
    BadToc(&'static str),

    #[error("unexpected value type {got:#06x}, expected {expected:#06x}")]
    UnexpectedKind { expected: u32, got: u32 },

    #[error("value extends past the end of the buffer")]
    TruncatedValue,

    #[error("string payload is not valid UTF-8")]
    InvalidString,

    #[error("encoding overflow: {0}")]
    EncodingOverflow(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
