// Copyright 2017 Axel Rasmussen
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Utf8Error {
    #[error("{0}")]
    String(#[from] std::string::FromUtf8Error),
    #[error("{0}")]
    Slice(#[from] std::str::Utf8Error),
}

#[derive(Debug, Error)]
pub enum Error {
    /// The card rejected a PIN or key we presented to it.
    #[error("authentication failure: {0}")]
    Authentication(String),
    #[error("{0}")]
    Bdrck(#[from] bdrck::error::Error),
    /// A generic failure reported by the card (or the layer beneath it).
    #[error("card error: {0}")]
    Card(String),
    /// Malformed DER contents while decoding PKCS#15 structures read back from a card.
    #[error("decoding error: {0}")]
    Decode(String),
    /// The selected file doesn't exist. This is consumed by the navigator,
    /// which creates missing files on demand.
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("{0}")]
    HexDecode(#[from] data_encoding::DecodeError),
    #[error("internal error: {0}")]
    Internal(String),
    /// Errors akin to EINVAL.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The requested feature, algorithm or card combination isn't
    /// implemented. Callers may recover by choosing another path.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// A referenced template, PIN, key or file is absent.
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("{0}")]
    ParseInt(#[from] std::num::ParseIntError),
    #[cfg(feature = "virtual")]
    #[error("{0}")]
    RmpDecode(#[from] rmp_serde::decode::Error),
    #[cfg(feature = "virtual")]
    #[error("{0}")]
    RmpEncode(#[from] rmp_serde::encode::Error),
    /// An access condition could not be satisfied.
    #[error("security status not satisfied: {0}")]
    SecurityStatusNotSatisfied(String),
    #[error("{0}")]
    Ssl(#[from] openssl::error::ErrorStack),
    /// Malformed TLV framing, or a tag the BER-TLV codec rejects.
    #[error("{0}")]
    Tlv(iso7816_tlv::TlvError),
    #[error("{0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("{0}")]
    Utf8(Utf8Error),
}

// This is a shim to allow us to convert from an underlying error to an Error, *via* a Utf8Error as
// an intermediate type. The compiler doesn't notice that this is possible without us providing
// this implementation explicitly.
impl<E> From<E> for Error
where
    E: Into<Utf8Error>,
{
    fn from(e: E) -> Self {
        Error::Utf8(e.into())
    }
}

// `TlvError` does not implement `std::error::Error` (the upstream crate gates that impl behind a
// feature it does not declare), so `#[from]` can't be used; provide the conversion by hand.
impl From<iso7816_tlv::TlvError> for Error {
    fn from(e: iso7816_tlv::TlvError) -> Self {
        Error::Tlv(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
