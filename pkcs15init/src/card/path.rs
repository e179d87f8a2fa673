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

use crate::error::*;
use data_encoding::{HEXUPPER, HEXUPPER_PERMISSIVE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The file identifier of the card's master file.
pub const MASTER_FILE_ID: u16 = 0x3f00;

/// An absolute card file path: a sequence of two-byte file identifiers,
/// starting (by convention) at the master file.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Path(Vec<u8>);

impl Path {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % 2 != 0 {
            return Err(Error::InvalidArgument(format!(
                "a card path must consist of two-byte file identifiers, got {} bytes",
                bytes.len()
            )));
        }
        Ok(Path(bytes.to_vec()))
    }

    pub fn master_file() -> Self {
        Path(MASTER_FILE_ID.to_be_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn is_master_file(&self) -> bool {
        self.0.as_slice() == MASTER_FILE_ID.to_be_bytes()
    }

    /// Return this path with its last file identifier removed. The parent of
    /// a top-level file (and of the master file itself) is the master file.
    pub fn parent(&self) -> Path {
        let len = self.0.len().saturating_sub(2);
        match len {
            0 => Path::master_file(),
            _ => Path(self.0[..len].to_vec()),
        }
    }

    pub fn join(&self, file_id: u16) -> Path {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(&file_id.to_be_bytes());
        Path(bytes)
    }

    /// The identifier of the file this path names.
    pub fn file_id(&self) -> u16 {
        let len = self.0.len();
        u16::from_be_bytes([self.0[len - 2], self.0[len - 1]])
    }

    /// Return a sibling path, whose last file identifier is replaced by the
    /// given one.
    pub fn with_file_id(&self, file_id: u16) -> Path {
        self.parent().join(file_id)
    }

    pub fn depth(&self) -> usize {
        self.0.len() / 2
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let components: Vec<String> = self.0.chunks(2).map(|c| HEXUPPER.encode(c)).collect();
        write!(f, "{}", components.join("/"))
    }
}

impl FromStr for Path {
    type Err = Error;

    /// Parse a path either as one run of hex digits ("3F005015") or with
    /// slash-separated components ("3F00/5015").
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s.chars().filter(|c| *c != '/').collect();
        Path::new(HEXUPPER_PERMISSIVE.decode(digits.as_bytes())?.as_slice())
    }
}
