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

use crate::card::acl::{AclEntry, Operation};
use crate::card::path::Path;
use crate::error::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum FileType {
    /// A dedicated (directory) file.
    Df,
    /// A transparent elementary file, readable and writable by the host.
    WorkingEf,
    /// An elementary file holding secrets only the card itself may use.
    InternalEf,
}

impl FileType {
    pub fn is_df(&self) -> bool {
        *self == FileType::Df
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                FileType::Df => "df",
                FileType::WorkingEf => "ef",
                FileType::InternalEf => "internal-ef",
            }
        )
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_lowercase().as_str() {
            "df" => FileType::Df,
            "ef" | "working-ef" => FileType::WorkingEf,
            "internal-ef" => FileType::InternalEf,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "invalid file type '{}'",
                    s
                )));
            }
        })
    }
}

/// A card file: where it lives, how big it is, and the ACL chain guarding
/// each operation on it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileDescriptor {
    pub path: Path,
    pub file_type: FileType,
    pub size: usize,
    acl: BTreeMap<Operation, Vec<AclEntry>>,
}

impl FileDescriptor {
    pub fn new(path: Path, file_type: FileType, size: usize) -> Self {
        FileDescriptor {
            path,
            file_type,
            size,
            acl: BTreeMap::new(),
        }
    }

    /// The ACL chain for the given operation. An operation with no chain at
    /// all is unrestricted.
    pub fn acl(&self, operation: Operation) -> &[AclEntry] {
        self.acl.get(&operation).map_or(&[], |chain| chain.as_slice())
    }

    pub fn set_acl(&mut self, operation: Operation, chain: Vec<AclEntry>) {
        self.acl.insert(operation, chain);
    }

    pub fn add_acl_entry(&mut self, operation: Operation, entry: AclEntry) {
        self.acl.entry(operation).or_default().push(entry);
    }

    pub fn is_df(&self) -> bool {
        self.file_type.is_df()
    }
}
