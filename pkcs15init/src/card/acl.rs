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
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How a single access condition is satisfied.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum AclMethod {
    /// The operation is never permitted.
    Never,
    /// The operation is always permitted.
    None,
    /// Verify the PIN with the entry's reference.
    Chv,
    /// Present the secure messaging key with the entry's reference.
    Pro,
    /// Present the authentication key with the entry's reference.
    Aut,
}

static METHOD_STRINGS: Lazy<HashMap<AclMethod, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(AclMethod::Never, "never");
    m.insert(AclMethod::None, "none");
    m.insert(AclMethod::Chv, "chv");
    m.insert(AclMethod::Pro, "pro");
    m.insert(AclMethod::Aut, "aut");
    m
});

static STRING_METHODS: Lazy<HashMap<String, AclMethod>> = Lazy::new(|| {
    METHOD_STRINGS
        .iter()
        .map(|pair| (pair.1.to_string(), *pair.0))
        .collect()
});

impl AclMethod {
    /// Whether entries using this method name a secret at all.
    pub fn takes_reference(&self) -> bool {
        !matches!(*self, AclMethod::Never | AclMethod::None)
    }

    /// A human readable description of the kind of secret this method needs.
    pub fn secret_description(&self) -> &'static str {
        match *self {
            AclMethod::Chv => "PIN",
            AclMethod::Pro => "secure messaging key",
            AclMethod::Aut => "authentication key",
            _ => "authentication data",
        }
    }
}

impl fmt::Display for AclMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", METHOD_STRINGS.get(self).map_or("", |s| *s))
    }
}

impl FromStr for AclMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match STRING_METHODS.get(&s.to_lowercase()) {
            None => Err(Error::InvalidArgument(format!(
                "invalid access condition method '{}'",
                s
            ))),
            Some(m) => Ok(*m),
        }
    }
}

/// One access condition in an ACL chain.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct AclEntry {
    pub method: AclMethod,
    pub reference: u32,
}

impl AclEntry {
    pub fn new(method: AclMethod, reference: u32) -> Self {
        AclEntry { method, reference }
    }

    pub fn none() -> Self {
        AclEntry::new(AclMethod::None, 0)
    }

    pub fn never() -> Self {
        AclEntry::new(AclMethod::Never, 0)
    }

    pub fn chv(reference: u32) -> Self {
        AclEntry::new(AclMethod::Chv, reference)
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.method.takes_reference() {
            false => write!(f, "{}", self.method),
            true => write!(f, "{}:{}", self.method, self.reference),
        }
    }
}

impl FromStr for AclEntry {
    type Err = Error;

    /// Parse "none", "never", or "<method>:<reference>" (e.g. "chv:1").
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().splitn(2, ':');
        let method: AclMethod = parts.next().unwrap_or("").parse()?;
        let reference = match parts.next() {
            None => 0,
            Some(r) => r.trim().parse::<u32>()?,
        };
        if method.takes_reference() != s.contains(':') {
            return Err(Error::InvalidArgument(format!(
                "invalid access condition '{}'",
                s
            )));
        }
        Ok(AclEntry::new(method, reference))
    }
}

/// A file operation which may be guarded by an ACL chain.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Operation {
    Select,
    Read,
    Update,
    Create,
    Delete,
    Erase,
}

static OPERATION_STRINGS: Lazy<HashMap<Operation, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(Operation::Select, "select");
    m.insert(Operation::Read, "read");
    m.insert(Operation::Update, "update");
    m.insert(Operation::Create, "create");
    m.insert(Operation::Delete, "delete");
    m.insert(Operation::Erase, "erase");
    m
});

static STRING_OPERATIONS: Lazy<HashMap<String, Operation>> = Lazy::new(|| {
    OPERATION_STRINGS
        .iter()
        .map(|pair| (pair.1.to_string(), *pair.0))
        .collect()
});

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", OPERATION_STRINGS.get(self).map_or("", |s| *s))
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match STRING_OPERATIONS.get(&s.to_lowercase()) {
            None => Err(Error::InvalidArgument(format!(
                "invalid file operation '{}'",
                s
            ))),
            Some(o) => Ok(*o),
        }
    }
}
