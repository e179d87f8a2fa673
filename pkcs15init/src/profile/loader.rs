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

use crate::card::acl::{AclEntry, AclMethod, Operation};
use crate::card::file::{FileDescriptor, FileType};
use crate::card::path::Path;
use crate::error::*;
use crate::pkcs15::*;
use crate::profile::*;
use data_encoding::HEXUPPER_PERMISSIVE;
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;

/// The profile for the virtual card, shipped with this crate.
pub const VIRTUAL_PROFILE: &str = include_str!("../../profiles/virtual.toml");

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
struct RawToken {
    label: Option<String>,
    manufacturer: Option<String>,
    serial: Option<String>,
    flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct RawPin {
    ident: String,
    #[serde(default)]
    label: String,
    auth_id: String,
    reference: u32,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pin_tries: Option<u8>,
    puk_tries: Option<u8>,
    pin_type: Option<String>,
    #[serde(default)]
    flags: Vec<String>,
    pad_char: Option<u8>,
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct RawAuthKey {
    method: String,
    /// Omitted for keys which may be presented for any reference.
    reference: Option<u32>,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
struct RawKeyTemplate {
    name: Option<String>,
    label: Option<String>,
    id: Option<String>,
    pin: Option<String>,
    usage: Vec<String>,
    access_flags: Vec<String>,
    native: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct RawFile {
    ident: String,
    path: String,
    #[serde(rename = "type", default)]
    file_type: Option<String>,
    #[serde(default)]
    size: usize,
    #[serde(default)]
    acl: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
struct RawProfile {
    name: Option<String>,
    token: Option<RawToken>,
    pin: Vec<RawPin>,
    key: Vec<RawAuthKey>,
    private_key: Vec<RawKeyTemplate>,
    public_key: Vec<RawKeyTemplate>,
    file: Vec<RawFile>,
}

impl RawProfile {
    /// Layer another profile on top of this one. Scalars are overridden,
    /// PINs and files replace earlier entries with the same ident, and
    /// everything else is appended.
    fn merge(&mut self, other: RawProfile) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.token.is_some() {
            self.token = other.token;
        }
        for pin in other.pin {
            self.pin.retain(|p| p.ident != pin.ident);
            self.pin.push(pin);
        }
        for file in other.file {
            self.file.retain(|f| f.ident != file.ident);
            self.file.push(file);
        }
        self.key.extend(other.key);
        self.private_key.extend(other.private_key);
        self.public_key.extend(other.public_key);
    }
}

fn parse_pin(raw: RawPin) -> Result<PinPolicy> {
    let mut pin = PinPolicy::new(raw.ident.as_str(), raw.auth_id.parse()?, raw.reference);
    pin.label = raw.label;
    if let Some(min_length) = raw.min_length {
        pin.min_length = min_length;
    }
    if let Some(max_length) = raw.max_length {
        pin.max_length = max_length;
    }
    if let Some(pin_tries) = raw.pin_tries {
        pin.pin_tries = pin_tries;
    }
    if let Some(puk_tries) = raw.puk_tries {
        pin.puk_tries = puk_tries;
    }
    if let Some(pin_type) = raw.pin_type {
        pin.pin_type = pin_type.parse()?;
    }
    pin.flags = PinFlags::from_names(raw.flags.as_slice())?;
    pin.pad_char = raw.pad_char;
    pin.file = raw.file.map(|f| f.parse()).transpose()?;

    if pin.max_length != 0 && pin.min_length > pin.max_length {
        return Err(Error::InvalidArgument(format!(
            "PIN {} has a minimum length of {} but a maximum length of {}",
            pin.ident, pin.min_length, pin.max_length
        )));
    }
    Ok(pin)
}

fn parse_auth_key(raw: RawAuthKey) -> Result<AuthKey> {
    let method: AclMethod = raw.method.parse()?;
    if !method.takes_reference() {
        return Err(Error::InvalidArgument(format!(
            "'{}' keys can't be presented to the card",
            method
        )));
    }
    Ok(AuthKey {
        method,
        reference: raw.reference,
        value: HEXUPPER_PERMISSIVE.decode(raw.value.as_bytes())?,
    })
}

fn parse_key_template(raw: RawKeyTemplate) -> Result<KeyTemplate> {
    Ok(KeyTemplate {
        name: raw.name,
        label: raw.label,
        id: raw.id.map(|id| id.parse()).transpose()?,
        pin: raw.pin,
        usage: KeyUsage::from_names(raw.usage.as_slice())?,
        access_flags: AccessFlags::from_names(raw.access_flags.as_slice())?,
        native: raw.native.unwrap_or(true),
    })
}

fn parse_file(raw: RawFile) -> Result<ProfileFile> {
    let path: Path = raw.path.parse()?;
    let file_type = match raw.file_type {
        None => FileType::WorkingEf,
        Some(t) => t.parse()?,
    };
    let mut file = FileDescriptor::new(path, file_type, raw.size);
    for (operation, chain) in raw.acl {
        let operation: Operation = operation.parse()?;
        let chain = chain
            .iter()
            .map(|entry| entry.parse::<AclEntry>())
            .collect::<Result<Vec<AclEntry>>>()?;
        file.set_acl(operation, chain);
    }
    Ok(ProfileFile {
        ident: raw.ident,
        file,
    })
}

fn finish(raw: RawProfile) -> Result<Profile> {
    let token = raw.token.unwrap_or_default();
    let profile = Profile {
        name: raw.name.unwrap_or_else(|| "pkcs15".to_owned()),
        token: TokenSettings {
            label: token.label,
            manufacturer: token.manufacturer,
            serial_number: token.serial,
            flags: TokenFlags::from_names(token.flags.as_slice())?,
        },
        pins: raw
            .pin
            .into_iter()
            .map(parse_pin)
            .collect::<Result<Vec<PinPolicy>>>()?,
        keys: raw
            .key
            .into_iter()
            .map(parse_auth_key)
            .collect::<Result<Vec<AuthKey>>>()?,
        private_keys: raw
            .private_key
            .into_iter()
            .map(parse_key_template)
            .collect::<Result<Vec<KeyTemplate>>>()?,
        public_keys: raw
            .public_key
            .into_iter()
            .map(parse_key_template)
            .collect::<Result<Vec<KeyTemplate>>>()?,
        files: raw
            .file
            .into_iter()
            .map(parse_file)
            .collect::<Result<Vec<ProfileFile>>>()?,
    };

    for template in profile.private_keys.iter() {
        if let Some(pin) = template.pin.as_ref() {
            if profile.find_pin(pin).is_none() {
                return Err(Error::ObjectNotFound(format!(
                    "private key template refers to undefined PIN {}",
                    pin
                )));
            }
        }
    }

    debug!(
        "Loaded profile '{}' with {} PINs and {} files",
        profile.name,
        profile.pins.len(),
        profile.files.len()
    );
    Ok(profile)
}

impl Profile {
    /// Parse a single profile document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Self::from_toml_strs(&[source])
    }

    /// Parse several profile documents, each layered on top of the previous
    /// ones.
    pub fn from_toml_strs(sources: &[&str]) -> Result<Self> {
        let mut raw = RawProfile::default();
        for source in sources {
            raw.merge(toml::from_str(source)?);
        }
        finish(raw)
    }

    /// Load and layer the given profile files, in order.
    pub fn load<P: AsRef<std::path::Path>>(paths: &[P]) -> Result<Self> {
        let sources = paths
            .iter()
            .map(|p| fs::read_to_string(p.as_ref()))
            .collect::<std::io::Result<Vec<String>>>()?;
        let sources: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
        Self::from_toml_strs(sources.as_slice())
    }
}
