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

pub mod loader;

use crate::card::acl::AclMethod;
use crate::card::file::FileDescriptor;
use crate::card::path::Path;
use crate::pkcs15::*;
use crate::util::SecretKind;

/// The profile file identifier of the PKCS#15 application DF.
pub const APP_DF: &str = "PKCS15-AppDF";
/// The profile file identifier of the ODF.
pub const ODF: &str = "PKCS15-ODF";
/// The profile file identifier of the TokenInfo file.
pub const TOKEN_INFO: &str = "PKCS15-TokenInfo";

/// How one PIN (and its unblocking PUK) should be set up on the card.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PinPolicy {
    pub ident: String,
    pub label: String,
    pub auth_id: Pkcs15Id,
    /// The key reference ACL entries use to refer to this PIN.
    pub reference: u32,
    pub min_length: usize,
    /// The stored length; the longest PIN the card accepts.
    pub max_length: usize,
    pub pin_tries: u8,
    /// A policy with zero PUK tries has no PUK at all.
    pub puk_tries: u8,
    pub pin_type: PinType,
    pub flags: PinFlags,
    pub pad_char: Option<u8>,
    /// The file the card keeps this PIN in, if it uses one.
    pub file: Option<Path>,
    secrets: [Option<String>; 2],
}

impl PinPolicy {
    pub fn new(ident: &str, auth_id: Pkcs15Id, reference: u32) -> Self {
        PinPolicy {
            ident: ident.to_owned(),
            label: String::new(),
            auth_id,
            reference,
            min_length: 4,
            max_length: 8,
            pin_tries: 3,
            puk_tries: 0,
            pin_type: PinType::default(),
            flags: PinFlags::default(),
            pad_char: None,
            file: None,
            secrets: [None, None],
        }
    }

    pub fn secret(&self, kind: SecretKind) -> Option<&str> {
        self.secrets[kind.slot()].as_deref()
    }

    pub fn set_secret(&mut self, kind: SecretKind, secret: String) {
        self.secrets[kind.slot()] = Some(secret);
    }

    pub fn has_puk(&self) -> bool {
        self.puk_tries != 0
    }

    /// The AODF record describing this PIN.
    pub fn to_object(&self) -> Pkcs15Object {
        Pkcs15Object {
            object_type: ObjectType::AuthPin,
            common: CommonAttributes {
                label: self.label.clone(),
                flags: ObjectFlags::PRIVATE | ObjectFlags::MODIFIABLE,
                auth_id: None,
            },
            data: ObjectData::Pin(PinInfo {
                auth_id: self.auth_id.clone(),
                flags: self.flags,
                pin_type: self.pin_type,
                min_length: self.min_length,
                stored_length: self.max_length,
                max_length: None,
                reference: self.reference,
                pad_char: self.pad_char,
                path: self.file.clone(),
            }),
        }
    }
}

/// A non-PIN secret (e.g. a transport key) the engine may present to satisfy
/// access conditions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthKey {
    pub method: AclMethod,
    /// The key reference this secret is bound to, or None if it may be
    /// presented for any reference.
    pub reference: Option<u32>,
    pub value: Vec<u8>,
}

/// A prototype key object, copied for each new key.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyTemplate {
    pub name: Option<String>,
    pub label: Option<String>,
    pub id: Option<Pkcs15Id>,
    /// The ident of the PIN policy protecting keys made from this template.
    pub pin: Option<String>,
    pub usage: KeyUsage,
    pub access_flags: AccessFlags,
    pub native: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TokenSettings {
    pub label: Option<String>,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
    pub flags: TokenFlags,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProfileFile {
    pub ident: String,
    pub file: FileDescriptor,
}

/// A card independent description of the PKCS#15 layout to provision.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Profile {
    pub name: String,
    pub token: TokenSettings,
    pub pins: Vec<PinPolicy>,
    pub keys: Vec<AuthKey>,
    pub private_keys: Vec<KeyTemplate>,
    pub public_keys: Vec<KeyTemplate>,
    pub files: Vec<ProfileFile>,
}

impl Profile {
    pub fn find_pin(&self, ident: &str) -> Option<&PinPolicy> {
        self.pins.iter().find(|p| p.ident == ident)
    }

    pub fn find_pin_by_reference(&self, reference: u32) -> Option<&PinPolicy> {
        self.pins.iter().find(|p| p.reference == reference)
    }

    /// Bind a secret to the named PIN policy. Returns false if the profile has
    /// no such policy.
    pub fn set_pin_secret(&mut self, ident: &str, kind: SecretKind, secret: String) -> bool {
        match self.pins.iter_mut().find(|p| p.ident == ident) {
            None => false,
            Some(pin) => {
                pin.set_secret(kind, secret);
                true
            }
        }
    }

    /// Find the non-PIN secret bound to exactly this method and reference.
    pub fn find_key(&self, method: AclMethod, reference: u32) -> Option<&AuthKey> {
        self.keys
            .iter()
            .find(|k| k.method == method && k.reference == Some(reference))
    }

    /// Find a non-PIN secret for the given method usable with any reference.
    pub fn find_wildcard_key(&self, method: AclMethod) -> Option<&AuthKey> {
        self.keys
            .iter()
            .find(|k| k.method == method && k.reference.is_none())
    }

    pub fn find_file(&self, ident: &str) -> Option<&FileDescriptor> {
        self.files
            .iter()
            .find(|f| f.ident == ident)
            .map(|f| &f.file)
    }

    pub fn find_file_by_path(&self, path: &Path) -> Option<&FileDescriptor> {
        self.files
            .iter()
            .find(|f| f.file.path == *path)
            .map(|f| &f.file)
    }

    /// The file the profile declares for the given kind of directory.
    pub fn directory_file(&self, kind: DfKind) -> Option<&FileDescriptor> {
        self.find_file(kind.profile_ident())
    }

    pub fn app_df(&self) -> Option<&FileDescriptor> {
        self.find_file(APP_DF)
    }

    pub fn odf_file(&self) -> Option<&FileDescriptor> {
        self.find_file(ODF)
    }

    pub fn token_info_file(&self) -> Option<&FileDescriptor> {
        self.find_file(TOKEN_INFO)
    }

    /// Select a key template by name, or the first one if no name was given.
    pub fn key_template(&self, private: bool, name: Option<&str>) -> Option<&KeyTemplate> {
        let templates = match private {
            true => &self.private_keys,
            false => &self.public_keys,
        };
        match name {
            None => templates.first(),
            Some(name) => templates.iter().find(|t| t.name.as_deref() == Some(name)),
        }
    }

    /// The TokenInfo this profile describes.
    pub fn token_info(&self) -> TokenInfo {
        TokenInfo {
            version: 0,
            serial_number: self.token.serial_number.clone(),
            manufacturer_id: self.token.manufacturer.clone(),
            label: self.token.label.clone(),
            flags: self.token.flags,
        }
    }
}
