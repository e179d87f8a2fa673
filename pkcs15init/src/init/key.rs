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

use crate::card::acl::AclEntry;
use crate::card::file::FileDescriptor;
use crate::card::Card;
use crate::crypto::{Algorithm, PrivateKey, PublicKey, DEFAULT_KEY_BITS};
use crate::error::*;
use crate::init::Pkcs15Init;
use crate::pkcs15::*;
use log::debug;

const DEFAULT_PRIVATE_KEY_LABEL: &str = "Private Key";
const DEFAULT_PUBLIC_KEY_LABEL: &str = "Public Key";

/// The caller's description of a key to generate or store.
#[derive(Clone)]
pub struct KeyRequest {
    pub algorithm: Algorithm,
    pub key_bits: u32,
    /// The object ID to use. If this is None, one is allocated, and written
    /// back here once the key object has been set up.
    pub id: Option<Pkcs15Id>,
    pub label: Option<String>,
    /// The name of the profile key template to use, or None for the first.
    pub template: Option<String>,
    pub onboard_keygen: bool,
    pub private_key: Option<PrivateKey>,
    pub public_key: Option<PublicKey>,
}

impl KeyRequest {
    pub fn new(algorithm: Algorithm, key_bits: u32) -> Self {
        KeyRequest {
            algorithm,
            key_bits,
            id: None,
            label: None,
            template: None,
            onboard_keygen: false,
            private_key: None,
            public_key: None,
        }
    }

    /// A request to store the given, already existing, private key.
    pub fn for_private_key(key: PrivateKey) -> Result<Self> {
        let mut request = KeyRequest::new(key.algorithm()?, key.bits() as u32);
        request.private_key = Some(key);
        Ok(request)
    }

    /// A request to store the given, already existing, public key.
    pub fn for_public_key(key: PublicKey) -> Result<Self> {
        let mut request = KeyRequest::new(key.algorithm()?, key.bits() as u32);
        request.public_key = Some(key);
        Ok(request)
    }

    /// The public key to store, either given directly or derived from the
    /// private key.
    pub fn resolve_public_key(&self) -> Result<PublicKey> {
        if let Some(key) = self.public_key.as_ref() {
            return Ok(key.clone());
        }
        match self.private_key.as_ref() {
            None => Err(Error::InvalidArgument(
                "no public key was provided, and there is no private key to derive one from"
                    .to_owned(),
            )),
            Some(key) => key.to_public_key(),
        }
    }
}

impl Default for KeyRequest {
    fn default() -> Self {
        KeyRequest::new(Algorithm::Rsa, DEFAULT_KEY_BITS)
    }
}

/// A key object instantiated from a profile template: its directory record,
/// the file allocated for it, and (for private keys) the ACL protecting it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyObject {
    object: Pkcs15Object,
    file: FileDescriptor,
    acl: Vec<AclEntry>,
}

impl KeyObject {
    pub fn object(&self) -> &Pkcs15Object {
        &self.object
    }

    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    pub fn acl(&self) -> &[AclEntry] {
        self.acl.as_slice()
    }

    pub fn id(&self) -> &Pkcs15Id {
        self.object.id()
    }

    pub fn key_info(&self) -> Option<&KeyInfo> {
        self.object.key_info()
    }
}

impl<C: Card> Pkcs15Init<C> {
    /// Work out everything about a new key object (type, label, ID, ACL and
    /// on-card file) without registering it anywhere.
    pub(crate) fn prepare_key(&self, request: &KeyRequest, private: bool) -> Result<KeyObject> {
        let object_type = ObjectType::for_key(request.algorithm, private)?;

        if let Some(id) = request.id.as_ref() {
            if self.p15card.find_object(object_type, id).is_some() {
                return Err(Error::NotSupported(format!(
                    "a {} with ID {} already exists, and updating it isn't supported",
                    object_type, id
                )));
            }
        }

        let index = self.p15card.count_objects(object_type);
        let profile = self.session.profile();
        let template = match profile.key_template(private, request.template.as_deref()) {
            None => {
                return Err(Error::ObjectNotFound(format!(
                    "the profile has no {} key template{}",
                    if private { "private" } else { "public" },
                    request
                        .template
                        .as_ref()
                        .map_or(String::new(), |t| format!(" named '{}'", t))
                )));
            }
            Some(template) => template,
        };

        let label = match (request.label.as_ref(), template.label.as_ref()) {
            (Some(label), _) => label.clone(),
            (None, Some(label)) if !label.is_empty() => label.clone(),
            _ => match private {
                true => DEFAULT_PRIVATE_KEY_LABEL.to_owned(),
                false => DEFAULT_PUBLIC_KEY_LABEL.to_owned(),
            },
        };

        let id = match request.id.as_ref() {
            Some(id) => id.clone(),
            None => match template.id.as_ref() {
                Some(id) if !id.is_empty() => id.with_offset(index),
                _ => Pkcs15Id::new(DEFAULT_KEY_ID)?.with_offset(index),
            },
        };

        let mut common = CommonAttributes {
            label,
            flags: ObjectFlags::default(),
            auth_id: None,
        };
        let mut acl = Vec::new();
        if private {
            common.flags = ObjectFlags::PRIVATE;
            if let Some(ident) = template.pin.as_ref() {
                let pin = match profile.find_pin(ident) {
                    None => {
                        return Err(Error::ObjectNotFound(format!(
                            "no PIN '{}' protecting private keys was found",
                            ident
                        )));
                    }
                    Some(pin) => pin,
                };
                common.auth_id = Some(pin.auth_id.clone());
                acl.push(AclEntry::chv(pin.reference));
            }
        }

        if id.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "no ID set for {} object",
                object_type
            )));
        }
        if template.usage.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "no key usage defined for {} object",
                object_type
            )));
        }

        let file = self.operations.allocate_file(profile, object_type, index)?;
        debug!(
            "Allocated {} for {} #{} with ID {}",
            file.path, object_type, index, id
        );

        Ok(KeyObject {
            object: Pkcs15Object {
                object_type,
                common,
                data: ObjectData::Key(KeyInfo {
                    id,
                    usage: template.usage,
                    native: template.native,
                    access_flags: template.access_flags,
                    key_reference: None,
                    path: file.path.clone(),
                    modulus_length: request.key_bits as usize,
                }),
            },
            file,
            acl,
        })
    }

    /// Record a prepared key object in the in-memory directory for its type,
    /// and write its ID back into the request.
    pub(crate) fn register_key(&mut self, request: &mut KeyRequest, key: &KeyObject) {
        self.p15card.add_object(key.object.clone());
        request.id = Some(key.id().clone());
    }

    /// Set up a new key object from the profile's templates, registering it in
    /// the PrKDF or PuKDF. The ID chosen is written back into the request, so
    /// a public key can later be paired with its private counterpart.
    pub fn setup_key(&mut self, request: &mut KeyRequest, private: bool) -> Result<KeyObject> {
        let key = self.prepare_key(request, private)?;
        self.register_key(request, &key);
        Ok(key)
    }
}
