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

use crate::card::acl::{AclMethod, Operation};
use crate::card::file::FileDescriptor;
use crate::card::{Card, CardCtl};
use crate::driver::CardOperations;
use crate::error::*;
use crate::init::key::KeyObject;
use crate::init::{fs, Session};
use crate::pkcs15::ObjectType;
use crate::profile::{self, Profile};
use crate::util::SecretKind;
use log::{debug, info};
use openssl::pkey::Private;

/// The profile file template private key files are allocated from.
pub const PRIVATE_KEY_TEMPLATE: &str = "template-private-key";
/// The profile file template public key files are allocated from.
pub const PUBLIC_KEY_TEMPLATE: &str = "template-public-key";
/// How many key files of one algorithm a template can allocate.
pub const FILES_PER_ALGORITHM: usize = 0x80;

/// The capability driver for virtual cards. Keys are stored as their DER
/// encodings, in files whose ACLs match the key's access conditions.
pub struct VirtualOperations;

impl VirtualOperations {
    fn store_private_der<C: Card>(
        &self,
        session: &mut Session<C>,
        key: &KeyObject,
        der: &[u8],
    ) -> Result<()> {
        let mut file = key.file().clone();
        if !key.acl().is_empty() {
            file.set_acl(Operation::Update, key.acl().to_vec());
        }
        debug!("Storing {} byte private key in {}", der.len(), file.path);
        fs::update_file(session, &file, der)
    }
}

impl<C: Card> CardOperations<C> for VirtualOperations {
    fn name(&self) -> &str {
        crate::card::virtual_card::DRIVER_NAME
    }

    fn erase_card(&self, session: &mut Session<C>) -> Result<()> {
        session.card_mut().card_ctl(CardCtl::Erase)
    }

    fn init_application(&self, session: &mut Session<C>) -> Result<()> {
        let app_df = match session.profile().app_df() {
            None => {
                return Err(Error::ObjectNotFound(format!(
                    "the profile doesn't define the {} file",
                    profile::APP_DF
                )));
            }
            Some(app_df) => app_df.clone(),
        };

        let mut ctls = Vec::new();
        let mut pin_files = Vec::new();
        for pin in session.profile().pins.iter() {
            let secret = match pin.secret(SecretKind::Pin) {
                None => {
                    return Err(Error::InvalidArgument(format!(
                        "no PIN was provided for {}",
                        pin.ident
                    )));
                }
                Some(secret) => secret.as_bytes().to_vec(),
            };
            ctls.push(CardCtl::InstallSecret {
                method: AclMethod::Chv,
                reference: pin.reference,
                secret,
                unblock: match pin.has_puk() {
                    false => None,
                    true => pin.secret(SecretKind::Puk).map(|s| s.as_bytes().to_vec()),
                },
                tries: pin.pin_tries,
            });
            if let Some(path) = pin.file.as_ref() {
                if let Some(file) = session.profile().find_file_by_path(path) {
                    pin_files.push(file.clone());
                }
            }
        }
        for key in session.profile().keys.iter() {
            if let Some(reference) = key.reference {
                ctls.push(CardCtl::InstallSecret {
                    method: key.method,
                    reference,
                    secret: key.value.clone(),
                    unblock: None,
                    tries: 0xff,
                });
            }
        }

        for ctl in ctls {
            session.card_mut().card_ctl(ctl)?;
        }
        info!("Creating application DF {}", app_df.path);
        fs::create_file(session, &app_df)?;
        for file in pin_files {
            fs::create_file(session, &file)?;
        }
        Ok(())
    }

    fn allocate_file(
        &self,
        profile: &Profile,
        object_type: ObjectType,
        index: usize,
    ) -> Result<FileDescriptor> {
        let ident = match object_type {
            ObjectType::PrivateKeyRsa | ObjectType::PrivateKeyDsa => PRIVATE_KEY_TEMPLATE,
            ObjectType::PublicKeyRsa | ObjectType::PublicKeyDsa => PUBLIC_KEY_TEMPLATE,
            ObjectType::AuthPin => {
                return Err(Error::NotSupported(
                    "PINs aren't stored in allocated files on virtual cards".to_owned(),
                ));
            }
        };
        let template = match profile.find_file(ident) {
            None => {
                return Err(Error::ObjectNotFound(format!(
                    "the profile doesn't define the {} file",
                    ident
                )));
            }
            Some(template) => template,
        };

        // RSA and DSA objects are counted separately, so each algorithm gets
        // its own range following the template's file ID.
        let base = match object_type {
            ObjectType::PrivateKeyDsa | ObjectType::PublicKeyDsa => FILES_PER_ALGORITHM,
            _ => 0,
        };
        let file_id = template.path.file_id() as usize + base + index;
        if index >= FILES_PER_ALGORITHM || file_id > u16::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "too many {} objects to allocate another file",
                object_type
            )));
        }
        let mut file = template.clone();
        file.path = template.path.with_file_id(file_id as u16);
        Ok(file)
    }

    fn store_rsa(
        &self,
        session: &mut Session<C>,
        key: &KeyObject,
        rsa: &openssl::rsa::Rsa<Private>,
    ) -> Result<()> {
        self.store_private_der(session, key, rsa.private_key_to_der()?.as_slice())
    }

    fn store_dsa(
        &self,
        session: &mut Session<C>,
        key: &KeyObject,
        dsa: &openssl::dsa::Dsa<Private>,
    ) -> Result<()> {
        self.store_private_der(session, key, dsa.private_key_to_der()?.as_slice())
    }
}
