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

#[cfg(feature = "virtual")]
pub mod virtual_ops;

use crate::card::file::FileDescriptor;
use crate::card::Card;
use crate::crypto::PublicKey;
use crate::error::*;
use crate::init::key::KeyObject;
use crate::init::Session;
use crate::pkcs15::ObjectType;
use crate::profile::Profile;
use log::info;
use openssl::pkey::Private;

/// The operations which differ from one card family to the next. The engine
/// never touches card specific layouts itself; it goes through this trait.
pub trait CardOperations<C: Card> {
    /// The name of the card family this driver targets.
    fn name(&self) -> &str;

    /// Wipe any existing PKCS#15 structure from the card.
    fn erase_card(&self, session: &mut Session<C>) -> Result<()>;

    /// Create the PKCS#15 application DF, and store the profile's PINs.
    fn init_application(&self, session: &mut Session<C>) -> Result<()>;

    /// Choose where the `index`th object of the given type is stored on the
    /// card.
    fn allocate_file(
        &self,
        profile: &Profile,
        object_type: ObjectType,
        index: usize,
    ) -> Result<FileDescriptor>;

    /// Store an RSA private key in the key's file, in whatever form the card
    /// understands natively.
    fn store_rsa(
        &self,
        _session: &mut Session<C>,
        _key: &KeyObject,
        _rsa: &openssl::rsa::Rsa<Private>,
    ) -> Result<()> {
        Err(Error::NotSupported(format!(
            "{} cards can't store RSA keys natively",
            self.name()
        )))
    }

    /// Store a DSA private key in the key's file, in whatever form the card
    /// understands natively.
    fn store_dsa(
        &self,
        _session: &mut Session<C>,
        _key: &KeyObject,
        _dsa: &openssl::dsa::Dsa<Private>,
    ) -> Result<()> {
        Err(Error::NotSupported(format!(
            "{} cards can't store DSA keys natively",
            self.name()
        )))
    }

    /// Generate a key pair on the card itself, storing the private half in the
    /// key's file and returning the public half.
    fn generate_key(
        &self,
        _session: &mut Session<C>,
        _key: &KeyObject,
        _bits: u32,
    ) -> Result<PublicKey> {
        Err(Error::NotSupported(format!(
            "{} cards don't support on-board key generation",
            self.name()
        )))
    }
}

/// Return the capability driver for the card family with the given name.
pub fn bind_operations<C: Card>(name: &str) -> Result<Box<dyn CardOperations<C>>> {
    info!("Binding card operations for '{}'", name);
    match name.to_lowercase().as_str() {
        #[cfg(feature = "virtual")]
        crate::card::virtual_card::DRIVER_NAME => Ok(Box::new(virtual_ops::VirtualOperations)),
        _ => Err(Error::NotSupported(format!(
            "unsupported card driver '{}'",
            name
        ))),
    }
}
