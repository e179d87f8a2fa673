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

pub mod acl;
pub mod file;
pub mod path;
#[cfg(feature = "virtual")]
pub mod virtual_card;

use crate::card::acl::AclMethod;
use crate::card::file::FileDescriptor;
use crate::card::path::Path;
use crate::error::*;

/// Vendor-specific requests which don't fit the generic file system
/// interface. Capability drivers issue these; the engine never does.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CardCtl {
    /// Wipe the card back to a bare master file.
    Erase,
    /// Install a secret the card will verify against the given reference,
    /// optionally with an unblocking secret.
    InstallSecret {
        method: AclMethod,
        reference: u32,
        secret: Vec<u8>,
        unblock: Option<Vec<u8>>,
        tries: u8,
    },
}

/// The raw card interface the provisioning engine is built on. Every call is
/// a blocking request / response exchange with the card, and the engine only
/// ever issues one at a time.
pub trait Card {
    /// The short name of this card's family, used to bind the matching
    /// capability driver.
    fn driver_name(&self) -> &str;

    /// Acquire exclusive access to the card. This must be called before any
    /// other operation.
    fn lock(&mut self) -> Result<()>;

    /// Release exclusive access to the card. Any security status obtained
    /// during the session is lost.
    fn unlock(&mut self);

    /// Select the file at the given path, making it the target of subsequent
    /// binary reads and updates. If there is no such file, this returns
    /// `Error::FileNotFound`.
    fn select_file(&mut self, path: &Path) -> Result<FileDescriptor>;

    /// Create the given file. Its parent must already exist.
    fn create_file(&mut self, file: &FileDescriptor) -> Result<()>;

    /// Write the given data into the currently selected file.
    fn update_binary(&mut self, offset: usize, data: &[u8]) -> Result<()>;

    /// Read up to `length` bytes from the currently selected file.
    fn read_binary(&mut self, offset: usize, length: usize) -> Result<Vec<u8>>;

    /// Present a secret for the given access condition.
    fn verify(&mut self, method: AclMethod, reference: u32, secret: &[u8]) -> Result<()>;

    fn serial_number(&mut self) -> Result<String>;

    fn card_ctl(&mut self, ctl: CardCtl) -> Result<()>;
}

impl<'a, C: Card + ?Sized> Card for &'a mut C {
    fn driver_name(&self) -> &str {
        (**self).driver_name()
    }

    fn lock(&mut self) -> Result<()> {
        (**self).lock()
    }

    fn unlock(&mut self) {
        (**self).unlock()
    }

    fn select_file(&mut self, path: &Path) -> Result<FileDescriptor> {
        (**self).select_file(path)
    }

    fn create_file(&mut self, file: &FileDescriptor) -> Result<()> {
        (**self).create_file(file)
    }

    fn update_binary(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        (**self).update_binary(offset, data)
    }

    fn read_binary(&mut self, offset: usize, length: usize) -> Result<Vec<u8>> {
        (**self).read_binary(offset, length)
    }

    fn verify(&mut self, method: AclMethod, reference: u32, secret: &[u8]) -> Result<()> {
        (**self).verify(method, reference, secret)
    }

    fn serial_number(&mut self) -> Result<String> {
        (**self).serial_number()
    }

    fn card_ctl(&mut self, ctl: CardCtl) -> Result<()> {
        (**self).card_ctl(ctl)
    }
}
