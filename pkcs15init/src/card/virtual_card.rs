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
use crate::card::{Card, CardCtl};
use crate::error::*;
use data_encoding::HEXUPPER;
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;

/// The driver name virtual cards report, which binds the virtual capability
/// driver.
pub const DRIVER_NAME: &str = "virtual";

const SERIAL_NUMBER_BYTES: usize = 8;

#[derive(Clone, Debug, Deserialize, Serialize)]
struct StoredFile {
    descriptor: FileDescriptor,
    content: Vec<u8>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct StoredSecret {
    method: AclMethod,
    reference: u32,
    secret: Vec<u8>,
    unblock: Option<Vec<u8>>,
    max_tries: u8,
    tries_left: u8,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct CardImage {
    serial_number: String,
    files: BTreeMap<Path, StoredFile>,
    secrets: Vec<StoredSecret>,
}

impl CardImage {
    fn blank(serial_number: String) -> Self {
        let mut mf = FileDescriptor::new(Path::master_file(), FileType::Df, 0);
        mf.set_acl(Operation::Create, vec![AclEntry::none()]);
        mf.set_acl(Operation::Erase, vec![AclEntry::none()]);

        let mut files = BTreeMap::new();
        files.insert(
            mf.path.clone(),
            StoredFile {
                descriptor: mf,
                content: Vec::new(),
            },
        );

        CardImage {
            serial_number,
            files,
            secrets: Vec::new(),
        }
    }
}

/// An emulated card, whose state lives in memory and (optionally) in an image
/// file on disk. It enforces the ACLs of the files it holds, just like a real
/// card would.
pub struct VirtualCard {
    image: CardImage,
    backing: Option<PathBuf>,
    selected: Option<Path>,
    verified: HashSet<(AclMethod, u32)>,
    locked: bool,
}

fn random_serial_number() -> String {
    let mut rng = SmallRng::from_entropy();
    let bytes: Vec<u8> = (0..SERIAL_NUMBER_BYTES).map(|_| rng.gen::<u8>()).collect();
    HEXUPPER.encode(bytes.as_slice())
}

impl VirtualCard {
    /// Construct a new, blank card which only exists in memory.
    pub fn new() -> Self {
        Self::with_serial_number(random_serial_number().as_str())
    }

    pub fn with_serial_number(serial_number: &str) -> Self {
        VirtualCard {
            image: CardImage::blank(serial_number.to_owned()),
            backing: None,
            selected: None,
            verified: HashSet::new(),
            locked: false,
        }
    }

    /// Open the card image stored at the given path, or start a new blank
    /// card which will be saved there by `flush`.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut card = match path.exists() {
            false => {
                info!("Creating new virtual card image at {}", path.display());
                Self::new()
            }
            true => {
                let data = fs::read(path)?;
                VirtualCard {
                    image: rmp_serde::from_slice(data.as_slice())?,
                    backing: None,
                    selected: None,
                    verified: HashSet::new(),
                    locked: false,
                }
            }
        };
        card.backing = Some(path.to_path_buf());
        Ok(card)
    }

    /// Write this card's state back to its image file, if it has one.
    pub fn flush(&self) -> Result<()> {
        if let Some(path) = self.backing.as_ref() {
            debug!("Saving virtual card image to {}", path.display());
            fs::write(path, rmp_serde::to_vec(&self.image)?)?;
        }
        Ok(())
    }

    /// Return the raw contents of the file at the given path, bypassing access
    /// control.
    pub fn file_content(&self, path: &Path) -> Option<&[u8]> {
        self.image.files.get(path).map(|f| f.content.as_slice())
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        self.image.files.contains_key(path)
    }

    pub fn is_verified(&self, method: AclMethod, reference: u32) -> bool {
        self.verified.contains(&(method, reference))
    }

    fn ensure_locked(&self, operation: &str) -> Result<()> {
        if !self.locked {
            return Err(Error::Internal(format!(
                "can't {} without first locking the card",
                operation
            )));
        }
        Ok(())
    }

    fn check_access(&self, file: &FileDescriptor, operation: Operation) -> Result<()> {
        for entry in file.acl(operation) {
            match entry.method {
                AclMethod::Never => {
                    return Err(Error::SecurityStatusNotSatisfied(format!(
                        "{} of {} is never permitted",
                        operation, file.path
                    )));
                }
                AclMethod::None => return Ok(()),
                method => {
                    if !self.verified.contains(&(method, entry.reference)) {
                        return Err(Error::SecurityStatusNotSatisfied(format!(
                            "{} of {} requires {}",
                            operation, file.path, entry
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn selected_file(&self) -> Result<&StoredFile> {
        let path = match self.selected.as_ref() {
            None => return Err(Error::Card("no file is selected".to_owned())),
            Some(path) => path,
        };
        match self.image.files.get(path) {
            None => Err(Error::FileNotFound(path.to_string())),
            Some(file) => Ok(file),
        }
    }
}

impl Default for VirtualCard {
    fn default() -> Self {
        Self::new()
    }
}

impl Card for VirtualCard {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Err(Error::Card("the card is already locked".to_owned()));
        }
        self.locked = true;
        Ok(())
    }

    fn unlock(&mut self) {
        self.locked = false;
        self.selected = None;
        self.verified.clear();
    }

    fn select_file(&mut self, path: &Path) -> Result<FileDescriptor> {
        self.ensure_locked("select a file")?;
        match self.image.files.get(path) {
            None => Err(Error::FileNotFound(path.to_string())),
            Some(file) => {
                self.selected = Some(path.clone());
                Ok(file.descriptor.clone())
            }
        }
    }

    fn create_file(&mut self, file: &FileDescriptor) -> Result<()> {
        self.ensure_locked("create a file")?;
        if self.image.files.contains_key(&file.path) {
            return Err(Error::Card(format!("file {} already exists", file.path)));
        }

        let parent_path = file.path.parent();
        let parent = match self.image.files.get(&parent_path) {
            None => return Err(Error::FileNotFound(parent_path.to_string())),
            Some(parent) => parent,
        };
        if !parent.descriptor.is_df() || file.path.is_master_file() {
            return Err(Error::Card(format!(
                "can't create {} inside {}",
                file.path, parent_path
            )));
        }
        self.check_access(&parent.descriptor, Operation::Create)?;

        let content = match file.is_df() {
            false => vec![0; file.size],
            true => Vec::new(),
        };
        debug!("Creating {} ({}, {} bytes)", file.path, file.file_type, file.size);
        self.image.files.insert(
            file.path.clone(),
            StoredFile {
                descriptor: file.clone(),
                content,
            },
        );
        Ok(())
    }

    fn update_binary(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.ensure_locked("update a file")?;
        let file = self.selected_file()?;
        if file.descriptor.is_df() {
            return Err(Error::Card(format!(
                "{} is a directory",
                file.descriptor.path
            )));
        }
        self.check_access(&file.descriptor, Operation::Update)?;
        if offset + data.len() > file.descriptor.size {
            return Err(Error::Card(format!(
                "writing {} bytes at offset {} exceeds the {} byte size of {}",
                data.len(),
                offset,
                file.descriptor.size,
                file.descriptor.path
            )));
        }

        let path = file.descriptor.path.clone();
        if let Some(file) = self.image.files.get_mut(&path) {
            file.content[offset..offset + data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    fn read_binary(&mut self, offset: usize, length: usize) -> Result<Vec<u8>> {
        self.ensure_locked("read a file")?;
        let file = self.selected_file()?;
        self.check_access(&file.descriptor, Operation::Read)?;
        if offset > file.content.len() {
            return Err(Error::Card(format!(
                "offset {} is past the end of {}",
                offset, file.descriptor.path
            )));
        }
        let end = file.content.len().min(offset + length);
        Ok(file.content[offset..end].to_vec())
    }

    fn verify(&mut self, method: AclMethod, reference: u32, secret: &[u8]) -> Result<()> {
        self.ensure_locked("verify a secret")?;
        let stored = match self
            .image
            .secrets
            .iter_mut()
            .find(|s| s.method == method && s.reference == reference)
        {
            None => {
                return Err(Error::Card(format!(
                    "no {} with reference {} exists",
                    method.secret_description(),
                    reference
                )));
            }
            Some(stored) => stored,
        };

        if stored.tries_left == 0 {
            return Err(Error::Authentication(format!(
                "{} {} is blocked",
                method.secret_description(),
                reference
            )));
        }

        let matches = stored.secret.len() == secret.len()
            && openssl::memcmp::eq(stored.secret.as_slice(), secret);
        if !matches {
            stored.tries_left -= 1;
            self.verified.remove(&(method, reference));
            return Err(Error::Authentication(format!(
                "incorrect {} for reference {}, {} tries remaining",
                method.secret_description(),
                reference,
                stored.tries_left
            )));
        }

        stored.tries_left = stored.max_tries;
        self.verified.insert((method, reference));
        Ok(())
    }

    fn serial_number(&mut self) -> Result<String> {
        Ok(self.image.serial_number.clone())
    }

    fn card_ctl(&mut self, ctl: CardCtl) -> Result<()> {
        self.ensure_locked("control the card")?;
        match ctl {
            CardCtl::Erase => {
                let mf = match self.image.files.get(&Path::master_file()) {
                    None => return Err(Error::FileNotFound(Path::master_file().to_string())),
                    Some(mf) => mf,
                };
                self.check_access(&mf.descriptor, Operation::Erase)?;
                info!("Erasing virtual card {}", self.image.serial_number);
                self.image = CardImage::blank(self.image.serial_number.clone());
                self.selected = None;
                self.verified.clear();
            }
            CardCtl::InstallSecret {
                method,
                reference,
                secret,
                unblock,
                tries,
            } => {
                self.image
                    .secrets
                    .retain(|s| !(s.method == method && s.reference == reference));
                self.image.secrets.push(StoredSecret {
                    method,
                    reference,
                    secret,
                    unblock,
                    max_tries: tries,
                    tries_left: tries,
                });
            }
        }
        Ok(())
    }
}
