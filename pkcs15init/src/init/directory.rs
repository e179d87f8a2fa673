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

use crate::card::Card;
use crate::error::*;
use crate::init::{fs, Pkcs15Init};
use crate::pkcs15::decode::*;
use crate::pkcs15::encode::*;
use crate::pkcs15::{DfKind, Pkcs15Card};
use crate::profile::{self, PinPolicy};
use crate::util::SecretKind;
use log::{debug, info};

impl<C: Card> Pkcs15Init<C> {
    /// Re-encode the given directory and write every one of its segments back
    /// to the card. A directory with no backing file yet is given the one the
    /// profile declares for it, and the ODF is refreshed to point at it.
    ///
    /// Every segment is encoded before anything is written, so an encoding
    /// failure leaves the card untouched. Each write replaces a segment's
    /// whole content, so retrying after a failed write is safe.
    pub fn update_directory(&mut self, kind: DfKind) -> Result<()> {
        if self.p15card.directory_files(kind).is_empty() {
            let file = match self.session.profile().directory_file(kind) {
                None => {
                    return Err(Error::NotSupported(format!(
                        "the profile doesn't define a {} file",
                        kind
                    )));
                }
                Some(file) => file.clone(),
            };
            debug!("Binding {} to {}", kind, file.path);
            self.p15card.bind_directory_file(kind, file);
            self.update_odf()?;
        }

        let segments = match self.p15card.directory(kind) {
            None => {
                return Err(Error::Internal(format!("the {} has no records", kind)));
            }
            Some(directory) => directory
                .files()
                .iter()
                .enumerate()
                .map(|(segment, file)| {
                    encode_directory(directory, segment).map(|data| (file.clone(), data))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        for (file, data) in segments {
            info!("Writing {} ({} bytes) to {}", kind, data.len(), file.path);
            fs::update_file(&mut self.session, &file, data.as_slice())?;
        }
        Ok(())
    }

    /// Write the ODF, which lists every directory file in use.
    pub fn update_odf(&mut self) -> Result<()> {
        let file = match self.session.profile().odf_file() {
            None => {
                return Err(Error::NotSupported(format!(
                    "the profile doesn't define the {} file",
                    profile::ODF
                )));
            }
            Some(file) => file.clone(),
        };
        let data = encode_odf(&self.p15card)?;
        info!("Writing ODF ({} bytes) to {}", data.len(), file.path);
        fs::update_file(&mut self.session, &file, data.as_slice())
    }

    pub fn update_token_info(&mut self) -> Result<()> {
        let file = match self.session.profile().token_info_file() {
            None => {
                return Err(Error::NotSupported(format!(
                    "the profile doesn't define the {} file",
                    profile::TOKEN_INFO
                )));
            }
            Some(file) => file.clone(),
        };
        let data = encode_token_info(&self.p15card.token_info)?;
        info!("Writing TokenInfo ({} bytes) to {}", data.len(), file.path);
        fs::update_file(&mut self.session, &file, data.as_slice())
    }

    fn pin_file_exists(&mut self, pin: &PinPolicy) -> bool {
        match pin.file.as_ref() {
            None => false,
            Some(path) => self.session.card_mut().select_file(path).is_ok(),
        }
    }

    fn read_secret(&mut self, pin: &PinPolicy, kind: SecretKind) -> Result<()> {
        if pin.secret(kind).is_some() {
            return Ok(());
        }
        let secret = self.session.prompter_mut().prompt_secret(
            kind,
            pin.ident.as_str(),
            pin.label.as_str(),
            pin.min_length,
            pin.max_length,
        )?;
        self.session
            .profile_mut()
            .set_pin_secret(pin.ident.as_str(), kind, secret);
        Ok(())
    }

    /// Make sure every PIN (and PUK) the profile needs to initialize the card
    /// is known, asking for any which haven't been supplied already.
    pub fn read_pins(&mut self) -> Result<()> {
        let pins = self.session.profile().pins.clone();
        for pin in pins.iter() {
            let mut read_puk = pin.has_puk();
            if self.pin_file_exists(pin) {
                info!("PIN file for {} already exists", pin.ident);
                read_puk = false;
            }

            self.read_secret(pin, SecretKind::Pin)?;
            if read_puk {
                self.read_secret(pin, SecretKind::Puk)?;
            }
        }
        Ok(())
    }

    /// Wipe the card, and forget any PKCS#15 structure read from it.
    pub fn erase_card(&mut self) -> Result<()> {
        info!("Erasing card");
        self.operations.erase_card(&mut self.session)?;
        self.p15card = Pkcs15Card::new(self.session.profile().token_info());
        Ok(())
    }

    /// Create the PKCS#15 application on the card: its DF, its PINs, the
    /// AODF describing them, and the TokenInfo.
    pub fn add_application(&mut self) -> Result<()> {
        self.read_pins()?;

        let pins: Vec<_> = self
            .session
            .profile()
            .pins
            .iter()
            .map(|p| p.to_object())
            .collect();
        for pin in pins {
            self.p15card.add_object(pin);
        }

        self.operations.init_application(&mut self.session)?;

        if self.p15card.token_info.serial_number.is_none() {
            let serial_number = self.session.card_mut().serial_number()?;
            debug!("Using card serial number {}", serial_number);
            self.p15card.token_info.serial_number = Some(serial_number);
        }

        self.update_token_info()?;
        self.update_directory(DfKind::AoDf)?;
        info!("Created PKCS#15 application");
        Ok(())
    }

    /// Load the PKCS#15 structure already on the card, so new objects are
    /// added alongside the existing ones.
    pub fn bind(&mut self) -> Result<()> {
        let (token_info_path, odf_path) = {
            let profile = self.session.profile();
            match (profile.token_info_file(), profile.odf_file()) {
                (Some(token_info), Some(odf)) => (token_info.path.clone(), odf.path.clone()),
                _ => {
                    return Err(Error::NotSupported(format!(
                        "the profile must define the {} and {} files",
                        profile::TOKEN_INFO,
                        profile::ODF
                    )));
                }
            }
        };

        let (_, data) = match fs::read_file(&mut self.session, &token_info_path) {
            Err(Error::FileNotFound(_)) => {
                return Err(Error::ObjectNotFound(
                    "card has no PKCS#15 structure; run init first".to_owned(),
                ));
            }
            result => result?,
        };
        let mut p15card = Pkcs15Card::new(decode_token_info(data.as_slice())?);
        let (_, data) = fs::read_file(&mut self.session, &odf_path)?;

        for (kind, path) in decode_odf(data.as_slice())? {
            let (selected, data) = fs::read_file(&mut self.session, &path)?;
            let file = self
                .session
                .profile()
                .find_file_by_path(&path)
                .cloned()
                .unwrap_or(selected);
            let segment = p15card.bind_directory_file(kind, file);
            let records = decode_directory_records(kind, data.as_slice())?;
            debug!("Found {} records in {} {}", records.len(), kind, path);
            for record in records {
                match record {
                    DirectoryRecord::Object(object) => {
                        p15card.add_object_to_segment(segment, object)
                    }
                    DirectoryRecord::Opaque(der) => p15card.add_opaque_record(kind, segment, der),
                }
            }
        }

        info!(
            "Bound PKCS#15 structure {}",
            p15card.token_info.label.as_deref().unwrap_or("(unlabeled)")
        );
        self.p15card = p15card;
        Ok(())
    }
}
