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
use crate::crypto::{Algorithm, PrivateKey};
use crate::error::*;
use crate::init::fs;
use crate::init::key::{KeyObject, KeyRequest};
use crate::init::Pkcs15Init;
use crate::pkcs15::DfKind;
use log::{debug, info};

/// How a key pair ended up being generated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyGeneration {
    /// The card generated the key pair itself.
    Onboard,
    /// The key pair was generated in software, as requested.
    Software,
    /// On-board generation was requested, but the card doesn't support it, so
    /// the key pair was generated in software instead.
    SoftwareFallback,
}

impl KeyGeneration {
    pub fn is_fallback(&self) -> bool {
        *self == KeyGeneration::SoftwareFallback
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    TryOnboard,
    Software,
}

impl<C: Card> Pkcs15Init<C> {
    /// Generate a new key pair, storing both halves on the card. If on-board
    /// generation was requested but the card can't do it, this falls back to
    /// software generation (once).
    pub fn generate_key(&mut self, request: &mut KeyRequest) -> Result<KeyGeneration> {
        let mut state = match request.onboard_keygen {
            true => State::TryOnboard,
            false => State::Software,
        };
        let mut downgraded = false;

        loop {
            match state {
                State::TryOnboard => match self.generate_onboard(request) {
                    Ok(_) => return Ok(KeyGeneration::Onboard),
                    Err(Error::NotSupported(reason)) => {
                        // The caller reports the downgrade to the user.
                        debug!("On-board key generation unavailable: {}", reason);
                        request.onboard_keygen = false;
                        downgraded = true;
                        state = State::Software;
                    }
                    Err(e) => return Err(e),
                },
                State::Software => {
                    self.generate_software(request)?;
                    return Ok(match downgraded {
                        false => KeyGeneration::Software,
                        true => KeyGeneration::SoftwareFallback,
                    });
                }
            }
        }
    }

    fn generate_onboard(&mut self, request: &mut KeyRequest) -> Result<()> {
        let key = self.prepare_key(request, true)?;
        let public_key = self
            .operations
            .generate_key(&mut self.session, &key, request.key_bits)?;
        info!("Generated {} bit key {} on the card", request.key_bits, key.id());
        self.register_key(request, &key);
        self.update_directory(DfKind::PrKdf)?;

        request.public_key = Some(public_key);
        self.store_public_key(request)?;
        Ok(())
    }

    fn generate_software(&mut self, request: &mut KeyRequest) -> Result<()> {
        info!(
            "Generating {} bit {} key in software",
            request.key_bits, request.algorithm
        );
        request.private_key = Some(PrivateKey::generate(request.algorithm, request.key_bits)?);
        self.store_private_key(request)?;
        self.store_public_key(request)?;
        Ok(())
    }

    /// Store the request's private key natively on the card, and record it in
    /// the PrKDF.
    pub fn store_private_key(&mut self, request: &mut KeyRequest) -> Result<KeyObject> {
        let private_key = match request.private_key.as_ref() {
            None => {
                return Err(Error::InvalidArgument(
                    "no private key was provided to store".to_owned(),
                ));
            }
            Some(key) => key.clone(),
        };
        request.algorithm = private_key.algorithm()?;
        request.key_bits = private_key.bits() as u32;

        let key = self.prepare_key(request, true)?;
        match request.algorithm {
            Algorithm::Rsa => {
                self.operations
                    .store_rsa(&mut self.session, &key, &private_key.rsa()?)?
            }
            Algorithm::Dsa => {
                self.operations
                    .store_dsa(&mut self.session, &key, &private_key.dsa()?)?
            }
            algorithm => {
                return Err(Error::NotSupported(format!(
                    "{} private keys can't be stored",
                    algorithm
                )));
            }
        }
        info!("Stored private key {} in {}", key.id(), key.file().path);

        self.register_key(request, &key);
        self.update_directory(DfKind::PrKdf)?;
        Ok(key)
    }

    /// Write the request's public key (or the public half of its private key)
    /// to its own file, and record it in the PuKDF.
    pub fn store_public_key(&mut self, request: &mut KeyRequest) -> Result<KeyObject> {
        let public_key = request.resolve_public_key()?;
        request.algorithm = public_key.algorithm()?;
        request.key_bits = public_key.bits() as u32;
        let der = public_key.to_pkcs15_der()?;

        let key = self.prepare_key(request, false)?;
        fs::update_file(&mut self.session, key.file(), der.as_slice())?;
        info!("Stored public key {} in {}", key.id(), key.file().path);

        self.register_key(request, &key);
        self.update_directory(DfKind::PuKdf)?;
        Ok(key)
    }
}
