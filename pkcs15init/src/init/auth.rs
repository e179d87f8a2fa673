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
use crate::card::file::FileDescriptor;
use crate::card::Card;
use crate::error::*;
use crate::init::Session;
use crate::util::SecretKind;
use log::{debug, error, warn};

/// Satisfy the ACL chain guarding the given operation on the given file.
///
/// Entries are evaluated in order. A NEVER entry fails immediately, and a
/// NONE entry satisfies the whole chain without looking at the rest. Every
/// other entry is satisfied by presenting the matching secret to the card.
pub fn authenticate<C: Card>(
    session: &mut Session<C>,
    file: &FileDescriptor,
    operation: Operation,
) -> Result<()> {
    for entry in file.acl(operation) {
        match entry.method {
            AclMethod::Never => {
                return Err(Error::SecurityStatusNotSatisfied(format!(
                    "{} is never allowed on {}",
                    operation, file.path
                )));
            }
            AclMethod::None => break,
            _ => present_secret(session, entry)?,
        }
    }
    Ok(())
}

fn verify<C: Card>(session: &mut Session<C>, entry: &AclEntry, secret: &[u8]) -> Result<()> {
    if let Err(e) = session
        .card_mut()
        .verify(entry.method, entry.reference, secret)
    {
        error!(
            "Failed to verify {} (ref=0x{:x})",
            entry.method.secret_description(),
            entry.reference
        );
        return Err(e);
    }
    session.mark_presented(entry.method, entry.reference);
    Ok(())
}

fn present_secret<C: Card>(session: &mut Session<C>, entry: &AclEntry) -> Result<()> {
    let key = session
        .profile()
        .find_key(entry.method, entry.reference)
        .or_else(|| session.profile().find_wildcard_key(entry.method))
        .map(|k| k.value.clone());
    if let Some(key) = key {
        debug!(
            "Presenting {} for reference 0x{:x}",
            entry.method.secret_description(),
            entry.reference
        );
        return verify(session, entry, key.as_slice());
    }

    let pin = match entry.method {
        AclMethod::Chv => session
            .profile()
            .find_pin_by_reference(entry.reference)
            .cloned(),
        _ => None,
    };
    let pin = match pin {
        None => {
            warn!(
                "No {} available for reference 0x{:x}; letting the card decide",
                entry.method.secret_description(),
                entry.reference
            );
            return Ok(());
        }
        Some(pin) => pin,
    };

    let (secret, cached) = match pin.secret(SecretKind::Pin) {
        Some(secret) => (secret.to_owned(), true),
        None => (
            session.prompter_mut().prompt_secret(
                SecretKind::Pin,
                pin.ident.as_str(),
                pin.label.as_str(),
                pin.min_length,
                pin.max_length,
            )?,
            false,
        ),
    };
    verify(session, entry, secret.as_bytes())?;
    if !cached {
        session
            .profile_mut()
            .set_pin_secret(pin.ident.as_str(), SecretKind::Pin, secret);
    }
    Ok(())
}
