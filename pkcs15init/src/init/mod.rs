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

pub mod auth;
pub mod directory;
pub mod fs;
pub mod generate;
pub mod key;

use crate::card::acl::AclMethod;
use crate::card::Card;
use crate::driver::{bind_operations, CardOperations};
use crate::error::*;
use crate::pkcs15::Pkcs15Card;
use crate::profile::Profile;
use crate::util::{SecretKind, SecretPrompter};
use log::debug;
use std::collections::BTreeSet;

/// Exclusive access to one card, the profile being provisioned onto it, and a
/// way to ask the operator for secrets. The card is locked for as long as the
/// session exists.
pub struct Session<C: Card> {
    card: C,
    profile: Profile,
    prompter: Box<dyn SecretPrompter>,
    presented: BTreeSet<(AclMethod, u32)>,
}

impl<C: Card> Session<C> {
    pub fn new(mut card: C, profile: Profile, prompter: Box<dyn SecretPrompter>) -> Result<Self> {
        card.lock()?;
        Ok(Session {
            card,
            profile,
            prompter,
            presented: BTreeSet::new(),
        })
    }

    pub fn card(&self) -> &C {
        &self.card
    }

    pub fn card_mut(&mut self) -> &mut C {
        &mut self.card
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut Profile {
        &mut self.profile
    }

    pub(crate) fn prompter_mut(&mut self) -> &mut dyn SecretPrompter {
        self.prompter.as_mut()
    }

    /// Whether the given secret has been successfully presented to the card
    /// during this session.
    pub fn is_presented(&self, method: AclMethod, reference: u32) -> bool {
        self.presented.contains(&(method, reference))
    }

    pub(crate) fn mark_presented(&mut self, method: AclMethod, reference: u32) {
        self.presented.insert((method, reference));
    }
}

impl<C: Card> Drop for Session<C> {
    fn drop(&mut self) {
        self.card.unlock();
    }
}

/// PINs and PUKs supplied up front (e.g. on the command line), by position.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PinArgs {
    pub pin1: Option<String>,
    pub puk1: Option<String>,
    pub pin2: Option<String>,
    pub puk2: Option<String>,
}

/// The provisioning engine for one card: its session, the capability driver
/// for its family, and the in-memory PKCS#15 structure being built.
pub struct Pkcs15Init<C: Card> {
    session: Session<C>,
    operations: Box<dyn CardOperations<C>>,
    p15card: Pkcs15Card,
}

impl<C: Card> Pkcs15Init<C> {
    /// Start provisioning the given card, binding the capability driver the
    /// card itself names.
    pub fn new(card: C, profile: Profile, prompter: Box<dyn SecretPrompter>) -> Result<Self> {
        let operations = bind_operations(card.driver_name())?;
        Self::with_operations(card, profile, prompter, operations)
    }

    /// Start provisioning the given card using an explicitly chosen
    /// capability driver.
    pub fn with_operations(
        card: C,
        profile: Profile,
        prompter: Box<dyn SecretPrompter>,
        operations: Box<dyn CardOperations<C>>,
    ) -> Result<Self> {
        let p15card = Pkcs15Card::new(profile.token_info());
        Ok(Pkcs15Init {
            session: Session::new(card, profile, prompter)?,
            operations,
            p15card,
        })
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    pub fn p15card(&self) -> &Pkcs15Card {
        &self.p15card
    }

    pub fn operations(&self) -> &dyn CardOperations<C> {
        self.operations.as_ref()
    }

    /// Associate PINs given up front with the profile's CHV1 and CHV2 policies.
    pub fn set_pins_from_args(&mut self, pins: &PinArgs) {
        let slots = [
            ("CHV1", SecretKind::Pin, pins.pin1.as_ref()),
            ("CHV1", SecretKind::Puk, pins.puk1.as_ref()),
            ("CHV2", SecretKind::Pin, pins.pin2.as_ref()),
            ("CHV2", SecretKind::Puk, pins.puk2.as_ref()),
        ];
        for (ident, kind, value) in slots.iter() {
            if let Some(value) = value {
                if !self
                    .session
                    .profile_mut()
                    .set_pin_secret(ident, *kind, (*value).clone())
                {
                    debug!("Ignoring {} for {}, which the profile doesn't define", kind, ident);
                }
            }
        }
    }
}
