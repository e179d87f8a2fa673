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

use crate::card::acl::AclMethod;
use crate::card::file::{FileDescriptor, FileType};
use crate::card::path::Path;
use crate::card::{Card, CardCtl};
use crate::crypto::{Algorithm, PrivateKey, PublicKey};
use crate::driver::CardOperations;
use crate::error::*;
use crate::init::key::KeyObject;
use crate::init::{fs, Pkcs15Init, Session};
use crate::pkcs15::ObjectType;
use crate::profile::Profile;
use crate::util::{SecretKind, SecretPrompter};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

pub const TEST_SERIAL_NUMBER: &str = "0102030405060708";

/// A small profile with one user PIN guarding key material. Everything else
/// is freely writable, so tests only see the verifications they ask for.
pub const TEST_PROFILE: &str = r#"
name = "test"

[token]
label = "Test Card"
manufacturer = "pkcs15init tests"

[[pin]]
ident = "CHV1"
label = "User PIN"
auth-id = "01"
reference = 1
min-length = 4
max-length = 8

[[private-key]]
id = "45"
pin = "CHV1"
usage = ["sign", "decrypt"]

[[public-key]]
usage = ["verify", "encrypt"]

[[file]]
ident = "PKCS15-AppDF"
path = "3F00/5015"
type = "df"
acl = { create = ["none"] }

[[file]]
ident = "PKCS15-ODF"
path = "3F00/5015/5031"
size = 64
acl = { update = ["none"] }

[[file]]
ident = "PKCS15-TokenInfo"
path = "3F00/5015/5032"
size = 64
acl = { update = ["none"] }

[[file]]
ident = "PKCS15-AODF"
path = "3F00/5015/4401"
size = 128
acl = { update = ["none"] }

[[file]]
ident = "PKCS15-PrKDF"
path = "3F00/5015/4402"
size = 256
acl = { update = ["none"] }

[[file]]
ident = "PKCS15-PuKDF"
path = "3F00/5015/4403"
size = 256
acl = { update = ["none"] }
"#;

pub fn test_profile() -> Profile {
    Profile::from_toml_str(TEST_PROFILE).unwrap()
}

pub fn path(s: &str) -> Path {
    s.parse().unwrap()
}

/// Everything a `CardStub` was asked to do, in order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CardCall {
    Select(Path),
    Create(Path, usize),
    Update(Path, Vec<u8>),
    Read(Path),
    Verify(AclMethod, u32, Vec<u8>),
    Ctl(CardCtl),
    Generate(Path),
}

struct StubFile {
    descriptor: FileDescriptor,
    content: Vec<u8>,
}

/// A card which keeps files in memory and records every call made to it. It
/// doesn't enforce ACLs; tests look at the recorded calls instead.
pub struct CardStub {
    files: BTreeMap<Path, StubFile>,
    calls: Vec<CardCall>,
    selected: Option<Path>,
    locked: bool,
    secrets: HashMap<(AclMethod, u32), Vec<u8>>,
}

impl CardStub {
    pub fn new() -> Self {
        let mut card = CardStub {
            files: BTreeMap::new(),
            calls: Vec::new(),
            selected: None,
            locked: false,
            secrets: HashMap::new(),
        };
        card.add_file(FileDescriptor::new(Path::master_file(), FileType::Df, 0));
        card
    }

    /// Pre-seed the card with the given file, bypassing all checks.
    pub fn add_file(&mut self, descriptor: FileDescriptor) {
        self.files.insert(
            descriptor.path.clone(),
            StubFile {
                content: vec![0; descriptor.size],
                descriptor,
            },
        );
    }

    /// Make the card reject any secret for the given reference but this one.
    /// References without a configured secret accept anything.
    pub fn set_secret(&mut self, method: AclMethod, reference: u32, secret: &str) {
        self.secrets
            .insert((method, reference), secret.as_bytes().to_vec());
    }

    pub fn calls(&self) -> &[CardCall] {
        self.calls.as_slice()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn record(&mut self, call: CardCall) {
        self.calls.push(call);
    }

    pub fn creates(&self) -> Vec<Path> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                CardCall::Create(path, _) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn verifies(&self) -> Vec<(AclMethod, u32, Vec<u8>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                CardCall::Verify(m, r, s) => Some((*m, *r, s.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn file(&self, path: &Path) -> Option<&FileDescriptor> {
        self.files.get(path).map(|f| &f.descriptor)
    }

    pub fn content(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(|f| f.content.as_slice())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Card for CardStub {
    fn driver_name(&self) -> &str {
        "stub"
    }

    fn lock(&mut self) -> Result<()> {
        self.locked = true;
        Ok(())
    }

    fn unlock(&mut self) {
        self.locked = false;
    }

    fn select_file(&mut self, path: &Path) -> Result<FileDescriptor> {
        self.calls.push(CardCall::Select(path.clone()));
        match self.files.get(path) {
            None => Err(Error::FileNotFound(path.to_string())),
            Some(file) => {
                self.selected = Some(path.clone());
                Ok(file.descriptor.clone())
            }
        }
    }

    fn create_file(&mut self, file: &FileDescriptor) -> Result<()> {
        self.calls
            .push(CardCall::Create(file.path.clone(), file.size));
        if self.files.contains_key(&file.path) {
            return Err(Error::Card(format!("{} already exists", file.path)));
        }
        if !self.files.contains_key(&file.path.parent()) {
            return Err(Error::FileNotFound(file.path.parent().to_string()));
        }
        self.add_file(file.clone());
        Ok(())
    }

    fn update_binary(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let path = match self.selected.clone() {
            None => return Err(Error::Card("no file selected".to_owned())),
            Some(path) => path,
        };
        self.calls.push(CardCall::Update(path.clone(), data.to_vec()));
        let file = match self.files.get_mut(&path) {
            None => return Err(Error::FileNotFound(path.to_string())),
            Some(file) => file,
        };
        if offset + data.len() > file.descriptor.size {
            return Err(Error::Card(format!("{} is too small", path)));
        }
        file.content[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_binary(&mut self, offset: usize, length: usize) -> Result<Vec<u8>> {
        let path = match self.selected.clone() {
            None => return Err(Error::Card("no file selected".to_owned())),
            Some(path) => path,
        };
        self.calls.push(CardCall::Read(path.clone()));
        let content = &self.files[&path].content;
        let end = content.len().min(offset + length);
        Ok(content[offset.min(end)..end].to_vec())
    }

    fn verify(&mut self, method: AclMethod, reference: u32, secret: &[u8]) -> Result<()> {
        self.calls
            .push(CardCall::Verify(method, reference, secret.to_vec()));
        match self.secrets.get(&(method, reference)) {
            Some(expected) if expected.as_slice() != secret => Err(Error::Authentication(
                format!("wrong secret for reference {}", reference),
            )),
            _ => Ok(()),
        }
    }

    fn serial_number(&mut self) -> Result<String> {
        Ok(TEST_SERIAL_NUMBER.to_owned())
    }

    fn card_ctl(&mut self, ctl: CardCtl) -> Result<()> {
        self.calls.push(CardCall::Ctl(ctl));
        Ok(())
    }
}

/// Capability driver for `CardStub`. Key files are allocated in the
/// application DF, and on-board generation can be switched on or off.
pub struct OperationsStub {
    pub onboard_keygen: bool,
    /// How many times generate_key has been called, whether or not it was
    /// supported.
    pub generate_calls: Rc<RefCell<usize>>,
}

impl OperationsStub {
    pub fn new(onboard_keygen: bool) -> Self {
        OperationsStub {
            onboard_keygen,
            generate_calls: Rc::new(RefCell::new(0)),
        }
    }
}

impl CardOperations<CardStub> for OperationsStub {
    fn name(&self) -> &str {
        "stub"
    }

    fn erase_card(&self, session: &mut Session<CardStub>) -> Result<()> {
        session.card_mut().card_ctl(CardCtl::Erase)
    }

    fn init_application(&self, session: &mut Session<CardStub>) -> Result<()> {
        let app_df = session.profile().app_df().unwrap().clone();
        fs::create_file(session, &app_df)
    }

    fn allocate_file(
        &self,
        profile: &Profile,
        object_type: ObjectType,
        index: usize,
    ) -> Result<FileDescriptor> {
        let base: u16 = match object_type {
            ObjectType::PrivateKeyRsa | ObjectType::PrivateKeyDsa => 0x3000,
            ObjectType::PublicKeyRsa | ObjectType::PublicKeyDsa => 0x3100,
            ObjectType::AuthPin => return Err(Error::NotSupported("PIN files".to_owned())),
        };
        let app_df = profile.app_df().unwrap();
        Ok(FileDescriptor::new(
            app_df.path.join(base + index as u16),
            FileType::WorkingEf,
            2048,
        ))
    }

    fn store_rsa(
        &self,
        session: &mut Session<CardStub>,
        key: &KeyObject,
        rsa: &openssl::rsa::Rsa<openssl::pkey::Private>,
    ) -> Result<()> {
        fs::update_file(session, key.file(), rsa.private_key_to_der()?.as_slice())
    }

    fn generate_key(
        &self,
        session: &mut Session<CardStub>,
        key: &KeyObject,
        bits: u32,
    ) -> Result<PublicKey> {
        *self.generate_calls.borrow_mut() += 1;
        if !self.onboard_keygen {
            return Err(Error::NotSupported("stub on-board generation".to_owned()));
        }
        session
            .card_mut()
            .record(CardCall::Generate(key.file().path.clone()));
        let private = PrivateKey::generate(Algorithm::Rsa, bits)?;
        fs::update_file(session, key.file(), private.rsa()?.private_key_to_der()?.as_slice())?;
        private.to_public_key()
    }
}

/// A prompter which hands out canned answers, recording what it was asked.
pub struct ScriptedPrompter {
    answers: Rc<RefCell<VecDeque<String>>>,
    prompts: Rc<RefCell<Vec<(SecretKind, String)>>>,
}

/// The test's handle onto a ScriptedPrompter which is owned by a session.
#[derive(Clone)]
pub struct PrompterLog {
    answers: Rc<RefCell<VecDeque<String>>>,
    prompts: Rc<RefCell<Vec<(SecretKind, String)>>>,
}

impl PrompterLog {
    pub fn push_answer(&self, answer: &str) {
        self.answers.borrow_mut().push_back(answer.to_owned());
    }

    pub fn prompts(&self) -> Vec<(SecretKind, String)> {
        self.prompts.borrow().clone()
    }
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> (Self, PrompterLog) {
        let answers: VecDeque<String> = answers.iter().map(|a| (*a).to_owned()).collect();
        let answers = Rc::new(RefCell::new(answers));
        let prompts = Rc::new(RefCell::new(Vec::new()));
        (
            ScriptedPrompter {
                answers: answers.clone(),
                prompts: prompts.clone(),
            },
            PrompterLog { answers, prompts },
        )
    }
}

impl SecretPrompter for ScriptedPrompter {
    fn prompt_secret(
        &mut self,
        kind: SecretKind,
        ident: &str,
        _label: &str,
        _min_length: usize,
        _max_length: usize,
    ) -> Result<String> {
        self.prompts.borrow_mut().push((kind, ident.to_owned()));
        match self.answers.borrow_mut().pop_front() {
            None => Err(Error::InvalidArgument(format!(
                "no {} entered for {}",
                kind, ident
            ))),
            Some(answer) => Ok(answer),
        }
    }
}

pub fn new_test_session(card: CardStub, answers: &[&str]) -> (Session<CardStub>, PrompterLog) {
    let (prompter, log) = ScriptedPrompter::new(answers);
    (
        Session::new(card, test_profile(), Box::new(prompter)).unwrap(),
        log,
    )
}

pub fn new_test_init(
    card: CardStub,
    profile: Profile,
    onboard_keygen: bool,
    answers: &[&str],
) -> (Pkcs15Init<CardStub>, PrompterLog, Rc<RefCell<usize>>) {
    let (prompter, log) = ScriptedPrompter::new(answers);
    let operations = OperationsStub::new(onboard_keygen);
    let generate_calls = operations.generate_calls.clone();
    (
        Pkcs15Init::with_operations(card, profile, Box::new(prompter), Box::new(operations))
            .unwrap(),
        log,
        generate_calls,
    )
}

/// A card which already has the application DF, so key storage tests don't
/// need to go through init first.
pub fn card_with_app_df() -> CardStub {
    let mut card = CardStub::new();
    card.add_file(test_profile().app_df().unwrap().clone());
    card
}
