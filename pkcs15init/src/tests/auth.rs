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
use crate::error::*;
use crate::init::auth::authenticate;
use crate::profile::AuthKey;
use crate::tests::stub::*;
use crate::util::SecretKind;

fn guarded_file(chain: Vec<AclEntry>) -> FileDescriptor {
    let mut file = FileDescriptor::new(path("3F00/5015/4401"), FileType::WorkingEf, 32);
    file.set_acl(Operation::Update, chain);
    file
}

#[test]
fn test_empty_chain_is_satisfied() {
    let (mut session, log) = new_test_session(CardStub::new(), &[]);
    let file = guarded_file(vec![]);
    assert!(authenticate(&mut session, &file, Operation::Update).is_ok());
    assert!(session.card().calls().is_empty());
    assert!(log.prompts().is_empty());
}

#[test]
fn test_never_fails_without_evaluating_later_entries() {
    let (mut session, log) = new_test_session(CardStub::new(), &["1234"]);
    let file = guarded_file(vec![AclEntry::never(), AclEntry::chv(1)]);
    match authenticate(&mut session, &file, Operation::Update) {
        Err(Error::SecurityStatusNotSatisfied(_)) => {}
        r => panic!("Unexpected authentication result: {:?}", r),
    }
    assert!(session.card().verifies().is_empty());
    assert!(log.prompts().is_empty());
}

#[test]
fn test_never_after_satisfied_entry_still_fails() {
    let (mut session, _) = new_test_session(CardStub::new(), &["1234"]);
    let file = guarded_file(vec![AclEntry::chv(1), AclEntry::never()]);
    match authenticate(&mut session, &file, Operation::Update) {
        Err(Error::SecurityStatusNotSatisfied(_)) => {}
        r => panic!("Unexpected authentication result: {:?}", r),
    }
    assert_eq!(1, session.card().verifies().len());
}

#[test]
fn test_leading_none_skips_everything() {
    let (mut session, log) = new_test_session(CardStub::new(), &["1234"]);
    let file = guarded_file(vec![AclEntry::none(), AclEntry::chv(1), AclEntry::never()]);
    assert!(authenticate(&mut session, &file, Operation::Update).is_ok());
    assert!(session.card().calls().is_empty());
    assert!(log.prompts().is_empty());
}

#[test]
fn test_acl_of_other_operation_is_ignored() {
    let (mut session, log) = new_test_session(CardStub::new(), &[]);
    let file = guarded_file(vec![AclEntry::never()]);
    assert!(authenticate(&mut session, &file, Operation::Read).is_ok());
    assert!(log.prompts().is_empty());
}

#[test]
fn test_pin_is_prompted_once_and_cached() {
    let (mut session, log) = new_test_session(CardStub::new(), &["1234"]);
    let file = guarded_file(vec![AclEntry::chv(1)]);
    assert!(authenticate(&mut session, &file, Operation::Update).is_ok());
    assert!(authenticate(&mut session, &file, Operation::Update).is_ok());

    assert_eq!(vec![(SecretKind::Pin, "CHV1".to_owned())], log.prompts());
    assert_eq!(
        vec![
            (AclMethod::Chv, 1, b"1234".to_vec()),
            (AclMethod::Chv, 1, b"1234".to_vec()),
        ],
        session.card().verifies()
    );
    assert!(session.is_presented(AclMethod::Chv, 1));
    assert_eq!(
        Some("1234"),
        session
            .profile()
            .find_pin("CHV1")
            .unwrap()
            .secret(SecretKind::Pin)
    );
}

#[test]
fn test_rejected_pin_is_not_cached() {
    let mut card = CardStub::new();
    card.set_secret(AclMethod::Chv, 1, "1234");
    let (mut session, _) = new_test_session(card, &["9999"]);
    let file = guarded_file(vec![AclEntry::chv(1)]);
    match authenticate(&mut session, &file, Operation::Update) {
        Err(Error::Authentication(_)) => {}
        r => panic!("Unexpected authentication result: {:?}", r),
    }
    assert!(!session.is_presented(AclMethod::Chv, 1));
    assert!(session
        .profile()
        .find_pin("CHV1")
        .unwrap()
        .secret(SecretKind::Pin)
        .is_none());
}

#[test]
fn test_known_pin_is_not_prompted() {
    let (mut session, log) = new_test_session(CardStub::new(), &[]);
    session
        .profile_mut()
        .set_pin_secret("CHV1", SecretKind::Pin, "4321".to_owned());
    let file = guarded_file(vec![AclEntry::chv(1)]);
    assert!(authenticate(&mut session, &file, Operation::Update).is_ok());
    assert!(log.prompts().is_empty());
    assert_eq!(
        vec![(AclMethod::Chv, 1, b"4321".to_vec())],
        session.card().verifies()
    );
}

#[test]
fn test_exact_key_is_preferred_over_wildcard() {
    let (mut session, _) = new_test_session(CardStub::new(), &[]);
    session.profile_mut().keys = vec![
        AuthKey {
            method: AclMethod::Pro,
            reference: None,
            value: vec![0x99],
        },
        AuthKey {
            method: AclMethod::Pro,
            reference: Some(3),
            value: vec![0x01, 0x02],
        },
    ];

    let exact = guarded_file(vec![AclEntry::new(AclMethod::Pro, 3)]);
    let other = guarded_file(vec![AclEntry::new(AclMethod::Pro, 4)]);
    assert!(authenticate(&mut session, &exact, Operation::Update).is_ok());
    assert!(authenticate(&mut session, &other, Operation::Update).is_ok());
    assert_eq!(
        vec![
            (AclMethod::Pro, 3, vec![0x01, 0x02]),
            (AclMethod::Pro, 4, vec![0x99]),
        ],
        session.card().verifies()
    );
}

#[test]
fn test_key_is_preferred_over_pin() {
    let (mut session, log) = new_test_session(CardStub::new(), &["1234"]);
    session.profile_mut().keys = vec![AuthKey {
        method: AclMethod::Chv,
        reference: Some(1),
        value: b"transport".to_vec(),
    }];
    let file = guarded_file(vec![AclEntry::chv(1)]);
    assert!(authenticate(&mut session, &file, Operation::Update).is_ok());
    assert!(log.prompts().is_empty());
    assert_eq!(
        vec![(AclMethod::Chv, 1, b"transport".to_vec())],
        session.card().verifies()
    );
}

#[test]
fn test_missing_secret_is_tolerated() {
    let (mut session, log) = new_test_session(CardStub::new(), &[]);
    let file = guarded_file(vec![AclEntry::new(AclMethod::Aut, 5), AclEntry::chv(7)]);
    assert!(authenticate(&mut session, &file, Operation::Update).is_ok());
    assert!(session.card().verifies().is_empty());
    assert!(log.prompts().is_empty());
    assert!(!session.is_presented(AclMethod::Aut, 5));
}

#[test]
fn test_every_entry_is_satisfied_in_order() {
    let (mut session, _) = new_test_session(CardStub::new(), &["1234"]);
    session.profile_mut().keys = vec![AuthKey {
        method: AclMethod::Aut,
        reference: None,
        value: vec![0xaa],
    }];
    let file = guarded_file(vec![AclEntry::new(AclMethod::Aut, 2), AclEntry::chv(1)]);
    assert!(authenticate(&mut session, &file, Operation::Update).is_ok());
    assert_eq!(
        vec![
            (AclMethod::Aut, 2, vec![0xaa]),
            (AclMethod::Chv, 1, b"1234".to_vec()),
        ],
        session.card().verifies()
    );
}
